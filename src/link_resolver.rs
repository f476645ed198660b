//! Goodreads review-link lookup via the DuckDuckGo HTML results page.

use std::io::Read;
use std::time::Duration;

use log::{debug, info, warn};

use crate::protocol::{BookMetadata, ReviewLink};

const SEARCH_ENDPOINT_URL: &str = "https://html.duckduckgo.com/html/";
const REVIEW_SITE_DOMAIN: &str = "www.goodreads.com";
const REDIRECT_LINK_MARKER: &str = "href=\"//duckduckgo.com/l/?uddg=";
const LINK_RESOLVER_USER_AGENT: &str = "bookrpc/0.1.0 (review link resolution)";

/// Seam for the cache: anything that can attach a review link to metadata.
pub trait ResolveReviewLink {
    fn resolve_review_link(&self, title: &str, metadata: &BookMetadata) -> ReviewLink;
}

/// Scrapes a search-engine HTML results page for a Goodreads URL.
pub struct LinkResolver {
    http_client: ureq::Agent,
}

impl LinkResolver {
    pub fn new() -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(7))
            .timeout_write(Duration::from_secs(7))
            .build();
        Self { http_client }
    }

    fn fetch_html(&self, url: &str) -> Result<String, String> {
        let response = self
            .http_client
            .get(url)
            .set("User-Agent", LINK_RESOLVER_USER_AGENT)
            .call()
            .map_err(|error| format!("Request failed: {error}"))?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| format!("Failed to read response: {error}"))?;
        Ok(body)
    }

    /// Scans for redirect markers and decodes the first embedded URL on the
    /// review-site domain. A completed scan with no hit is ConfirmedAbsent.
    fn scan_for_review_link(html: &str) -> ReviewLink {
        let mut rest = html;
        while let Some(start) = rest.find(REDIRECT_LINK_MARKER) {
            let encoded_start = &rest[start + REDIRECT_LINK_MARKER.len()..];
            let Some(end) = encoded_start.find('"') else {
                break;
            };
            let encoded = &encoded_start[..end];
            if let Ok(decoded) = urlencoding::decode(encoded) {
                if decoded.contains(REVIEW_SITE_DOMAIN) {
                    return ReviewLink::Present(decoded.into_owned());
                }
            }
            rest = &encoded_start[end..];
        }
        ReviewLink::ConfirmedAbsent
    }
}

impl Default for LinkResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveReviewLink for LinkResolver {
    fn resolve_review_link(&self, title: &str, metadata: &BookMetadata) -> ReviewLink {
        // Without an author the site-scoped query is not worth running: this
        // is a definitive "not applicable", not "not yet looked up".
        let Some(author) = metadata.authors.first() else {
            debug!("No author for '{}'; skipping review link lookup", title);
            return ReviewLink::ConfirmedAbsent;
        };

        let query = format!("\"{title}\" \"{author}\" site:goodreads.com");
        let url = format!("{}?q={}", SEARCH_ENDPOINT_URL, urlencoding::encode(&query));
        debug!("Review link query: {}", url);

        match self.fetch_html(&url) {
            Ok(html) => {
                let link = Self::scan_for_review_link(&html);
                match &link {
                    ReviewLink::Present(found) => info!("Found review link: {}", found),
                    _ => info!("No review link found for '{}'", title),
                }
                link
            }
            Err(error) => {
                warn!("Review link lookup failed for '{}': {}", title, error);
                ReviewLink::ConfirmedAbsent
            }
        }
    }
}
