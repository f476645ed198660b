//! Cascading book-metadata lookup over Google Books and Open Library.
//!
//! The exact-title Google Books pass wins when it can; otherwise the title is
//! sanitized and ranked against Open Library docs, and Google Books is
//! re-queried with the best candidate's author. Source failures degrade to
//! emptier metadata instead of aborting the poll cycle.

use std::io::Read;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;

use crate::protocol::BookMetadata;
use crate::similarity::{sanitize_title, similarity};

const GOOGLE_BOOKS_VOLUMES_URL: &str = "https://www.googleapis.com/books/v1/volumes";
const OPEN_LIBRARY_SEARCH_URL: &str = "https://openlibrary.org/search.json";
const MAX_RESULTS: usize = 40;
const RESOLVER_USER_AGENT: &str = "bookrpc/0.1.0 (book metadata resolution)";

/// Seam for the cache: anything that can turn a title into metadata.
pub trait ResolveMetadata {
    fn resolve(&self, title: &str) -> Result<BookMetadata, String>;
}

/// Resolves a document title to best-effort [`BookMetadata`].
pub struct MetadataResolver {
    http_client: ureq::Agent,
}

impl MetadataResolver {
    pub fn new() -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(7))
            .timeout_write(Duration::from_secs(7))
            .build();
        Self { http_client }
    }

    fn http_get_json(&self, url: &str) -> Result<Value, String> {
        let response = self
            .http_client
            .get(url)
            .set("User-Agent", RESOLVER_USER_AGENT)
            .set("Accept", "application/json")
            .call()
            .map_err(|error| format!("Request failed: {error}"))?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| format!("Failed to read response: {error}"))?;
        serde_json::from_str(&body).map_err(|error| format!("Invalid JSON response: {error}"))
    }

    fn search_google_books(&self, query: &str) -> Result<Vec<Value>, String> {
        let url = format!(
            "{}?q={}&maxResults={}",
            GOOGLE_BOOKS_VOLUMES_URL,
            urlencoding::encode(query),
            MAX_RESULTS
        );
        debug!("Google Books query: {}", url);
        let parsed = self.http_get_json(&url)?;
        Ok(parsed["items"].as_array().cloned().unwrap_or_default())
    }

    fn search_open_library(&self, query: &str) -> Result<Vec<Value>, String> {
        let url = format!(
            "{}?q={}",
            OPEN_LIBRARY_SEARCH_URL,
            urlencoding::encode(query)
        );
        debug!("Open Library query: {}", url);
        let parsed = self.http_get_json(&url)?;
        Ok(parsed["docs"].as_array().cloned().unwrap_or_default())
    }

    /// Picks the first item whose title equals `title` after trim + casefold.
    fn exact_title_match<'v>(items: &'v [Value], title: &str) -> Option<&'v Value> {
        let wanted = title.trim().to_lowercase();
        items.iter().find(|item| {
            let item_title = item["volumeInfo"]["title"].as_str().unwrap_or_default();
            item_title.trim().to_lowercase() == wanted
        })
    }

    /// Ranks items by title similarity against `reference`; the first-seen
    /// maximum wins ties. Seeds with the first item, like the best-candidate
    /// loops elsewhere: an all-zero field still yields a deterministic pick.
    fn best_by_title_similarity<'v>(
        items: &'v [Value],
        reference: &str,
        title_of: fn(&Value) -> &str,
    ) -> Option<&'v Value> {
        let mut best = items.first()?;
        let mut max_score = 0;
        for item in items {
            let score = similarity(&reference.to_lowercase(), &title_of(item).to_lowercase());
            if score > max_score {
                best = item;
                max_score = score;
            }
        }
        Some(best)
    }

    fn google_volume_title(item: &Value) -> &str {
        item["volumeInfo"]["title"].as_str().unwrap_or_default()
    }

    fn open_library_doc_title(doc: &Value) -> &str {
        doc["title"].as_str().unwrap_or_default()
    }

    fn string_list(value: &Value) -> Vec<String> {
        value
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Maps one Google Books item to metadata; the review link stays unknown
    /// here, the link resolver owns that field.
    fn volume_metadata(item: &Value) -> BookMetadata {
        let volume_info = &item["volumeInfo"];
        BookMetadata {
            authors: Self::string_list(&volume_info["authors"]),
            published_date: volume_info["publishedDate"].as_str().map(str::to_string),
            cover_image_url: volume_info["imageLinks"]["smallThumbnail"]
                .as_str()
                .map(str::to_string),
            review_link: Default::default(),
        }
    }

    /// Exact-title pass: Ok(None) means "no exact match", not an error.
    fn exact_lookup(&self, title: &str) -> Result<Option<BookMetadata>, String> {
        let query = format!("intitle:\"{title}\"");
        let items = self.search_google_books(&query)?;
        if items.is_empty() {
            debug!("Google Books returned no items for '{}'", title);
            return Ok(None);
        }
        match Self::exact_title_match(&items, title) {
            Some(item) => {
                info!("Exact Google Books match found for '{}'", title);
                Ok(Some(Self::volume_metadata(item)))
            }
            None => {
                debug!("No exact Google Books title match for '{}'", title);
                Ok(None)
            }
        }
    }

    /// Fallback pass over Open Library plus a title+author re-query.
    ///
    /// An Open Library request failure is the one error this resolver lets
    /// escape; everything past that point degrades with a warning.
    fn fallback_lookup(&self, title: &str) -> Result<BookMetadata, String> {
        let sanitized = sanitize_title(title);
        let docs = self.search_open_library(&sanitized)?;
        if docs.is_empty() {
            info!("No Open Library results for '{}'", sanitized);
            return Ok(BookMetadata::default());
        }

        let best_doc = Self::best_by_title_similarity(&docs, &sanitized, Self::open_library_doc_title)
            .cloned()
            .unwrap_or_default();
        info!(
            "Best Open Library match for '{}': '{}'",
            sanitized,
            Self::open_library_doc_title(&best_doc)
        );
        let fallback_authors = Self::string_list(&best_doc["author_name"]);
        let sanitized_author = fallback_authors
            .first()
            .map(|author| sanitize_title(author))
            .unwrap_or_default();

        let query = format!("intitle:\"{sanitized}\" inauthor:\"{sanitized_author}\"");
        match self.search_google_books(&query) {
            Ok(items) if !items.is_empty() => {
                let best_item =
                    Self::best_by_title_similarity(&items, &sanitized, Self::google_volume_title)
                        .cloned()
                        .unwrap_or_default();
                info!(
                    "Title+author Google Books match for '{}': '{}'",
                    sanitized,
                    Self::google_volume_title(&best_item)
                );
                let mut metadata = Self::volume_metadata(&best_item);
                if metadata.authors.is_empty() {
                    metadata.authors = fallback_authors;
                }
                Ok(metadata)
            }
            Ok(_) => {
                debug!("No results from title+author Google Books query");
                Ok(BookMetadata {
                    authors: fallback_authors,
                    ..Default::default()
                })
            }
            Err(error) => {
                warn!("Title+author Google Books query failed: {}", error);
                Ok(BookMetadata {
                    authors: fallback_authors,
                    ..Default::default()
                })
            }
        }
    }
}

impl Default for MetadataResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveMetadata for MetadataResolver {
    fn resolve(&self, title: &str) -> Result<BookMetadata, String> {
        debug!("Resolving metadata for '{}'", title);
        match self.exact_lookup(title) {
            Ok(Some(metadata)) => return Ok(metadata),
            Ok(None) => {}
            Err(error) => warn!("Google Books exact search failed: {}", error),
        }
        self.fallback_lookup(title)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::MetadataResolver;
    use crate::protocol::ReviewLink;

    fn volume(title: &str, authors: &[&str]) -> Value {
        json!({
            "volumeInfo": {
                "title": title,
                "authors": authors,
                "publishedDate": "1965",
                "imageLinks": { "smallThumbnail": format!("https://img.example/{title}.jpg") }
            }
        })
    }

    #[test]
    fn test_exact_title_match_is_case_and_whitespace_insensitive() {
        let items = vec![volume("dune messiah", &[]), volume("  DUNE  ", &["Frank Herbert"])];
        let matched =
            MetadataResolver::exact_title_match(&items, "dune").expect("should match second item");
        assert_eq!(matched["volumeInfo"]["title"], "  DUNE  ");
    }

    #[test]
    fn test_exact_title_match_takes_first_of_several() {
        let items = vec![
            volume("Dune", &["Frank Herbert"]),
            volume("DUNE", &["Someone Else"]),
        ];
        let matched = MetadataResolver::exact_title_match(&items, "Dune").expect("match");
        assert_eq!(matched["volumeInfo"]["authors"][0], "Frank Herbert");
    }

    #[test]
    fn test_exact_title_match_rejects_superstring_titles() {
        let items = vec![volume("Dune Messiah", &[])];
        assert!(MetadataResolver::exact_title_match(&items, "Dune").is_none());
    }

    #[test]
    fn test_best_by_title_similarity_keeps_first_seen_maximum() {
        let items = vec![
            volume("the dispossessed", &[]),
            volume("the word for world is forest", &[]),
            volume("word for world is forest", &[]),
        ];
        let best = MetadataResolver::best_by_title_similarity(
            &items,
            "the word for world is forest",
            MetadataResolver::google_volume_title,
        )
        .expect("non-empty input");
        assert_eq!(best["volumeInfo"]["title"], "the word for world is forest");
    }

    #[test]
    fn test_best_by_title_similarity_defaults_to_first_on_all_zero() {
        let items = vec![volume("alpha", &[]), volume("beta", &[])];
        let best = MetadataResolver::best_by_title_similarity(
            &items,
            "unrelated",
            MetadataResolver::google_volume_title,
        )
        .expect("non-empty input");
        assert_eq!(best["volumeInfo"]["title"], "alpha");
    }

    #[test]
    fn test_volume_metadata_maps_fields_and_leaves_link_unknown() {
        let metadata = MetadataResolver::volume_metadata(&volume("Dune", &["Frank Herbert"]));
        assert_eq!(metadata.authors, vec!["Frank Herbert".to_string()]);
        assert_eq!(metadata.published_date.as_deref(), Some("1965"));
        assert_eq!(
            metadata.cover_image_url.as_deref(),
            Some("https://img.example/Dune.jpg")
        );
        assert_eq!(metadata.review_link, ReviewLink::Unknown);
    }

    #[test]
    fn test_volume_metadata_tolerates_missing_optional_fields() {
        let metadata = MetadataResolver::volume_metadata(&json!({
            "volumeInfo": { "title": "Untracked" }
        }));
        assert!(metadata.authors.is_empty());
        assert_eq!(metadata.published_date, None);
        assert_eq!(metadata.cover_image_url, None);
    }

    #[test]
    fn test_string_list_skips_non_string_entries() {
        let authors = MetadataResolver::string_list(&json!(["Ursula K. Le Guin", 7, null]));
        assert_eq!(authors, vec!["Ursula K. Le Guin".to_string()]);
    }
}
