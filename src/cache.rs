//! Per-title metadata memoization over the persistent store.
//!
//! One entry per distinct title per run: the store is wiped at process start
//! and entries are never mutated after creation. The first population
//! persists the link-enriched copy but hands the pre-enrichment copy back to
//! its caller; only subsequent hits observe the review link.

use log::{debug, info, warn};

use crate::db_manager::DbManager;
use crate::link_resolver::ResolveReviewLink;
use crate::metadata_resolver::ResolveMetadata;
use crate::protocol::BookMetadata;

pub struct BookCache<R, L> {
    db: DbManager,
    resolver: R,
    link_resolver: L,
}

impl<R: ResolveMetadata, L: ResolveReviewLink> BookCache<R, L> {
    pub fn new(db: DbManager, resolver: R, link_resolver: L) -> Self {
        Self {
            db,
            resolver,
            link_resolver,
        }
    }

    /// Deletes every stored entry, one key at a time. Run once at startup,
    /// so memoization only spans one process lifetime.
    pub fn clear(&self) {
        info!("Clearing cache store...");
        let titles = match self.db.list_titles() {
            Ok(titles) => titles,
            Err(error) => {
                warn!("Failed to list cache entries: {}", error);
                return;
            }
        };
        for title in titles {
            info!("Deleting cache entry: {}", title);
            if let Err(error) = self.db.delete(&title) {
                warn!("Failed to delete cache entry '{}': {}", title, error);
            }
        }
        info!("Cache store cleared");
    }

    pub fn get(&self, title: &str) -> Option<BookMetadata> {
        let row = match self.db.get(title) {
            Ok(row) => row?,
            Err(error) => {
                warn!("Cache read failed for '{}': {}", title, error);
                return None;
            }
        };
        match serde_json::from_str(&row) {
            Ok(metadata) => Some(metadata),
            Err(error) => {
                warn!("Discarding unreadable cache entry for '{}': {}", title, error);
                None
            }
        }
    }

    /// Returns the memoized metadata for `title`, resolving on first sight.
    ///
    /// A hit returns the stored value with no re-resolution and no
    /// re-enrichment. A miss resolves, enriches a copy with the review link,
    /// persists the enriched copy, and returns the pre-enrichment value.
    /// Resolver failure propagates as absence without storing anything.
    pub fn get_or_resolve(&self, title: &str) -> Option<BookMetadata> {
        if let Some(cached) = self.get(title) {
            debug!("Cache hit for '{}'", title);
            return Some(cached);
        }

        debug!("Cache miss for '{}'; resolving", title);
        let metadata = match self.resolver.resolve(title) {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Metadata resolution failed for '{}': {}", title, error);
                return None;
            }
        };

        let mut enriched = metadata.clone();
        enriched.review_link = self.link_resolver.resolve_review_link(title, &metadata);

        match serde_json::to_string(&enriched) {
            Ok(serialized) => {
                if let Err(error) = self.db.set(title, &serialized) {
                    warn!("Failed to persist cache entry for '{}': {}", title, error);
                }
            }
            Err(error) => warn!("Failed to serialize metadata for '{}': {}", title, error),
        }

        Some(metadata)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::BookCache;
    use crate::db_manager::DbManager;
    use crate::link_resolver::ResolveReviewLink;
    use crate::metadata_resolver::ResolveMetadata;
    use crate::protocol::{BookMetadata, ReviewLink};

    struct ScriptedResolver {
        metadata: Result<BookMetadata, String>,
        calls: Cell<usize>,
    }

    impl ResolveMetadata for ScriptedResolver {
        fn resolve(&self, _title: &str) -> Result<BookMetadata, String> {
            self.calls.set(self.calls.get() + 1);
            self.metadata.clone()
        }
    }

    struct ScriptedLinkResolver {
        link: ReviewLink,
        calls: Cell<usize>,
    }

    impl ResolveReviewLink for ScriptedLinkResolver {
        fn resolve_review_link(&self, _title: &str, _metadata: &BookMetadata) -> ReviewLink {
            self.calls.set(self.calls.get() + 1);
            self.link.clone()
        }
    }

    fn dune_metadata() -> BookMetadata {
        BookMetadata {
            authors: vec!["Frank Herbert".to_string()],
            published_date: Some("1965".to_string()),
            cover_image_url: Some("https://img.example/dune.jpg".to_string()),
            review_link: ReviewLink::Unknown,
        }
    }

    fn cache_with(
        metadata: Result<BookMetadata, String>,
        link: ReviewLink,
    ) -> BookCache<ScriptedResolver, ScriptedLinkResolver> {
        BookCache::new(
            DbManager::open_in_memory().expect("open"),
            ScriptedResolver {
                metadata,
                calls: Cell::new(0),
            },
            ScriptedLinkResolver {
                link,
                calls: Cell::new(0),
            },
        )
    }

    #[test]
    fn test_get_or_resolve_first_call_withholds_review_link() {
        let link = ReviewLink::Present("https://www.goodreads.com/book/show/234225".to_string());
        let cache = cache_with(Ok(dune_metadata()), link.clone());

        let first = cache.get_or_resolve("Dune").expect("metadata");
        assert_eq!(first.authors, vec!["Frank Herbert".to_string()]);
        assert_eq!(first.review_link, ReviewLink::Unknown);

        let second = cache.get_or_resolve("Dune").expect("metadata");
        assert_eq!(second.authors, first.authors);
        assert_eq!(second.review_link, link);
    }

    #[test]
    fn test_get_or_resolve_is_idempotent_per_title() {
        let cache = cache_with(Ok(dune_metadata()), ReviewLink::ConfirmedAbsent);
        cache.get_or_resolve("Dune");
        cache.get_or_resolve("Dune");
        cache.get_or_resolve("Dune");
        assert_eq!(cache.resolver.calls.get(), 1);
        assert_eq!(cache.link_resolver.calls.get(), 1);
    }

    #[test]
    fn test_resolver_failure_propagates_absence_without_storing() {
        let cache = cache_with(Err("connection refused".to_string()), ReviewLink::Unknown);
        assert!(cache.get_or_resolve("Dune").is_none());
        assert!(cache.get("Dune").is_none());
        // Failure was not memoized: the next call resolves again.
        assert!(cache.get_or_resolve("Dune").is_none());
        assert_eq!(cache.resolver.calls.get(), 2);
    }

    #[test]
    fn test_all_absent_metadata_is_a_cacheable_result() {
        let cache = cache_with(Ok(BookMetadata::default()), ReviewLink::ConfirmedAbsent);
        let first = cache.get_or_resolve("Obscure Title").expect("metadata");
        assert!(first.authors.is_empty());

        let second = cache.get_or_resolve("Obscure Title").expect("metadata");
        assert_eq!(second.review_link, ReviewLink::ConfirmedAbsent);
        assert_eq!(cache.resolver.calls.get(), 1);
    }

    #[test]
    fn test_clear_removes_all_entries() {
        let cache = cache_with(Ok(dune_metadata()), ReviewLink::ConfirmedAbsent);
        cache.get_or_resolve("Dune");
        cache.get_or_resolve("Dune Messiah");
        cache.clear();
        assert!(cache.get("Dune").is_none());
        assert!(cache.get("Dune Messiah").is_none());
    }
}
