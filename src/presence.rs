//! Presence publisher contract and descriptor construction.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::{BookMetadata, DocumentSnapshot, PresenceButton, PresenceDescriptor};

/// Large-image fallback when no cover art was resolved.
pub const APP_ICON_URL: &str =
    "https://help.apple.com/assets/67368A9179C56FB1B106D02B/67368A97231AFF3D8A0ADB76/en_US/3805d456c1f34d7f9d4f023a12a0bb67.png";
const HOST_APP_NAME: &str = "Apple Books";
const REVIEW_BUTTON_LABEL: &str = "View on goodreads";
const MAX_DETAILS_CHARS: usize = 128;

/// Wire surface for the status-sharing protocol.
///
/// Failures must propagate to the caller: the orchestration loop depends on
/// seeing them to trigger reconnect. `close` clears the connection handle
/// unconditionally, even when the close itself fails.
pub trait PresencePublisher {
    fn connect(&mut self) -> Result<(), String>;
    fn close(&mut self) -> Result<(), String>;
    fn is_connected(&self) -> bool;
    fn set_activity(&mut self, descriptor: &PresenceDescriptor) -> Result<(), String>;
    fn clear_activity(&mut self) -> Result<(), String>;
}

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Presence details are capped at 128 chars; longer titles get an ellipsis.
fn truncate_title(title: &str) -> String {
    if title.chars().count() > MAX_DETAILS_CHARS {
        let head: String = title.chars().take(MAX_DETAILS_CHARS - 4).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

/// One author renders as-is; several render as `"<first> et al."`.
fn truncate_authors(authors: &[String]) -> String {
    match authors {
        [] => String::new(),
        [only] => only.clone(),
        [first, ..] => format!("{first} et al."),
    }
}

/// Builds the per-cycle presence payload.
///
/// With cover art: cover as the large image, the app icon tucked into the
/// small slot, and a review button when a link is present. Without cover
/// art: app icon as the large image and no buttons.
pub fn build_descriptor(
    snapshot: &DocumentSnapshot,
    metadata: &BookMetadata,
    start_timestamp_ms: i64,
) -> PresenceDescriptor {
    let page = snapshot.page_label.to_lowercase();
    let author_line = truncate_authors(&metadata.authors);
    let state = if author_line.is_empty() {
        page
    } else {
        format!("{author_line}, {page}")
    };

    let mut descriptor = PresenceDescriptor {
        details: truncate_title(&snapshot.title),
        state,
        start_timestamp_ms,
        large_image: APP_ICON_URL.to_string(),
        large_image_text: snapshot.title.clone(),
        small_image: None,
        small_image_text: None,
        buttons: Vec::new(),
    };

    if let Some(cover_url) = &metadata.cover_image_url {
        descriptor.large_image = cover_url.clone();
        descriptor.small_image = Some(APP_ICON_URL.to_string());
        descriptor.small_image_text = Some(HOST_APP_NAME.to_string());
        if let Some(url) = metadata.review_link.url() {
            descriptor.buttons.push(PresenceButton {
                label: REVIEW_BUTTON_LABEL.to_string(),
                url: url.to_string(),
            });
        }
    }

    descriptor
}

#[cfg(test)]
mod tests {
    use super::{build_descriptor, truncate_authors, truncate_title, APP_ICON_URL};
    use crate::protocol::{BookMetadata, DocumentSnapshot, ReviewLink};

    fn sample_snapshot() -> DocumentSnapshot {
        DocumentSnapshot {
            title: "Dune".to_string(),
            page_label: "Page 42 of 412".to_string(),
            chapter_progress_label: "12 pages left in chapter".to_string(),
        }
    }

    fn resolved_metadata() -> BookMetadata {
        BookMetadata {
            authors: vec!["Frank Herbert".to_string()],
            published_date: Some("1965".to_string()),
            cover_image_url: Some("https://img.example/dune.jpg".to_string()),
            review_link: ReviewLink::Present(
                "https://www.goodreads.com/book/show/234225.Dune".to_string(),
            ),
        }
    }

    #[test]
    fn test_descriptor_with_cover_and_link_carries_button() {
        let descriptor = build_descriptor(&sample_snapshot(), &resolved_metadata(), 1_000);
        assert_eq!(descriptor.details, "Dune");
        assert_eq!(descriptor.state, "Frank Herbert, page 42 of 412");
        assert_eq!(descriptor.large_image, "https://img.example/dune.jpg");
        assert_eq!(descriptor.small_image.as_deref(), Some(APP_ICON_URL));
        assert_eq!(descriptor.buttons.len(), 1);
        assert_eq!(descriptor.buttons[0].label, "View on goodreads");
    }

    #[test]
    fn test_unresolved_metadata_falls_back_to_app_icon_without_buttons() {
        let descriptor = build_descriptor(&sample_snapshot(), &BookMetadata::default(), 1_000);
        assert_eq!(descriptor.large_image, APP_ICON_URL);
        assert_eq!(descriptor.small_image, None);
        assert!(descriptor.buttons.is_empty());
        assert_eq!(descriptor.state, "page 42 of 412");
    }

    #[test]
    fn test_coverless_metadata_omits_button_even_with_link() {
        let metadata = BookMetadata {
            cover_image_url: None,
            ..resolved_metadata()
        };
        let descriptor = build_descriptor(&sample_snapshot(), &metadata, 1_000);
        assert_eq!(descriptor.large_image, APP_ICON_URL);
        assert!(descriptor.buttons.is_empty());
    }

    #[test]
    fn test_confirmed_absent_link_omits_button() {
        let metadata = BookMetadata {
            review_link: ReviewLink::ConfirmedAbsent,
            ..resolved_metadata()
        };
        let descriptor = build_descriptor(&sample_snapshot(), &metadata, 1_000);
        assert!(descriptor.buttons.is_empty());
    }

    #[test]
    fn test_truncate_title_caps_long_titles() {
        let long_title = "x".repeat(200);
        let truncated = truncate_title(&long_title);
        assert_eq!(truncated.chars().count(), 127);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_title("Dune"), "Dune");
    }

    #[test]
    fn test_truncate_authors_et_al() {
        assert_eq!(truncate_authors(&[]), "");
        assert_eq!(truncate_authors(&["Frank Herbert".to_string()]), "Frank Herbert");
        assert_eq!(
            truncate_authors(&["Terry Pratchett".to_string(), "Neil Gaiman".to_string()]),
            "Terry Pratchett et al."
        );
    }
}
