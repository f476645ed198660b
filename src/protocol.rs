//! Data model shared by the probe, resolver, cache, and presence layers.

/// Coarse host-application state sampled at the top of every poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentState {
    pub is_host_running: bool,
    pub has_titled_document: bool,
}

/// Point-in-time extraction of the open document and its reading progress.
///
/// `title` is the identity key for everything downstream: cache rows,
/// metadata lookups, and the review-link search are all keyed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub title: String,
    pub page_label: String,
    pub chapter_progress_label: String,
}

/// Review-site link lookup result.
///
/// `Unknown` ("not yet looked up") and `ConfirmedAbsent` ("looked up, none
/// found") must stay distinct; plain optionality would collapse them.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum ReviewLink {
    #[default]
    Unknown,
    ConfirmedAbsent,
    Present(String),
}

impl ReviewLink {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Present(url) => Some(url.as_str()),
            Self::Unknown | Self::ConfirmedAbsent => None,
        }
    }
}

/// Best-effort book metadata resolved for one document title.
///
/// An all-absent value is itself valid and cacheable; it means both sources
/// came up empty, not that resolution failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct BookMetadata {
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub review_link: ReviewLink,
}

/// Action button attached to a published presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceButton {
    pub label: String,
    pub url: String,
}

/// Structured payload handed to the presence publisher each cycle.
///
/// Derived fresh from a [`DocumentSnapshot`] plus [`BookMetadata`]; never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceDescriptor {
    pub details: String,
    pub state: String,
    /// Unix timestamp in milliseconds for the activity start.
    pub start_timestamp_ms: i64,
    pub large_image: String,
    pub large_image_text: String,
    pub small_image: Option<String>,
    pub small_image_text: Option<String>,
    pub buttons: Vec<PresenceButton>,
}
