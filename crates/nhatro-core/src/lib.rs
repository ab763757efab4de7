//! Core domain model and content fingerprinting for nhatro.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const CRATE_NAME: &str = "nhatro-core";

/// Length of a non-empty fingerprint (hex-encoded SHA-256).
pub const FINGERPRINT_LEN: usize = 64;

/// Raw text blobs handed over by the scraping collaborator for one post.
///
/// The dedicated `raw_*` texts are optional cells the collaborator may have
/// isolated already (a price label, an address row). Blank means not supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub raw_price_text: String,
    #[serde(default)]
    pub raw_area_text: String,
    #[serde(default)]
    pub raw_address_text: String,
    #[serde(default)]
    pub raw_contact_text: String,
    #[serde(default)]
    pub raw_posted_at: Option<String>,
}

impl RawPost {
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// One extracted listing, keyed by the fingerprint of its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub area: Option<f64>,
    pub district: Option<String>,
    pub ward: Option<String>,
    pub address: Option<String>,
    pub amenities: BTreeSet<String>,
    /// Price in VND; 0 means unknown.
    pub price: i64,
    pub contact: Option<String>,
}

impl StructuredRecord {
    /// Record carrying only sentinels.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            timestamp,
            content: String::new(),
            area: None,
            district: None,
            ward: None,
            address: None,
            amenities: BTreeSet::new(),
            price: 0,
            contact: None,
        }
    }

    /// Whether the record has an identity usable for reconciliation.
    pub fn has_identity(&self) -> bool {
        !self.id.is_empty()
    }

    /// Amenity labels joined the way the flat file stores them.
    pub fn amenities_joined(&self) -> String {
        self.amenities
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Lowercase, collapse whitespace runs to one space, trim.
pub fn normalize_content(content: &str) -> String {
    content
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable identity of a post's content. Empty content yields an empty id.
pub fn fingerprint(content: &str) -> String {
    let normalized = normalize_content(content);
    if normalized.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
