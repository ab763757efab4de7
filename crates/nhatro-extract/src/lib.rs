//! Field extractors, record assembly and post-bundle loading for nhatro.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use nhatro_core::{fingerprint, RawPost, StructuredRecord};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub mod address;
pub mod amenity;
pub mod area;
pub mod contact;
pub mod gazetteer;
pub mod location;
pub mod posted_at;
pub mod price;

pub use address::match_address;
pub use amenity::match_amenities;
pub use area::{parse_area, parse_area_label};
pub use contact::{normalize_phone, parse_contact};
pub use gazetteer::{Gazetteer, GazetteerConfig, GazetteerError};
pub use location::{match_location, Location};
pub use posted_at::parse_posted_at;
pub use price::{parse_price, parse_price_label};

pub const CRATE_NAME: &str = "nhatro-extract";

/// A field that degraded to its sentinel. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionWarning {
    #[error("{field}: matched {matched:?} but could not read a number from it")]
    UnparsableNumber {
        field: &'static str,
        matched: String,
    },
    #[error("posted_at: unrecognised timestamp {0:?}")]
    UnrecognisedTimestamp(String),
}

impl ExtractionWarning {
    pub(crate) fn emit(self) {
        warn!(warning = %self, "field extraction fell back to its sentinel");
    }
}

/// Builds one [`StructuredRecord`] per raw post from independent extractors.
#[derive(Debug, Clone, Copy)]
pub struct RecordAssembler<'g> {
    gazetteer: &'g Gazetteer,
}

impl<'g> RecordAssembler<'g> {
    pub fn new(gazetteer: &'g Gazetteer) -> Self {
        Self { gazetteer }
    }

    /// Assemble a record. Never fails: every field falls back to its sentinel.
    /// `observed_at` stamps records whose posting time is unknown.
    pub fn assemble(&self, post: &RawPost, observed_at: DateTime<Utc>) -> StructuredRecord {
        let content = post.content.trim();
        if content.is_empty() {
            return StructuredRecord::empty(observed_at);
        }

        let price = dedicated(&post.raw_price_text)
            .map(parse_price_label)
            .filter(|price| *price > 0)
            .unwrap_or_else(|| parse_price(content));

        let area = dedicated(&post.raw_area_text)
            .and_then(parse_area_label)
            .or_else(|| parse_area(content));

        let location = dedicated(&post.raw_address_text)
            .map(|text| match_location(text, self.gazetteer))
            .filter(|location| !location.is_empty())
            .unwrap_or_else(|| match_location(content, self.gazetteer));

        let address = dedicated(&post.raw_address_text)
            .map(str::to_string)
            .or_else(|| match_address(content, self.gazetteer));

        let contact = dedicated(&post.raw_contact_text)
            .and_then(parse_contact)
            .or_else(|| parse_contact(content));

        let timestamp = post
            .raw_posted_at
            .as_deref()
            .and_then(parse_posted_at)
            .unwrap_or(observed_at);

        StructuredRecord {
            id: fingerprint(content),
            timestamp,
            content: content.to_string(),
            area,
            district: location.district,
            ward: location.ward,
            address,
            amenities: match_amenities(content, self.gazetteer),
            price,
            contact,
        }
    }
}

fn dedicated(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Pages of raw posts captured from one source by the scraping collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostBundle {
    pub source_id: String,
    #[serde(default)]
    pub captured_from_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub pages: Vec<PostPage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostPage {
    #[serde(default)]
    pub posts: Vec<RawPost>,
}

impl PostBundle {
    pub fn post_count(&self) -> usize {
        self.pages.iter().map(|page| page.posts.len()).sum()
    }
}

pub fn load_post_bundle(path: impl AsRef<Path>) -> Result<PostBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn observed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap()
    }

    fn gazetteer() -> Gazetteer {
        Gazetteer::from_yaml_str(
            r#"
districts: ["Hải Châu", "Sơn Trà"]
wards:
  "Hải Châu": ["Hòa Cường Bắc"]
streets: ["Núi Thành"]
amenity_patterns:
  wifi: "wi-?fi"
  "máy lạnh": "máy lạnh|điều hòa"
"#,
        )
        .unwrap()
    }

    #[test]
    fn assembles_every_field_from_content() {
        let gazetteer = gazetteer();
        let post = RawPost::from_content(
            "Cho thuê phòng 25m2 tại 120 Núi Thành, Hòa Cường Bắc, Hải Châu. \
             Có máy lạnh, wifi. Giá 3tr5. LH 0905.123.456",
        );
        let record = RecordAssembler::new(&gazetteer).assemble(&post, observed_at());

        assert_eq!(record.id, fingerprint(&post.content));
        assert_eq!(record.timestamp, observed_at());
        assert_eq!(record.area, Some(25.0));
        assert_eq!(record.district.as_deref(), Some("Hải Châu"));
        assert_eq!(record.ward.as_deref(), Some("Hòa Cường Bắc"));
        assert_eq!(record.address.as_deref(), Some("120 Núi Thành"));
        assert_eq!(record.amenities_joined(), "máy lạnh, wifi");
        assert_eq!(record.price, 3_500_000);
        assert_eq!(record.contact.as_deref(), Some("0905123456"));
    }

    #[test]
    fn empty_content_yields_all_sentinels() {
        let gazetteer = gazetteer();
        let post = RawPost {
            content: "   ".to_string(),
            raw_price_text: "3 triệu".to_string(),
            ..Default::default()
        };
        let record = RecordAssembler::new(&gazetteer).assemble(&post, observed_at());
        assert_eq!(record, StructuredRecord::empty(observed_at()));
    }

    #[test]
    fn missing_gazetteer_still_assembles() {
        let gazetteer = Gazetteer::empty();
        let post = RawPost::from_content("Phòng Hải Châu 20m2 giá 2 triệu, có wifi");
        let record = RecordAssembler::new(&gazetteer).assemble(&post, observed_at());
        assert!(record.has_identity());
        assert_eq!(record.price, 2_000_000);
        assert_eq!(record.area, Some(20.0));
        assert_eq!(record.district, None);
        assert!(record.amenities.is_empty());
    }

    #[test]
    fn dedicated_cells_take_precedence() {
        let gazetteer = gazetteer();
        let post = RawPost {
            content: "Phòng đẹp Sơn Trà, giá 4 triệu, LH 0905111222".to_string(),
            raw_price_text: "3.800.000 đ/tháng".to_string(),
            raw_area_text: "28".to_string(),
            raw_address_text: "K15 Núi Thành, Hòa Cường Bắc, Hải Châu".to_string(),
            raw_contact_text: "0935 222 333".to_string(),
            raw_posted_at: Some("Thứ 2, 08:00 02/03/2026".to_string()),
        };
        let record = RecordAssembler::new(&gazetteer).assemble(&post, observed_at());

        assert_eq!(record.price, 3_800_000);
        assert_eq!(record.area, Some(28.0));
        assert_eq!(record.district.as_deref(), Some("Hải Châu"));
        assert_eq!(record.ward.as_deref(), Some("Hòa Cường Bắc"));
        assert_eq!(
            record.address.as_deref(),
            Some("K15 Núi Thành, Hòa Cường Bắc, Hải Châu")
        );
        assert_eq!(record.contact.as_deref(), Some("0935222333"));
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).single().unwrap()
        );
    }

    #[test]
    fn unusable_dedicated_cells_fall_back_to_content() {
        let gazetteer = gazetteer();
        let post = RawPost {
            content: "Phòng Sơn Trà giá 4 triệu, LH 0905111222".to_string(),
            raw_price_text: "Thỏa thuận".to_string(),
            raw_address_text: "gần biển".to_string(),
            raw_contact_text: "nhắn tin".to_string(),
            raw_posted_at: Some("hôm qua".to_string()),
            ..Default::default()
        };
        let record = RecordAssembler::new(&gazetteer).assemble(&post, observed_at());

        assert_eq!(record.price, 4_000_000);
        assert_eq!(record.district.as_deref(), Some("Sơn Trà"));
        assert_eq!(record.address.as_deref(), Some("gần biển"));
        assert_eq!(record.contact.as_deref(), Some("0905111222"));
        assert_eq!(record.timestamp, observed_at());
    }
}
