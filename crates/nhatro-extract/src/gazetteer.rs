//! Gazetteer: districts, wards, streets and amenity patterns driving the matchers.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// On-disk shape of the gazetteer document (YAML; JSON parses too).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GazetteerConfig {
    #[serde(default)]
    pub districts: Vec<String>,
    #[serde(default)]
    pub wards: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub streets: Vec<String>,
    #[serde(default)]
    pub amenity_patterns: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum GazetteerError {
    #[error("reading gazetteer {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing gazetteer {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A configured name together with the compiled pattern that finds it.
#[derive(Debug, Clone)]
pub struct NamedPattern {
    pub name: String,
    pub regex: Regex,
}

/// Compiled, immutable reference data. Built once per process.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    districts: Vec<NamedPattern>,
    wards: HashMap<String, Vec<NamedPattern>>,
    streets: Vec<NamedPattern>,
    amenities: Vec<NamedPattern>,
}

impl Gazetteer {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_config(config: GazetteerConfig) -> Self {
        let districts = config
            .districts
            .iter()
            .filter_map(|name| compile_named(name, whole_word_pattern(name)))
            .collect();

        let wards = config
            .wards
            .iter()
            .map(|(district, wards)| {
                let compiled = wards
                    .iter()
                    .filter_map(|name| compile_named(name, whole_word_pattern(name)))
                    .collect();
                (district.trim().to_string(), compiled)
            })
            .collect();

        let streets = config
            .streets
            .iter()
            .filter_map(|name| compile_named(name, street_pattern(name)))
            .collect();

        let amenities = config
            .amenity_patterns
            .iter()
            .filter_map(|(label, pattern)| compile_named(label, pattern.clone()))
            .collect();

        Self {
            districts,
            wards,
            streets,
            amenities,
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        let config: GazetteerConfig = serde_yaml::from_str(text)?;
        Ok(Self::from_config(config))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GazetteerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| GazetteerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|source| GazetteerError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the gazetteer, degrading to an empty one on any failure.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(gazetteer) => {
                info!(
                    districts = gazetteer.districts.len(),
                    ward_lists = gazetteer.wards.len(),
                    streets = gazetteer.streets.len(),
                    amenities = gazetteer.amenities.len(),
                    "gazetteer loaded"
                );
                gazetteer
            }
            Err(err) => {
                warn!(error = %err, "gazetteer unavailable; continuing with empty reference data");
                Self::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
            && self.wards.is_empty()
            && self.streets.is_empty()
            && self.amenities.is_empty()
    }

    /// Districts in declaration order.
    pub fn districts(&self) -> &[NamedPattern] {
        &self.districts
    }

    /// Wards configured for `district`, in declaration order.
    pub fn wards_of(&self, district: &str) -> &[NamedPattern] {
        self.wards.get(district).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn streets(&self) -> &[NamedPattern] {
        &self.streets
    }

    pub fn amenities(&self) -> &[NamedPattern] {
        &self.amenities
    }
}

fn whole_word_pattern(name: &str) -> String {
    format!(r"\b{}\b", regex::escape(name.trim()))
}

// House number (optionally with /sub-numbers) before the street, unit number after it.
fn street_pattern(name: &str) -> String {
    format!(
        r"\b((?:\d+(?:/\d+)*\s*)?{}(?:\s+\d+)?)\b",
        regex::escape(name.trim())
    )
}

fn compile_named(name: &str, pattern: String) -> Option<NamedPattern> {
    if name.trim().is_empty() {
        return None;
    }
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(regex) => Some(NamedPattern {
            name: name.trim().to_string(),
            regex,
        }),
        Err(err) => {
            warn!(name, pattern = %pattern, error = %err, "dropping gazetteer entry with invalid pattern");
            None
        }
    }
}
