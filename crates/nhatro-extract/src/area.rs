//! Floor area in square meters.

use std::sync::LazyLock;

use regex::Regex;

use crate::ExtractionWarning;

static AREA_WITH_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:m2|m²|mét vuông|met vuong)(?:[^\p{L}\p{N}_]|$)")
        .expect("area pattern")
});

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("number pattern"));

/// First number immediately followed by a square-meter unit.
pub fn parse_area(text: &str) -> Option<f64> {
    let caps = AREA_WITH_UNIT.captures(text)?;
    read_area(&caps[1])
}

/// Area from a dedicated area cell; the unit may be missing there.
pub fn parse_area_label(text: &str) -> Option<f64> {
    parse_area(text).or_else(|| {
        let matched = FIRST_NUMBER.find(text)?;
        read_area(matched.as_str())
    })
}

fn read_area(number: &str) -> Option<f64> {
    match number.replace(',', ".").parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            ExtractionWarning::UnparsableNumber {
                field: "area",
                matched: number.to_string(),
            }
            .emit();
            None
        }
    }
}
