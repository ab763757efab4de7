//! Amenity labels from configured patterns.

use std::collections::BTreeSet;

use crate::gazetteer::Gazetteer;

/// Every label whose pattern matches, sorted. Patterns are independent: all of
/// them are evaluated regardless of earlier hits.
pub fn match_amenities(text: &str, gazetteer: &Gazetteer) -> BTreeSet<String> {
    gazetteer
        .amenities()
        .iter()
        .filter(|amenity| amenity.regex.is_match(text))
        .map(|amenity| amenity.name.clone())
        .collect()
}
