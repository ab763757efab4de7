//! District and ward lookup against the gazetteer.

use crate::gazetteer::Gazetteer;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub district: Option<String>,
    pub ward: Option<String>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.district.is_none()
    }
}

/// First configured district whose name occurs as a whole word, then the
/// first of that district's wards. Declaration order breaks ties.
pub fn match_location(text: &str, gazetteer: &Gazetteer) -> Location {
    let Some(district) = gazetteer
        .districts()
        .iter()
        .find(|district| district.regex.is_match(text))
    else {
        return Location::default();
    };

    let ward = gazetteer
        .wards_of(&district.name)
        .iter()
        .find(|ward| ward.regex.is_match(text))
        .map(|ward| ward.name.clone());

    Location {
        district: Some(district.name.clone()),
        ward,
    }
}
