//! Street address: the earliest configured street mention in the text.

use crate::gazetteer::Gazetteer;

/// Street mention with its house and unit numbers, earliest offset first.
/// Equal offsets keep configuration order.
pub fn match_address(text: &str, gazetteer: &Gazetteer) -> Option<String> {
    gazetteer
        .streets()
        .iter()
        .flat_map(|street| street.regex.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .min_by_key(|found| found.start())
        .map(|found| found.as_str().trim().to_string())
        .filter(|address| !address.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gazetteer() -> Gazetteer {
        Gazetteer::from_yaml_str(
            r#"
streets: ["Nguyễn Văn Linh", "Lê Duẩn", "Hoàng Diệu"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn earliest_offset_wins_over_configuration_order() {
        let address = match_address(
            "Nhà 45 Lê Duẩn, cách Nguyễn Văn Linh 200m",
            &gazetteer(),
        );
        assert_eq!(address.as_deref(), Some("45 Lê Duẩn"));
    }

    #[test]
    fn keeps_house_and_unit_numbers() {
        assert_eq!(
            match_address("kiệt 12/3 hoàng diệu 5, gần chợ", &gazetteer()).as_deref(),
            Some("12/3 hoàng diệu 5")
        );
    }

    #[test]
    fn bare_street_name() {
        assert_eq!(
            match_address("mặt tiền Nguyễn Văn Linh", &gazetteer()).as_deref(),
            Some("Nguyễn Văn Linh")
        );
    }

    #[test]
    fn no_configured_street() {
        assert_eq!(match_address("đường Trần Phú", &gazetteer()), None);
        assert_eq!(match_address("45 Lê Duẩn", &Gazetteer::empty()), None);
    }
}
