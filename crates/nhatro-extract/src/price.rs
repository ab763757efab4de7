//! Vietnamese-locale price mentions ("2.5 tỷ", "800 triệu", "5tr5") to VND.

use std::sync::LazyLock;

use regex::Regex;

use crate::ExtractionWarning;

const MILLION: f64 = 1_000_000.0;
const BILLION: f64 = 1_000_000_000.0;

static UNIT_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+[.,]?\d*)\s*(triệu|tr|tỷ|ty|trieu)\b").expect("unit price pattern")
});

static SHORTHAND_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)tr(\d)\b").expect("shorthand price pattern"));

static PLAIN_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:[.,]\d{3})+|\d{4,}").expect("plain amount pattern")
});

/// `None`: the rule does not apply. `Some(Err(_))`: it matched but the digits
/// could not be read, which ends the search with the sentinel.
type PriceRule = fn(&str) -> Option<Result<i64, ExtractionWarning>>;

/// Price in VND found in free text, 0 when unknown.
pub fn parse_price(text: &str) -> i64 {
    apply_rules(text, &[unit_price, shorthand_price])
}

/// Price from a dedicated price label. Also accepts a bare VND amount.
pub fn parse_price_label(text: &str) -> i64 {
    apply_rules(text, &[unit_price, shorthand_price, plain_amount])
}

fn apply_rules(text: &str, rules: &[PriceRule]) -> i64 {
    let lowered = text.to_lowercase();
    for rule in rules {
        match rule(&lowered) {
            None => continue,
            Some(Ok(value)) => return value,
            Some(Err(warning)) => {
                warning.emit();
                return 0;
            }
        }
    }
    0
}

fn unit_price(text: &str) -> Option<Result<i64, ExtractionWarning>> {
    let caps = UNIT_PRICE.captures(text)?;
    let scale = match &caps[2] {
        "tỷ" | "ty" => BILLION,
        _ => MILLION,
    };
    Some(read_scaled(&caps[1].replace(',', "."), scale, &caps[0]))
}

fn shorthand_price(text: &str) -> Option<Result<i64, ExtractionWarning>> {
    let caps = SHORTHAND_PRICE.captures(text)?;
    Some(read_scaled(
        &format!("{}.{}", &caps[1], &caps[2]),
        MILLION,
        &caps[0],
    ))
}

fn plain_amount(text: &str) -> Option<Result<i64, ExtractionWarning>> {
    let matched = PLAIN_AMOUNT.find(text)?.as_str();
    let digits = matched.replace(['.', ','], "");
    Some(digits.parse::<i64>().map_err(|_| unparsable(matched)))
}

fn read_scaled(number: &str, scale: f64, matched: &str) -> Result<i64, ExtractionWarning> {
    number
        .parse::<f64>()
        .map(|value| (value * scale).round() as i64)
        .map_err(|_| unparsable(matched))
}

fn unparsable(matched: &str) -> ExtractionWarning {
    ExtractionWarning::UnparsableNumber {
        field: "price",
        matched: matched.to_string(),
    }
}
