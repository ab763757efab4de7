//! Vietnamese mobile numbers, normalized to a dialable string.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

// Delimiter, then the candidate: an optional prefix (+84, 84 or a leading zero
// that may have been typed as a letter o) and three digit groups with optional
// separators. The trailing non-word check is not captured so the delimiter can
// open the next candidate.
static PHONE_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(^|[^\w+])((\+84|84|[0oO])?[\s.-]?[0-9]{2,4}[\s.-]?[0-9]{3,4}[\s.-]?[0-9]{3,4})(?:$|[^\w])",
    )
    .expect("phone pattern")
});

/// Digits a mobile number carries after its prefix.
const SUBSCRIBER_DIGITS: std::ops::RangeInclusive<usize> = 9..=11;

/// First phone-shaped candidate in `text`, normalized; `None` if absent or rejected.
pub fn parse_contact(text: &str) -> Option<String> {
    let mut start = 0;
    while let Some(caps) = PHONE_CANDIDATE.captures_at(text, start) {
        let (Some(delimiter), Some(candidate)) = (caps.get(1), caps.get(2)) else {
            return None;
        };
        start = candidate.end();

        if continues_number(text, delimiter.start(), delimiter.as_str()) {
            continue;
        }
        let prefix_len = caps.get(3).map_or(0, |prefix| prefix.len());
        let digits = candidate.as_str()[prefix_len..]
            .chars()
            .filter(char::is_ascii_digit)
            .count();
        if !SUBSCRIBER_DIGITS.contains(&digits) {
            debug!(candidate = candidate.as_str(), digits, "digit run is not a phone");
            continue;
        }

        let normalized = normalize_phone(candidate.as_str());
        if normalized.is_none() {
            debug!(candidate = candidate.as_str(), "phone-shaped text rejected");
        }
        return normalized;
    }
    None
}

// `2.500.000.000`: the tail after a digit and a thousands separator belongs to
// the same number.
fn continues_number(text: &str, delimiter_start: usize, delimiter: &str) -> bool {
    matches!(delimiter, "." | ",")
        && text[..delimiter_start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
}

/// Normalize a phone candidate. The branch order is significant: a string can
/// satisfy more than one branch and the first one tested wins.
pub fn normalize_phone(candidate: &str) -> Option<String> {
    let contact: String = candidate
        .chars()
        .map(|c| if c == 'o' || c == 'O' { '0' } else { c })
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if let Some(rest) = contact.strip_prefix("+84") {
        if (9..=11).contains(&rest.len()) {
            return Some(contact);
        }
    }
    if contact.starts_with('0') && (9..=11).contains(&contact.len()) {
        return Some(contact);
    }
    if let Some(rest) = contact.strip_prefix("84") {
        if (9..=11).contains(&rest.len()) {
            return Some(format!("0{rest}"));
        }
    }
    if (9..=10).contains(&contact.len()) && contact.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("0{contact}"));
    }
    None
}
