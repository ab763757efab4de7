//! Posting time as rendered by listing sites and group feeds.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::ExtractionWarning;

/// Vietnam observes UTC+07:00 all year.
const VIETNAM_OFFSET_SECS: i32 = 7 * 3600;

/// Parse a posting time and convert it to UTC.
///
/// Accepts `"Thứ 3, 14:30 05/03/2024"`, `"Tuesday, 5 March 2024 at 14:30"` and
/// `"2024-03-05 14:30[:00]"`, all read as Vietnam local time.
pub fn parse_posted_at(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let Some(naive) = listing_site_format(text)
        .or_else(|| group_feed_format(text))
        .or_else(|| iso_like_format(text))
    else {
        ExtractionWarning::UnrecognisedTimestamp(text.to_string()).emit();
        return None;
    };

    let offset = FixedOffset::east_opt(VIETNAM_OFFSET_SECS)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

fn listing_site_format(text: &str) -> Option<NaiveDateTime> {
    let (_, rest) = text.split_once(", ")?;
    NaiveDateTime::parse_from_str(rest.trim(), "%H:%M %d/%m/%Y").ok()
}

fn group_feed_format(text: &str) -> Option<NaiveDateTime> {
    let (date_part, time_part) = text.rsplit_once(" at ")?;
    let words: Vec<&str> = date_part.split_whitespace().collect();
    let [day, month, year] = words.get(words.len().checked_sub(3)?..)? else {
        return None;
    };
    let day = day.trim_end_matches(',');
    let date =
        NaiveDate::parse_from_str(&format!("{day:0>2} {month} {year}"), "%d %B %Y").ok()?;
    let time = NaiveTime::parse_from_str(time_part.trim(), "%H:%M").ok()?;
    Some(date.and_time(time))
}

fn iso_like_format(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn listing_site_timestamp() {
        assert_eq!(
            parse_posted_at("Thứ 3, 14:30 05/03/2024"),
            Some(utc("2024-03-05T07:30:00Z"))
        );
    }

    #[test]
    fn group_feed_timestamp() {
        assert_eq!(
            parse_posted_at("Tuesday, 5 March 2024 at 14:30"),
            Some(utc("2024-03-05T07:30:00Z"))
        );
    }

    #[test]
    fn iso_like_timestamp() {
        assert_eq!(
            parse_posted_at("2024-03-05 06:15:00"),
            Some(utc("2024-03-04T23:15:00Z"))
        );
        assert_eq!(
            parse_posted_at("2024-03-05 06:15"),
            Some(utc("2024-03-04T23:15:00Z"))
        );
    }

    #[test]
    fn unknown_shapes_yield_none() {
        assert_eq!(parse_posted_at("hôm qua"), None);
        assert_eq!(parse_posted_at("   "), None);
        assert_eq!(parse_posted_at("Monday at noon"), None);
    }
}
