use chrono::{LocalResult, NaiveDate, TimeZone, Utc};
use mongodb::bson::DateTime as BsonDateTime;

/// Calendar dates are stored as "YYYY-MM-DD" strings, always UTC.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn bson_to_iso(dt: &BsonDateTime) -> String {
    match Utc.timestamp_millis_opt(dt.timestamp_millis()) {
        LocalResult::Single(value) => value.to_rfc3339(),
        LocalResult::Ambiguous(first, _) => first.to_rfc3339(),
        LocalResult::None => Utc.timestamp_millis_opt(0).unwrap().to_rfc3339(),
    }
}

pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn date_to_str(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_string_round_trip() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let s = date_to_str(date);
        assert_eq!(s, "2025-03-07");
        assert_eq!(parse_date(&s), Some(date));
    }

    #[test]
    fn parse_rejects_non_dates() {
        assert_eq!(parse_date("not-a-date"), None);
        assert_eq!(parse_date("2025-13-40"), None);
    }
}
