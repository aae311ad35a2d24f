use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Format of timestamps inside activity logs. Locale independent, second resolution.
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// This is the standard way of converting a date to a string in ticklet.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Calendar day a moment belongs to, in local time.
pub fn local_day(moment: DateTime<Utc>) -> NaiveDate {
    moment.with_timezone(&Local).date_naive()
}

pub fn format_record_time(moment: DateTime<Utc>) -> String {
    moment
        .with_timezone(&Local)
        .format(RECORD_TIME_FORMAT)
        .to_string()
}

/// Parses a local `YYYY-MM-DD HH:MM:SS` timestamp. During a DST fold the earlier instant is used;
/// times skipped by a DST gap don't exist and yield `None`.
pub fn parse_record_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), RECORD_TIME_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|v| v.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::{Local, NaiveDate, TimeZone, Timelike, Utc};

    use super::{date_to_record_name, format_record_time, local_day, parse_record_time};

    #[test]
    fn test_record_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(date_to_record_name(date), "2024-03-07");
    }

    #[test]
    fn test_record_time_round_trip() {
        let moment = Local
            .with_ymd_and_hms(2024, 3, 7, 14, 5, 9)
            .unwrap()
            .with_timezone(&Utc);
        let text = format_record_time(moment);
        assert_eq!(text, "2024-03-07 14:05:09");
        assert_eq!(parse_record_time(&text), Some(moment));
    }

    #[test]
    fn test_record_time_drops_subseconds() {
        let moment = Local
            .with_ymd_and_hms(2024, 3, 7, 14, 5, 9)
            .unwrap()
            .with_timezone(&Utc)
            .with_nanosecond(450_000_000)
            .unwrap();
        let parsed = parse_record_time(&format_record_time(moment)).unwrap();
        assert_eq!(parsed.nanosecond(), 0);
        assert_eq!(parsed.timestamp(), moment.timestamp());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_record_time("yesterday-ish"), None);
        assert_eq!(parse_record_time(""), None);
    }

    #[test]
    fn test_local_day_uses_local_calendar() {
        let late_evening = Local.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap();
        assert_eq!(
            local_day(late_evening.with_timezone(&Utc)),
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
        );
    }
}
