use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::DateError;

/// Compact publication timestamps as written by the native CMS, always UTC.
const NATIVE_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

const UPP_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

pub fn parse_native_date(value: &str) -> Result<OffsetDateTime, DateError> {
    Ok(PrimitiveDateTime::parse(value, NATIVE_DATE_FORMAT)?.assume_utc())
}

pub fn format_upp_date(date: OffsetDateTime) -> Result<String, DateError> {
    Ok(date.to_offset(time::UtcOffset::UTC).format(UPP_DATE_FORMAT)?)
}

/// Re-emit a native publication timestamp in the platform's date format.
pub fn native_to_upp_date(value: &str) -> Result<String, DateError> {
    format_upp_date(parse_native_date(value)?)
}

pub fn upp_date_now() -> Result<String, DateError> {
    format_upp_date(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_native_to_upp_date() {
        assert_eq!(
            native_to_upp_date("20170329113430").unwrap(),
            "2017-03-29T11:34:30.000Z"
        );
    }

    #[test]
    fn test_format_upp_date_keeps_milliseconds() {
        let date = datetime!(2017-05-15 15:54:32.166 UTC);
        assert_eq!(format_upp_date(date).unwrap(), "2017-05-15T15:54:32.166Z");
    }

    #[test]
    fn test_format_upp_date_converts_to_utc() {
        let date = datetime!(2017-05-15 17:54:32.166 +2);
        assert_eq!(format_upp_date(date).unwrap(), "2017-05-15T15:54:32.166Z");
    }

    #[test]
    fn test_invalid_native_dates() {
        assert!(parse_native_date("").is_err());
        assert!(parse_native_date("2017-03-29").is_err());
        assert!(parse_native_date("20171329113430").is_err());
    }
}
