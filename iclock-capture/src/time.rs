use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub trait TimeSource {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

// Milliseconds since the epoch, as sent back to the device in STAMP=
pub fn unix_millis(time: OffsetDateTime) -> i64 {
    time.unix_timestamp() * 1_000 + i64::from(time.millisecond())
}

pub fn to_rfc3339(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| time.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn millis_include_sub_second_part() {
        let time = datetime!(2024-01-15 09:00:00.123 UTC);
        assert_eq!(unix_millis(time), 1_705_309_200_123);
    }

    #[test]
    fn formats_rfc3339() {
        let time = datetime!(2024-01-15 09:00:00 UTC);
        assert_eq!(to_rfc3339(time), "2024-01-15T09:00:00Z");
    }
}
