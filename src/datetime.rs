//! Decoded dive timestamps and the three-bit-year epoch-completion
//! heuristic used by the Oceanic family's truncated year field.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParsedDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ParsedDateTime {
    pub fn to_naive(self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_opt(
            self.hour,
            self.minute,
            self.second,
        )
    }
}

/// Decode a Unix-epoch tick count as UTC (`dc_datetime_gmtime`), as used by
/// the Shearwater family's dive-start timestamp field.
pub fn gmtime_from_unix(ticks: i64) -> ParsedDateTime {
    let dt: DateTime<Utc> = DateTime::from_timestamp(ticks, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    ParsedDateTime {
        year: dt.year(),
        month: dt.month(),
        day: dt.day(),
        hour: dt.hour(),
        minute: dt.minute(),
        second: dt.second(),
    }
}

/// Complete a 3-bit (0-7) or otherwise truncated year against the host's
/// current year, per the Oceanic family's decode heuristic: if the decoded
/// year is `< 2010` and the host year is `>= 2010`, add the host's decade,
/// stepping back one decade if the dive's year-mod-10 exceeds the host's.
///
/// Applies only to the families whose source explicitly uses a truncated
/// year field (the Oceanic Atom2/VT Pro/Veo250 family); other families
/// decode an absolute year directly and must not call this.
pub fn complete_truncated_year(decoded_year: i32, host_year: i32) -> i32 {
    if decoded_year >= 2010 || host_year < 2010 {
        return decoded_year;
    }
    let mut decade = (host_year / 10) * 10;
    if decoded_year % 10 > host_year % 10 {
        decade -= 10;
    }
    decoded_year - 2000 + decade
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_decade_boundary() {
        // year_device == 9 (decoded as 2009), host_year_mod_10 == 0.
        assert_eq!(complete_truncated_year(2009, 2020), 2019);
    }

    #[test]
    fn same_decade_as_host() {
        // year_device == 0 (decoded as 2000), host_year_mod_10 == 9.
        assert_eq!(complete_truncated_year(2000, 2019), 2010);
    }

    #[test]
    fn no_completion_for_modern_years() {
        assert_eq!(complete_truncated_year(2021, 2024), 2021);
    }

    #[test]
    fn gmtime_decodes_unix_epoch_tick() {
        let dt = gmtime_from_unix(1_700_000_000);
        assert_eq!(dt.year, 2023);
    }

    #[test]
    fn naive_round_trip() {
        let dt = ParsedDateTime {
            year: 2024,
            month: 3,
            day: 5,
            hour: 10,
            minute: 30,
            second: 0,
        };
        let naive = dt.to_naive().unwrap();
        assert_eq!(naive.year(), 2024);
        assert_eq!(naive.month(), 3);
    }
}
