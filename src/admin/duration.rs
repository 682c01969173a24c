/// Mute duration parsing
///
/// Admins type durations such as `30м`, `2ч` or `7d`: an amount followed by
/// a unit. Russian single-letter units and English letters/words are both
/// understood.
use crate::error::{WardenError, WardenResult};
use chrono::{DateTime, TimeDelta, Utc};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Longest mute accepted
pub const MAX_MUTE_SECONDS: i64 = 100 * YEAR;

/// Duration unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DurationUnit {
    pub fn seconds(&self) -> i64 {
        match self {
            DurationUnit::Second => 1,
            DurationUnit::Minute => MINUTE,
            DurationUnit::Hour => HOUR,
            DurationUnit::Day => DAY,
            DurationUnit::Week => WEEK,
            DurationUnit::Month => MONTH,
            DurationUnit::Year => YEAR,
        }
    }

    pub fn from_str(unit: &str) -> Option<Self> {
        let unit = match unit {
            "с" | "s" | "sec" | "second" | "seconds" => DurationUnit::Second,
            "м" | "m" | "min" | "minute" | "minutes" => DurationUnit::Minute,
            "ч" | "h" | "hour" | "hours" => DurationUnit::Hour,
            "д" | "d" | "day" | "days" => DurationUnit::Day,
            "н" | "w" | "week" | "weeks" => DurationUnit::Week,
            "мес" | "mo" | "month" | "months" => DurationUnit::Month,
            "г" | "y" | "year" | "years" => DurationUnit::Year,
            _ => return None,
        };
        Some(unit)
    }
}

/// Parsed mute duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteDuration {
    pub amount: i64,
    pub unit: DurationUnit,
}

impl MuteDuration {
    pub fn as_seconds(&self) -> i64 {
        self.amount * self.unit.seconds()
    }

    pub fn as_chrono(&self) -> Option<TimeDelta> {
        TimeDelta::try_seconds(self.as_seconds())
    }

    /// End of a mute starting at `start`
    pub fn until_from(&self, start: DateTime<Utc>) -> WardenResult<DateTime<Utc>> {
        self.as_chrono()
            .and_then(|delta| start.checked_add_signed(delta))
            .ok_or_else(|| {
                WardenError::InvalidDuration(format!(
                    "Duration of {} seconds is out of range",
                    self.as_seconds()
                ))
            })
    }
}

/// Parse a duration string.
///
/// A bare minute amount above 60 is read as months: `90м` means ninety
/// months, matching how admins historically typed month counts.
pub fn parse_duration(raw: &str) -> WardenResult<MuteDuration> {
    let invalid = || WardenError::InvalidDuration(format!("Cannot parse duration {:?}", raw));

    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let unit = unit.trim().to_lowercase();

    if digits.is_empty() || unit.is_empty() {
        return Err(invalid());
    }

    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }

    let mut unit = DurationUnit::from_str(&unit).ok_or_else(invalid)?;
    if unit == DurationUnit::Minute && amount > 60 {
        unit = DurationUnit::Month;
    }

    let seconds = amount.checked_mul(unit.seconds()).ok_or_else(invalid)?;
    if seconds > MAX_MUTE_SECONDS {
        return Err(WardenError::InvalidDuration(format!(
            "Duration {:?} exceeds the maximum of 100 years",
            raw
        )));
    }

    let parsed = MuteDuration { amount, unit };
    parsed.until_from(Utc::now())?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_and_hours() {
        assert_eq!(parse_duration("30м").unwrap().as_seconds(), 1800);
        assert_eq!(parse_duration("2ч").unwrap().as_seconds(), 7200);
        assert_eq!(parse_duration("60м").unwrap().as_seconds(), 3600);
        assert_eq!(parse_duration("45s").unwrap().as_seconds(), 45);
    }

    #[test]
    fn test_large_minute_amount_means_months() {
        let parsed = parse_duration("90м").unwrap();
        assert_eq!(parsed.unit, DurationUnit::Month);
        assert_eq!(parsed.as_seconds(), 90 * 30 * 86400);
    }

    #[test]
    fn test_other_units() {
        assert_eq!(parse_duration("1д").unwrap().as_seconds(), 86400);
        assert_eq!(parse_duration("1н").unwrap().as_seconds(), 604800);
        assert_eq!(parse_duration("2мес").unwrap().as_seconds(), 2 * 2592000);
        assert_eq!(parse_duration("1г").unwrap().as_seconds(), 31536000);
        assert_eq!(parse_duration("3 days").unwrap().as_seconds(), 3 * 86400);
        assert_eq!(parse_duration("1W").unwrap().as_seconds(), 604800);
    }

    #[test]
    fn test_huge_durations_are_rejected() {
        for raw in ["999999г", "101y", "5000000н", "9999999999мес"] {
            assert!(
                matches!(parse_duration(raw), Err(WardenError::InvalidDuration(_))),
                "{:?} should be rejected",
                raw
            );
        }
        assert_eq!(parse_duration("100y").unwrap().as_seconds(), MAX_MUTE_SECONDS);
    }

    #[test]
    fn test_until_from_checks_range() {
        let parsed = parse_duration("1y").unwrap();
        let start = DateTime::<Utc>::MAX_UTC - TimeDelta::days(1);
        assert!(matches!(
            parsed.until_from(start),
            Err(WardenError::InvalidDuration(_))
        ));

        let start = Utc::now();
        assert_eq!((parsed.until_from(start).unwrap() - start).num_seconds(), YEAR);
    }

    #[test]
    fn test_invalid_durations() {
        for raw in ["abc", "", "30", "м", "10x", "0м", "1ч30м", "99999999999999999999д"] {
            assert!(
                matches!(parse_duration(raw), Err(WardenError::InvalidDuration(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }
}
