//! Pure mappings from raw spreadsheet values into canonical forms.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
};
use chrono_tz::Tz;

use crate::error::{ConversionError, Result};
use crate::types::Sex;

const MALE_SYNONYMS: &[&str] = &[
    "male",
    "m",
    "männlich",
    "maennlich",
    "mannlich",
    "männchen",
    "mannchen",
];
const FEMALE_SYNONYMS: &[&str] = &["female", "f", "weiblich", "weibchen"];

/// Two-digit years in the `Date` column are offsets from this year.
const CENTURY_BASE: i32 = 2000;

/// Maps free-text sex into [`Sex`].
///
/// Matching is case-insensitive (German and English synonyms). Surrounding
/// whitespace is not trimmed, so `" m"` maps to [`Sex::Other`].
pub fn normalize_sex(raw: &str) -> Sex {
    let sex = raw.to_lowercase();
    if MALE_SYNONYMS.contains(&sex.as_str()) {
        Sex::Male
    } else if FEMALE_SYNONYMS.contains(&sex.as_str()) {
        Sex::Female
    } else {
        Sex::Other
    }
}

/// Combines a `YYMMDD` date and an `HH:MM` start time into one naive timestamp.
///
/// The year is always `2000 + YY`.
pub fn combine_session_start(date: &str, time: &str) -> Result<NaiveDateTime> {
    let combined = format!("{} {}", date, time);

    if date.len() != 6 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConversionError::parse(combined, "date must be six digits (YYMMDD)"));
    }
    // All six bytes are ASCII digits past this point
    let field = |range: std::ops::Range<usize>, name: &str| -> Result<u32> {
        date[range]
            .parse()
            .map_err(|_| ConversionError::parse(&combined, format!("bad {}", name)))
    };
    let year = field(0..2, "year")? as i32;
    let month = field(2..4, "month")?;
    let day = field(4..6, "day")?;

    let day = NaiveDate::from_ymd_opt(CENTURY_BASE + year, month, day)
        .ok_or_else(|| ConversionError::parse(&combined, "no such calendar date"))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|e| ConversionError::parse(&combined, format!("start time: {}", e)))?;

    Ok(day.and_time(time))
}

/// Attaches a timezone to a naive local timestamp.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
/// Local times skipped by a DST transition are read with the offset in force
/// before the gap, so 02:30 on a spring-forward night in Zurich is 01:30 UTC
/// and is shown as 03:30 summer time.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => {
            let before = tz
                .offset_from_local_datetime(&(naive - Duration::days(1)))
                .earliest()
                .ok_or_else(|| {
                    ConversionError::parse(
                        naive.to_string(),
                        format!("no offset before DST gap in {}", tz.name()),
                    )
                })?;
            let utc = naive - Duration::seconds(i64::from(before.fix().local_minus_utc()));
            Ok(tz.from_utc_datetime(&utc))
        }
    }
}
