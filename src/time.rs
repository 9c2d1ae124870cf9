//! Wall-clock (UTC) to archive time (TAI) conversion.
//!
//! JSOC record-set selectors are written in TAI. The offset between the two scales is the
//! accumulated number of leap seconds, so conversion is exact to the second for any instant
//! from 1972-01-01 onward. Earlier instants are rejected.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::{Error, Result};

/// Format used inside record-set selectors.
pub const TAI_FORMAT: &str = "%Y.%m.%d_%H:%M:%S_TAI";

/// (year, month, TAI-UTC seconds) effective from the first day of that month.
const LEAP_SECONDS: &[(i32, u32, i64)] = &[
    (1972, 1, 10),
    (1972, 7, 11),
    (1973, 1, 12),
    (1974, 1, 13),
    (1975, 1, 14),
    (1976, 1, 15),
    (1977, 1, 16),
    (1978, 1, 17),
    (1979, 1, 18),
    (1980, 1, 19),
    (1981, 7, 20),
    (1982, 7, 21),
    (1983, 7, 22),
    (1985, 7, 23),
    (1988, 1, 24),
    (1990, 1, 25),
    (1991, 1, 26),
    (1992, 7, 27),
    (1993, 7, 28),
    (1994, 7, 29),
    (1996, 1, 30),
    (1997, 7, 31),
    (1999, 1, 32),
    (2006, 1, 33),
    (2009, 1, 34),
    (2012, 7, 35),
    (2015, 7, 36),
    (2017, 1, 37),
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%dT%H:%M:%S",
    "%Y.%m.%d_%H:%M:%S",
    "%Y%m%dT%H%M%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

fn epoch_start(year: i32, month: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Parses a UTC time string in any of the common ISO-like layouts.
pub fn parse_time(input: &str) -> Result<NaiveDateTime> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }
    Err(Error::Validation(format!("unparseable time {:?}", input)))
}

fn offset_at_utc(utc: NaiveDateTime) -> Result<i64> {
    LEAP_SECONDS
        .iter()
        .rev()
        .find(|(y, m, _)| utc >= epoch_start(*y, *m))
        .map(|(_, _, off)| *off)
        .ok_or_else(|| Error::Validation(format!("time {} predates 1972-01-01 UTC", utc)))
}

/// Converts a UTC instant to TAI.
pub fn utc_to_tai(utc: NaiveDateTime) -> Result<NaiveDateTime> {
    Ok(utc + TimeDelta::seconds(offset_at_utc(utc)?))
}

/// Converts a TAI instant back to UTC.
pub fn tai_to_utc(tai: NaiveDateTime) -> Result<NaiveDateTime> {
    for (y, m, off) in LEAP_SECONDS.iter().rev() {
        let candidate = tai - TimeDelta::seconds(*off);
        if candidate >= epoch_start(*y, *m) {
            return Ok(candidate);
        }
    }
    Err(Error::Validation(format!("time {} predates 1972-01-01 UTC", tai)))
}

/// Renders a UTC instant as a TAI selector timestamp.
pub fn format_tai(utc: NaiveDateTime) -> Result<String> {
    Ok(utc_to_tai(utc)?.format(TAI_FORMAT).to_string())
}
