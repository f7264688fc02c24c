//! Wikibase time values, reduced to calendar dates for comparison.
//!
//! Wikibase serialises times as `+YYYY-MM-DDThh:mm:ssZ` together with a
//! precision. Year- and month-precision values commonly use `00` for the
//! unknown month/day (`+2019-00-00T00:00:00Z`); those components read as `01`.
//! The time-of-day part is always discarded: every comparison in this crate is
//! a comparison of full calendar dates.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Precision code for a value known to the day.
pub const PRECISION_DAY: u8 = 11;
/// Precision code for a value known to the month.
pub const PRECISION_MONTH: u8 = 10;
/// Precision code for a value known to the year.
pub const PRECISION_YEAR: u8 = 9;

/// A point in time as stored on the knowledge base.
///
/// The original time string, timezone offset and uncertainty range are kept
/// so that a value read and written back is not rewritten. Equality compares
/// the normalised date and the precision only, so `+2019-00-00T00:00:00Z` and
/// `+2019-01-01T00:00:00Z` at year precision are the same value.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireTime", into = "WireTime")]
pub struct WikiTime {
  raw:       String,
  date:      NaiveDate,
  precision: u8,
  /// Offset from UTC in minutes.
  timezone:  i32,
  /// Uncertainty range, in units of the precision.
  before:    u32,
  after:     u32,
}

impl WikiTime {
  /// Parse a Wikibase time string.
  pub fn parse(raw: &str, precision: u8) -> Result<Self> {
    let date = parse_date(raw)
      .ok_or_else(|| Error::InvalidTime(raw.to_owned()))?;
    Ok(Self {
      raw: raw.to_owned(),
      date,
      precision,
      timezone: 0,
      before: 0,
      after: 0,
    })
  }

  /// A day-precision value for `date`.
  pub fn from_date(date: NaiveDate) -> Self {
    let raw = format!(
      "{}{:04}-{:02}-{:02}T00:00:00Z",
      if date.year() < 0 { '-' } else { '+' },
      date.year().unsigned_abs(),
      date.month(),
      date.day(),
    );
    Self {
      raw,
      date,
      precision: PRECISION_DAY,
      timezone: 0,
      before: 0,
      after: 0,
    }
  }

  /// Set the timezone offset (minutes) and the uncertainty range.
  pub fn with_uncertainty(
    mut self,
    timezone: i32,
    before: u32,
    after: u32,
  ) -> Self {
    self.timezone = timezone;
    self.before = before;
    self.after = after;
    self
  }

  /// The time string exactly as read (or generated).
  pub fn as_str(&self) -> &str { &self.raw }

  pub fn date(&self) -> NaiveDate { self.date }

  pub fn precision(&self) -> u8 { self.precision }

  pub fn timezone(&self) -> i32 { self.timezone }

  pub fn before(&self) -> u32 { self.before }

  pub fn after(&self) -> u32 { self.after }
}

impl PartialEq for WikiTime {
  fn eq(&self, other: &Self) -> bool {
    self.date == other.date && self.precision == other.precision
  }
}

impl fmt::Display for WikiTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

/// Extract the calendar date from `[+-]YYYY-MM-DDThh:mm:ssZ`, reading a `00`
/// month or day as `01`.
fn parse_date(raw: &str) -> Option<NaiveDate> {
  let (negative, rest) = match raw.as_bytes().first()? {
    b'+' => (false, &raw[1..]),
    b'-' => (true, &raw[1..]),
    _ => (false, raw),
  };
  let date_part = rest.split('T').next()?;
  let mut parts = date_part.splitn(3, '-');
  let year: i32 = parts.next()?.parse().ok()?;
  let month: u32 = parts.next()?.parse().ok()?;
  let day: u32 = parts.next()?.parse().ok()?;

  let year = if negative { -year } else { year };
  NaiveDate::from_ymd_opt(year, month.max(1), day.max(1))
}

// ─── Serde shape ─────────────────────────────────────────────────────────────

/// The time fields as they appear in Wikibase JSON, minus the calendar model.
#[derive(Serialize, Deserialize)]
struct WireTime {
  time:      String,
  precision: u8,
  #[serde(default)]
  timezone:  i32,
  #[serde(default)]
  before:    u32,
  #[serde(default)]
  after:     u32,
}

impl TryFrom<WireTime> for WikiTime {
  type Error = Error;

  fn try_from(w: WireTime) -> Result<Self> {
    Ok(Self::parse(&w.time, w.precision)?.with_uncertainty(
      w.timezone, w.before, w.after,
    ))
  }
}

impl From<WikiTime> for WireTime {
  fn from(t: WikiTime) -> Self {
    Self {
      time:      t.raw,
      precision: t.precision,
      timezone:  t.timezone,
      before:    t.before,
      after:     t.after,
    }
  }
}
