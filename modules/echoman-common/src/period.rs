//! Clock & period labeler (`spec.md` §4.1).
//!
//! Maps a wall-clock instant, always resolved in Asia/Shanghai, to one of
//! four periods and a composite `YYYY-MM-DD_<period>` key. This is the
//! scope every stage-one and stage-two run operates within.

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Asia::Shanghai;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "UPPERCASE")]
pub enum Period {
    Morn,
    Am,
    Pm,
    Eve,
}

impl Period {
    /// Classify an hour-of-day (0-23, Asia/Shanghai local time) into a period.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            h if h < 10 => Period::Morn,
            h if h < 14 => Period::Am,
            h if h < 20 => Period::Pm,
            _ => Period::Eve,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Period::Morn => "MORN",
            Period::Am => "AM",
            Period::Pm => "PM",
            Period::Eve => "EVE",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Period {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MORN" => Ok(Period::Morn),
            "AM" => Ok(Period::Am),
            "PM" => Ok(Period::Pm),
            "EVE" => Ok(Period::Eve),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

/// Composite `YYYY-MM-DD_<period>` key, the scope every stage run operates within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub date: NaiveDate,
    pub period: Period,
}

impl PeriodKey {
    /// Resolve an instant (any timezone) to its Asia/Shanghai period key.
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        let local = instant.with_timezone(&Shanghai);
        PeriodKey {
            date: local.date_naive(),
            period: Period::from_hour(local.hour()),
        }
    }

    /// `now()` resolved in Asia/Shanghai.
    pub fn now() -> Self {
        Self::from_instant(Utc::now())
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.date.format("%Y-%m-%d"), self.period)
    }
}

impl FromStr for PeriodKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date_part, period_part) = s
            .split_once('_')
            .ok_or_else(|| format!("malformed period key: {s}"))?;
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map_err(|e| format!("malformed date in period key {s}: {e}"))?;
        let period = Period::from_str(period_part)?;
        Ok(PeriodKey { date, period })
    }
}

/// Convenience: a specific Shanghai-local instant (for tests), at the given hour/minute.
pub fn shanghai_instant(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    Shanghai
        .from_local_datetime(&date.and_hms_opt(hour, minute, 0).expect("valid time"))
        .single()
        .expect("unambiguous local time")
        .with_timezone(&Utc)
}
