use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};

use crate::error::VersionParseError;

/// One execution attempt of a subprocess-isolated task, encoded `YYYYMMDD.N`.
///
/// Ordered by date, then serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionRecord {
    date: NaiveDate,
    serial: u32,
}

impl VersionRecord {
    pub fn new(date: NaiveDate, serial: u32) -> Self {
        Self { date, serial }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Version for a new run on `today`, given the latest existing version.
    ///
    /// Same day as `latest` bumps the serial; any other day starts over at 0.
    pub fn next_after(latest: Option<&VersionRecord>, today: NaiveDate) -> Self {
        match latest {
            Some(last) if last.date == today => Self::new(today, last.serial.saturating_add(1)),
            _ => Self::new(today, 0),
        }
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.date.format("%Y%m%d"), self.serial)
    }
}

impl FromStr for VersionRecord {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError(s.to_string());
        let (ymd, serial) = s.split_once('.').ok_or_else(err)?;
        if ymd.len() != 8 || !ymd.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        if serial.is_empty() || !serial.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let date = NaiveDate::parse_from_str(ymd, "%Y%m%d").map_err(|_| err())?;
        let serial = serial.parse().map_err(|_| err())?;
        Ok(Self { date, serial })
    }
}

/// Calendar date used for new versions.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}
