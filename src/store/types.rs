//! Core date types for the snapshot lake
//!
//! - `SnapshotDate`: the `(year, month, day)` key of a daily snapshot
//! - `DateRange`: an inclusive span of days, iterated one day at a time

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar date identifying one daily snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotDate(NaiveDate);

impl SnapshotDate {
    /// Create from year/month/day, returning None for an invalid calendar date
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// Zero-padded `YYYY`, `MM`, `DD` path segments
    pub fn segments(&self) -> (String, String, String) {
        (
            format!("{:04}", self.year()),
            format!("{:02}", self.month()),
            format!("{:02}", self.day()),
        )
    }

    /// `YYYY/MM/DD`, used in log lines
    pub fn label(&self) -> String {
        let (y, m, d) = self.segments();
        format!("{}/{}/{}", y, m, d)
    }

    /// `YYYY-MM-DD`, used for SQL literals and remote locators
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Next calendar day
    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }
}

impl From<NaiveDate> for SnapshotDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl std::fmt::Display for SnapshotDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.iso())
    }
}

impl std::str::FromStr for SnapshotDate {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self)
    }
}

/// Inclusive range of snapshot dates: [start, end]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: SnapshotDate,
    pub end: SnapshotDate,
}

impl DateRange {
    /// Create a range; an end before the start yields an empty range
    pub fn new(start: SnapshotDate, end: SnapshotDate) -> Self {
        Self { start, end }
    }

    /// All days of a calendar year
    pub fn year(year: i32) -> Option<Self> {
        Some(Self {
            start: SnapshotDate::from_ymd(year, 1, 1)?,
            end: SnapshotDate::from_ymd(year, 12, 31)?,
        })
    }

    /// A single day
    pub fn day(date: SnapshotDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Number of days covered
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end.as_naive() - self.start.as_naive()).num_days() as usize + 1
        }
    }

    pub fn contains(&self, date: SnapshotDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> DateRangeIter {
        DateRangeIter {
            next: if self.is_empty() {
                None
            } else {
                Some(self.start)
            },
            end: self.end,
        }
    }
}

impl IntoIterator for DateRange {
    type Item = SnapshotDate;
    type IntoIter = DateRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.days()
    }
}

/// Day-by-day iterator over a `DateRange`
#[derive(Debug, Clone)]
pub struct DateRangeIter {
    next: Option<SnapshotDate>,
    end: SnapshotDate,
}

impl Iterator for DateRangeIter {
    type Item = SnapshotDate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = if current < self.end {
            current.succ()
        } else {
            None
        };
        Some(current)
    }
}
