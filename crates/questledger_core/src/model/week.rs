//! ISO week key used by the weekly XP window and arcade ladders.
//!
//! # Invariants
//! - Textual form is always `YYYY-Www` with a zero-padded week number.
//! - Week numbers follow ISO-8601 (weeks start on Monday, week 1 holds the
//!   first Thursday of the year).

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static WEEK_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-W(\d{2})$").expect("valid week key regex"));

/// ISO year-week identifier, e.g. `2024-W33`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekKey(String);

impl WeekKey {
    /// Derives the week key for one instant.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let week = at.iso_week();
        Self(format!("{:04}-W{:02}", week.year(), week.week()))
    }

    /// Parses a stored week key, rejecting anything but `YYYY-Www`.
    pub fn parse(value: &str) -> Option<Self> {
        let caps = WEEK_KEY_RE.captures(value.trim())?;
        let week: u32 = caps.get(2)?.as_str().parse().ok()?;
        if !(1..=53).contains(&week) {
            return None;
        }
        Some(Self(value.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for WeekKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WeekKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid week key `{value}`"))
    }
}

impl From<WeekKey> for String {
    fn from(value: WeekKey) -> Self {
        value.0
    }
}
