//! Deterministic aggregation over the record store.
//!
//! Answers "which product had the biggest sales increase between two months"
//! exactly, without retrieval or generation. Records whose date can't be
//! parsed are left out of every period.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::types::RecordStore;

pub const NO_DATA_MESSAGE: &str = "No sales data available for these periods.";

static YEAR_MONTH_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(\d{4})-(\d{1,2})\b").expect("year-month regex is valid")
});
static MONTH_NAME_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(concat!(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?",
        r"|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?,?\s+(\d{4})\b",
    ))
    .expect("month name regex is valid")
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The calendar month before this one.
    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Month of a record's date string, or `None` if the date is unparseable.
    pub fn from_date(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Self::new(dt.year(), dt.month());
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Self::new(dt.year(), dt.month());
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
                return Self::new(d.year(), d.month());
            }
        }
        raw.parse().ok()
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = year.parse().map_err(|_| format!("invalid year in '{}'", s))?;
        let month: u32 = month.parse().map_err(|_| format!("invalid month in '{}'", s))?;
        Self::new(year, month).ok_or_else(|| format!("month out of range in '{}'", s))
    }
}

/// Product → summed sales for one period.
pub fn sales_by_product(store: &RecordStore, period: PeriodKey) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for record in store.iter() {
        if PeriodKey::from_date(&record.date) == Some(period) {
            *totals.entry(record.product.clone()).or_insert(0.0) += record.sales;
        }
    }
    totals
}

/// `after − before` for products present in both maps.
pub fn sales_delta(
    before: &BTreeMap<String, f64>,
    after: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    after
        .iter()
        .filter_map(|(product, b)| before.get(product).map(|a| (product.clone(), b - a)))
        .collect()
}

/// Product with the largest sales increase from `period_a` to `period_b`.
///
/// Ties on the maximum go to the lexicographically smallest product name.
pub fn biggest_increase(store: &RecordStore, period_a: PeriodKey, period_b: PeriodKey) -> String {
    let delta = sales_delta(
        &sales_by_product(store, period_a),
        &sales_by_product(store, period_b),
    );

    // BTreeMap iterates in name order, so keeping only strictly greater values
    // leaves the smallest name among equal maxima.
    let best = delta.iter().fold(None::<(&String, f64)>, |best, (product, &value)| {
        match best {
            Some((_, top)) if value <= top => best,
            _ => Some((product, value)),
        }
    });

    match best {
        Some((product, value)) => {
            tracing::debug!(%period_a, %period_b, products = delta.len(), "computed sales delta");
            format!("{} had the biggest sales increase: {:.2}", product, value)
        }
        None => NO_DATA_MESSAGE.to_string(),
    }
}

/// Month keys mentioned in a query, in the order they appear.
/// Accepts `2010-11` and `November 2010` / `Nov 2010`.
pub fn periods_in_query(query: &str) -> Vec<PeriodKey> {
    let mut found: Vec<(usize, PeriodKey)> = Vec::new();

    for caps in YEAR_MONTH_RE.captures_iter(query) {
        let (Some(whole), Some(year), Some(month)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if let (Ok(year), Ok(month)) = (year.as_str().parse(), month.as_str().parse()) {
            if let Some(key) = PeriodKey::new(year, month) {
                found.push((whole.start(), key));
            }
        }
    }

    for caps in MONTH_NAME_RE.captures_iter(query) {
        let (Some(whole), Some(name), Some(year)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let month = month_number(name.as_str());
        if let (Some(month), Ok(year)) = (month, year.as_str().parse()) {
            if let Some(key) = PeriodKey::new(year, month) {
                found.push((whole.start(), key));
            }
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, key)| key).collect()
}

/// The two most recent distinct months present in the store, oldest first.
pub fn latest_periods(store: &RecordStore) -> Option<(PeriodKey, PeriodKey)> {
    let periods: BTreeSet<PeriodKey> = store
        .iter()
        .filter_map(|r| PeriodKey::from_date(&r.date))
        .collect();
    let mut recent = periods.iter().rev();
    let latest = *recent.next()?;
    let previous = *recent.next()?;
    Some((previous, latest))
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_ascii_lowercase().get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
