use std::{fmt::Display, str::FromStr};

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("Invalid year-month '{0}'. Expected YYYY-MM")]
pub struct YearMonthParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn current() -> Self {
        Self::of(Local::now().date_naive())
    }

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

    pub fn day(self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    /// The month of `at` followed by `months_back` preceding months, most recent first.
    pub fn window_ending(at: YearMonth, months_back: u32) -> Vec<YearMonth> {
        let mut window = Vec::with_capacity(months_back as usize + 1);
        let mut ym = at;
        window.push(ym);
        for _ in 0..months_back {
            ym = ym.previous();
            window.push(ym);
        }
        window
    }

    pub fn recent(months_back: u32) -> Vec<YearMonth> {
        Self::window_ending(Self::current(), months_back)
    }
}

impl FromStr for YearMonth {
    type Err = YearMonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| YearMonthParseError(s.to_string()))?;
        let year: i32 = year.parse().map_err(|_| YearMonthParseError(s.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| YearMonthParseError(s.to_string()))?;
        Self::new(year, month).ok_or_else(|| YearMonthParseError(s.to_string()))
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
