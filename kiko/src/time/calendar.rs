use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::utils::errors::{KikoError, Result};

/// NYSE full-day closures. Maintained as plain (year, month, day) triples so
/// the table reads like the exchange notices it is transcribed from.
const NYSE_CLOSURES: [(i32, u32, u32); 27] = [
    (2022, 1, 1),
    (2022, 1, 17),
    (2022, 2, 21),
    (2022, 4, 15),
    (2022, 5, 30),
    (2022, 6, 20),
    (2022, 7, 4),
    (2022, 9, 5),
    (2022, 11, 24),
    (2022, 12, 26),
    (2023, 1, 2),
    (2023, 1, 16),
    (2023, 2, 20),
    (2023, 4, 7),
    (2023, 5, 29),
    (2023, 6, 19),
    (2023, 7, 4),
    (2023, 9, 4),
    (2023, 11, 23),
    (2023, 12, 25),
    (2024, 1, 1),
    (2024, 1, 15),
    (2024, 2, 19),
    (2024, 7, 4),
    (2024, 9, 2),
    (2024, 11, 28),
    (2024, 12, 25),
];

static NYSE_HOLIDAYS: Lazy<HashSet<NaiveDate>> = Lazy::new(|| {
    NYSE_CLOSURES
        .iter()
        .map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("valid holiday date"))
        .collect()
});

/// # Calendar
/// Business-day arithmetic against an exchange holiday set. Weekends are
/// non-business days on every calendar.
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use kiko::time::calendar::Calendar;
///
/// let new_year = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// assert!(!Calendar::Nyse.is_business_day(new_year));
/// assert_eq!(
///     Calendar::Nyse.roll_following(new_year),
///     NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
/// );
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Calendar {
    Nyse,
    WeekendsOnly,
}

impl Calendar {
    pub fn from_name(name: &str) -> Result<Calendar> {
        match name.to_uppercase().as_str() {
            "NYSE" => Ok(Calendar::Nyse),
            "WEEKENDS" | "WEEKENDS_ONLY" => Ok(Calendar::WeekendsOnly),
            other => Err(KikoError::CalendarErr(format!(
                "unknown calendar: {}",
                other
            ))),
        }
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        match self {
            Calendar::Nyse => NYSE_HOLIDAYS.contains(&date),
            Calendar::WeekendsOnly => false,
        }
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday();
        if weekday == Weekday::Sat || weekday == Weekday::Sun {
            return false;
        }
        !self.is_holiday(date)
    }

    /// Advance day by day until a business day is reached. Identity on
    /// business days.
    pub fn roll_following(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        while !self.is_business_day(d) {
            d = d.succ_opt().expect("date overflow while rolling");
        }
        d
    }

    /// Every business day from `start` to `end`, both inclusive. `start` is
    /// rolled forward first, so the first entry is always a business day.
    pub fn business_days_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>> {
        if end < start {
            return Err(KikoError::CalendarErr(format!(
                "end date {} precedes start date {}",
                end, start
            )));
        }
        let mut out = Vec::new();
        let mut d = self.roll_following(start);
        while d <= end {
            out.push(d);
            d = self.roll_following(d.succ_opt().expect("date overflow while rolling"));
        }
        Ok(out)
    }
}
