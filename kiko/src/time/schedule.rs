use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::time::calendar::Calendar;
use crate::time::daycounter::Actual365;
use crate::utils::errors::{KikoError, Result};

/// # Schedule
/// Observation and autocall dates of a note, derived from a strike date, a
/// tenor and a call frequency (both in whole months).
///
/// `ko_dates[i]` is the strike date shifted forward `(i + 1) * freq` calendar
/// months (day-of-month clamped to the end of shorter months) and rolled to
/// the next business day. `obs_dates` is every business day from the rolled
/// strike date up to and including the last autocall date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    obs_dates: Vec<NaiveDate>,
    ko_dates: Vec<NaiveDate>,
}

impl Schedule {
    pub fn generate(
        calendar: Calendar,
        strike_date: NaiveDate,
        tenor_months: u32,
        freq_months: u32,
    ) -> Result<Schedule> {
        if freq_months == 0 {
            return Err(KikoError::CalendarErr(
                "call frequency must be positive".to_string(),
            ));
        }
        if tenor_months < freq_months {
            return Err(KikoError::CalendarErr(format!(
                "tenor {}m shorter than call frequency {}m",
                tenor_months, freq_months
            )));
        }
        if tenor_months % freq_months != 0 {
            return Err(KikoError::CalendarErr(format!(
                "tenor {}m not divisible by call frequency {}m",
                tenor_months, freq_months
            )));
        }
        let n = (tenor_months / freq_months) as usize;
        let mut ko_dates = Vec::with_capacity(n);
        for i in 0..n {
            let shifted = strike_date
                .checked_add_months(Months::new((i as u32 + 1) * freq_months))
                .ok_or_else(|| {
                    KikoError::CalendarErr(format!("date overflow from {}", strike_date))
                })?;
            ko_dates.push(calendar.roll_following(shifted));
        }
        let obs_dates = calendar.business_days_between(strike_date, ko_dates[n - 1])?;
        Ok(Schedule {
            obs_dates,
            ko_dates,
        })
    }

    pub fn obs_dates(&self) -> &[NaiveDate] {
        &self.obs_dates
    }

    pub fn ko_dates(&self) -> &[NaiveDate] {
        &self.ko_dates
    }

    /// Actual/365 year fractions between consecutive observation dates, the
    /// simulation time grid.
    pub fn step_fractions(&self) -> Vec<f64> {
        self.obs_dates
            .windows(2)
            .map(|w| Actual365::year_fraction(w[0], w[1]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_quarterly_schedule_2023() {
        let schedule = Schedule::generate(Calendar::Nyse, date(2023, 1, 3), 12, 3).unwrap();
        assert_eq!(
            schedule.ko_dates(),
            &[
                date(2023, 4, 3),
                date(2023, 7, 3),
                date(2023, 10, 3),
                date(2024, 1, 3),
            ]
        );
        assert_eq!(schedule.obs_dates().first(), Some(&date(2023, 1, 3)));
        assert_eq!(schedule.obs_dates().last(), Some(&date(2024, 1, 3)));
    }

    #[test]
    fn test_ko_dates_are_rolled_business_days() {
        for (tenor, freq) in [(12u32, 3u32), (24, 6), (6, 1), (12, 12)] {
            let schedule =
                Schedule::generate(Calendar::Nyse, date(2023, 1, 17), tenor, freq).unwrap();
            assert_eq!(schedule.ko_dates().len(), (tenor / freq) as usize);
            for w in schedule.ko_dates().windows(2) {
                assert!(w[0] < w[1]);
            }
            for d in schedule.ko_dates() {
                assert!(Calendar::Nyse.is_business_day(*d));
                assert!(schedule.obs_dates().contains(d));
            }
        }
    }

    #[test]
    fn test_holiday_strike_date_rolls_first_observation() {
        // 2023-01-01 is a Sunday and 2023-01-02 the observed holiday
        let schedule = Schedule::generate(Calendar::Nyse, date(2023, 1, 1), 3, 3).unwrap();
        assert_eq!(schedule.obs_dates().first(), Some(&date(2023, 1, 3)));
    }

    #[test]
    fn test_rejects_inconsistent_tenor() {
        assert!(Schedule::generate(Calendar::Nyse, date(2023, 1, 3), 2, 3).is_err());
        assert!(Schedule::generate(Calendar::Nyse, date(2023, 1, 3), 7, 3).is_err());
        assert!(Schedule::generate(Calendar::Nyse, date(2023, 1, 3), 12, 0).is_err());
    }

    #[test]
    fn test_step_fractions_are_positive_and_span_the_tenor() {
        let schedule = Schedule::generate(Calendar::Nyse, date(2023, 1, 3), 12, 3).unwrap();
        let dt = schedule.step_fractions();
        assert_eq!(dt.len(), schedule.obs_dates().len() - 1);
        assert!(dt.iter().all(|&x| x > 0.0));
        let total: f64 = dt.iter().sum();
        let span = Actual365::year_fraction(
            schedule.obs_dates()[0],
            *schedule.obs_dates().last().unwrap(),
        );
        assert!((total - span).abs() < 1e-12);
    }
}
