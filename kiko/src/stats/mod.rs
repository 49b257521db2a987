//! Return statistics over the stock universe: per-asset mean log-return and
//! latest fixing over a rolling three-month window, plus the Pearson
//! correlation matrix consumed by the multivariate sampler.

use chrono::{Months, NaiveDate};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::market::{CorrRow, StatRow};
use crate::utils::errors::{KikoError, Result};

/// Daily closing prices of one underlying, ascending by date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PriceHistory {
    pub ticker: String,
    pub closes: Vec<(NaiveDate, f64)>,
}

/// Statistics of a sub-basket, positionally aligned with its sorted tickers.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBasket {
    pub tickers: Vec<String>,
    pub means: Vec<f64>,
    pub fixings: Vec<f64>,
    pub correlation: DMatrix<f64>,
}

/// # UniverseStatistics
/// Mean log-returns, fixings and the correlation matrix over the whole
/// universe, in sorted ticker order. Recomputed at most once per trading day
/// and persisted externally; this type only performs the derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseStatistics {
    tickers: Vec<String>,
    means: Vec<f64>,
    fixings: Vec<f64>,
    correlation: DMatrix<f64>,
}

fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

fn pearson(columns: &[Vec<f64>]) -> DMatrix<f64> {
    let n = columns.len();
    let len = columns.first().map(|c| c.len()).unwrap_or(0);
    let means: Vec<f64> = columns
        .iter()
        .map(|c| c.iter().sum::<f64>() / len as f64)
        .collect();
    let mut corr = DMatrix::identity(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let mut cov = 0.0;
            let mut var_i = 0.0;
            let mut var_j = 0.0;
            for k in 0..len {
                let di = columns[i][k] - means[i];
                let dj = columns[j][k] - means[j];
                cov += di * dj;
                var_i += di * di;
                var_j += dj * dj;
            }
            let denom = (var_i * var_j).sqrt();
            let value = if denom > 0.0 { cov / denom } else { 0.0 };
            corr[(i, j)] = value;
            corr[(j, i)] = value;
        }
    }
    corr
}

impl UniverseStatistics {
    /// Derive the statistics from raw price histories. The observation window
    /// starts three months and one day before `today`; return series are
    /// truncated to the most recent length common to all tickers before the
    /// correlation is computed.
    pub fn compute(histories: &[PriceHistory], today: NaiveDate) -> Result<UniverseStatistics> {
        if histories.is_empty() {
            return Err(KikoError::MarketDataMissingErr(
                "no price histories supplied".to_string(),
            ));
        }
        let reference = today
            .checked_sub_months(Months::new(3))
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| KikoError::CalendarErr(format!("window underflow from {}", today)))?;

        let mut sorted: Vec<&PriceHistory> = histories.iter().collect();
        sorted.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        for pair in sorted.windows(2) {
            if pair[0].ticker == pair[1].ticker {
                return Err(KikoError::InvalidRequestErr(format!(
                    "duplicate price history for {}",
                    pair[0].ticker
                )));
            }
        }

        let mut tickers = Vec::with_capacity(sorted.len());
        let mut means = Vec::with_capacity(sorted.len());
        let mut fixings = Vec::with_capacity(sorted.len());
        let mut returns = Vec::with_capacity(sorted.len());
        for history in sorted {
            let window: Vec<f64> = history
                .closes
                .iter()
                .filter(|(date, _)| *date >= reference)
                .map(|(_, close)| *close)
                .collect();
            let rts = log_returns(&window);
            if rts.len() < 2 {
                return Err(KikoError::MarketDataMissingErr(format!(
                    "{} has {} closes since {}, need at least 3",
                    history.ticker,
                    window.len(),
                    reference
                )));
            }
            tickers.push(history.ticker.clone());
            means.push(rts.iter().sum::<f64>() / rts.len() as f64);
            fixings.push(*window.last().expect("non-empty window"));
            returns.push(rts);
        }

        // align series on the most recent common stretch
        let common = returns.iter().map(|r| r.len()).min().unwrap_or(0);
        let truncated: Vec<Vec<f64>> = returns
            .into_iter()
            .map(|r| r[r.len() - common..].to_vec())
            .collect();
        let correlation = pearson(&truncated);

        Ok(UniverseStatistics {
            tickers,
            means,
            fixings,
            correlation,
        })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn fixings(&self) -> &[f64] {
        &self.fixings
    }

    pub fn correlation(&self) -> &DMatrix<f64> {
        &self.correlation
    }

    /// Flatten into persisted-row form: one statistics row per ticker and
    /// one correlation row per unordered pair, stored once with `x0 < x1`.
    pub fn rows(&self, date: NaiveDate) -> (Vec<StatRow>, Vec<CorrRow>) {
        let stats = self
            .tickers
            .iter()
            .enumerate()
            .map(|(i, ticker)| StatRow {
                date,
                ticker: ticker.clone(),
                mean: self.means[i],
                fixing: self.fixings[i],
            })
            .collect();
        let mut pairs = Vec::new();
        for i in 0..self.tickers.len() {
            for j in (i + 1)..self.tickers.len() {
                pairs.push(CorrRow {
                    date,
                    x0: self.tickers[i].clone(),
                    x1: self.tickers[j].clone(),
                    corr: self.correlation[(i, j)],
                });
            }
        }
        (stats, pairs)
    }

    /// Slice the universe statistics down to a sorted subset of tickers,
    /// re-indexing the correlation matrix by position.
    pub fn sub_basket(&self, subset: &[String]) -> Result<SubBasket> {
        let mut positions = Vec::with_capacity(subset.len());
        for ticker in subset {
            let pos = self
                .tickers
                .iter()
                .position(|t| t == ticker)
                .ok_or_else(|| {
                    KikoError::MarketDataMissingErr(format!("no statistics for {}", ticker))
                })?;
            positions.push(pos);
        }
        let n = positions.len();
        let mut correlation = DMatrix::identity(n, n);
        for i in 0..n {
            for j in 0..n {
                correlation[(i, j)] = self.correlation[(positions[i], positions[j])];
            }
        }
        Ok(SubBasket {
            tickers: subset.to_vec(),
            means: positions.iter().map(|&p| self.means[p]).collect(),
            fixings: positions.iter().map(|&p| self.fixings[p]).collect(),
            correlation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Build a history from daily log-returns, most recent return last.
    fn history(ticker: &str, start: NaiveDate, returns: &[f64]) -> PriceHistory {
        let mut closes = vec![(start, 100.0)];
        let mut px = 100.0;
        for (i, r) in returns.iter().enumerate() {
            px *= r.exp();
            let day = start + chrono::Duration::days(i as i64 + 1);
            closes.push((day, px));
        }
        PriceHistory {
            ticker: ticker.to_string(),
            closes,
        }
    }

    #[test]
    fn test_perfectly_correlated_series() {
        let start = date(2023, 5, 1);
        let today = date(2023, 6, 1);
        let rts = [0.01, -0.02, 0.015, 0.005, -0.01];
        let doubled: Vec<f64> = rts.iter().map(|r| 2.0 * r).collect();
        let stats = UniverseStatistics::compute(
            &[history("AAPL", start, &rts), history("TSLA", start, &doubled)],
            today,
        )
        .unwrap();
        assert!((stats.correlation()[(0, 1)] - 1.0).abs() < 1e-12);

        let negated: Vec<f64> = rts.iter().map(|r| -*r).collect();
        let stats = UniverseStatistics::compute(
            &[history("AAPL", start, &rts), history("TSLA", start, &negated)],
            today,
        )
        .unwrap();
        assert!((stats.correlation()[(0, 1)] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_and_fixing() {
        let start = date(2023, 5, 1);
        let rts = [0.01, 0.03, -0.01, 0.02];
        let stats =
            UniverseStatistics::compute(&[history("AAPL", start, &rts)], date(2023, 6, 1))
                .unwrap();
        let expected_mean = rts.iter().sum::<f64>() / rts.len() as f64;
        assert!((stats.means()[0] - expected_mean).abs() < 1e-12);
        let expected_fixing = 100.0 * rts.iter().sum::<f64>().exp();
        assert!((stats.fixings()[0] - expected_fixing).abs() < 1e-9);
    }

    #[test]
    fn test_window_excludes_old_closes() {
        let today = date(2023, 6, 1);
        // one close well outside the three-month window, with an absurd jump
        let mut h = history("AAPL", date(2023, 5, 1), &[0.01, 0.02, -0.01]);
        h.closes.insert(0, (date(2022, 1, 1), 1.0e6));
        let stats = UniverseStatistics::compute(&[h], today).unwrap();
        let expected_mean = (0.01 + 0.02 - 0.01) / 3.0;
        assert!((stats.means()[0] - expected_mean).abs() < 1e-12);
    }

    #[test]
    fn test_series_are_truncated_to_common_length() {
        let start = date(2023, 5, 1);
        let long = [0.01, -0.02, 0.015, 0.005, -0.01, 0.02];
        let short = [0.01, -0.01, 0.02];
        // start the short series later so both end near today
        let stats = UniverseStatistics::compute(
            &[
                history("AAPL", start, &long),
                history("TSLA", start + chrono::Duration::days(3), &short),
            ],
            date(2023, 6, 1),
        )
        .unwrap();
        // correlation came from the overlapping tail, so it is finite and bounded
        let c = stats.correlation()[(0, 1)];
        assert!(c.abs() <= 1.0 + 1e-12);
    }

    #[test]
    fn test_tickers_are_sorted() {
        let start = date(2023, 5, 1);
        let rts = [0.01, -0.02, 0.015];
        let stats = UniverseStatistics::compute(
            &[history("TSLA", start, &rts), history("AAPL", start, &rts)],
            date(2023, 6, 1),
        )
        .unwrap();
        assert_eq!(stats.tickers(), &["AAPL".to_string(), "TSLA".to_string()]);
    }

    #[test]
    fn test_sub_basket_positions() {
        let start = date(2023, 5, 1);
        let r1 = [0.01, -0.02, 0.015, 0.005];
        let r2 = [0.02, 0.01, -0.01, 0.005];
        let r3 = [-0.01, 0.02, 0.01, -0.005];
        let stats = UniverseStatistics::compute(
            &[
                history("AAPL", start, &r1),
                history("MSFT", start, &r2),
                history("TSLA", start, &r3),
            ],
            date(2023, 6, 1),
        )
        .unwrap();
        let sub = stats
            .sub_basket(&["AAPL".to_string(), "TSLA".to_string()])
            .unwrap();
        assert_eq!(sub.correlation.nrows(), 2);
        assert!((sub.correlation[(0, 1)] - stats.correlation()[(0, 2)]).abs() < 1e-15);
        assert!((sub.means[1] - stats.means()[2]).abs() < 1e-15);
        assert!(stats.sub_basket(&["ZZZZ".to_string()]).is_err());
    }

    #[test]
    fn test_rows_store_each_pair_once() {
        let start = date(2023, 5, 1);
        let r1 = [0.01, -0.02, 0.015, 0.005];
        let r2 = [0.02, 0.01, -0.01, 0.005];
        let r3 = [-0.01, 0.02, 0.01, -0.005];
        let today = date(2023, 6, 1);
        let stats = UniverseStatistics::compute(
            &[
                history("AAPL", start, &r1),
                history("MSFT", start, &r2),
                history("TSLA", start, &r3),
            ],
            today,
        )
        .unwrap();
        let (stat_rows, corr_rows) = stats.rows(today);
        assert_eq!(stat_rows.len(), 3);
        assert_eq!(corr_rows.len(), 3);
        for row in &corr_rows {
            assert!(row.x0 < row.x1);
        }
        assert!((stat_rows[0].mean - stats.means()[0]).abs() < 1e-15);
    }

    #[test]
    fn test_insufficient_history_is_reported() {
        let h = PriceHistory {
            ticker: "AAPL".to_string(),
            closes: vec![(date(2023, 5, 1), 100.0), (date(2023, 5, 2), 101.0)],
        };
        let err = UniverseStatistics::compute(&[h], date(2023, 6, 1));
        assert!(matches!(err, Err(KikoError::MarketDataMissingErr(_))));
    }
}
