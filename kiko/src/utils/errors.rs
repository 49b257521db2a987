use thiserror::Error;

/// Failure taxonomy surfaced by the pricing core. Numerical failures inside a
/// Monte Carlo worker are captured at the trial boundary and never bubble up
/// mid-trial; everything else is reported before workers start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KikoError {
    #[error("Invalid request: {0}")]
    InvalidRequestErr(String),
    #[error("Market data missing: {0}")]
    MarketDataMissingErr(String),
    #[error("Invalid correlation: {0}")]
    InvalidCorrelationErr(String),
    #[error("Numerical failure: {0}")]
    NumericalErr(String),
    #[error("Calendar failure: {0}")]
    CalendarErr(String),
    #[error("Cancelled: {0}")]
    CancelledErr(String),
}

pub type Result<T> = std::result::Result<T, KikoError>;

impl From<KikoError> for String {
    fn from(e: KikoError) -> Self {
        e.to_string()
    }
}
