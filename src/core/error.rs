//! Error taxonomy of the valuation engine.
//!
//! All of these are recoverable per entry: a failed fetch fails one ticker, a bad
//! basket row fails one basket. None of them abort a run.

use thiserror::Error;

/// Failure to obtain fundamentals for a ticker.
///
/// `Clone` so that the cache can hand the same failure to every caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("data source unreachable for {ticker}: {reason}")]
    Unreachable { ticker: String, reason: String },

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("no price data available for {0}")]
    MissingPrice(String),
}

impl FetchError {
    pub fn ticker(&self) -> &str {
        match self {
            FetchError::Unreachable { ticker, .. } => ticker,
            FetchError::UnknownTicker(ticker) | FetchError::MissingPrice(ticker) => ticker,
        }
    }
}

/// Failure to look up a currency conversion rate.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("exchange rate {from}->{to} unavailable: {reason}")]
pub struct RateError {
    pub from: String,
    pub to: String,
    pub reason: String,
}

/// Malformed configuration for a single portfolio or basket entry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{entry}: member {ticker} has invalid share {value} (must be finite and non-negative)")]
    InvalidShare {
        entry: String,
        ticker: String,
        value: f64,
    },

    #[error("{entry}: member {ticker} is missing a share")]
    MissingShare { entry: String, ticker: String },

    #[error(
        "{entry}: {ticker} has invalid {method} weight {value} (must be finite and non-negative)"
    )]
    InvalidWeight {
        entry: String,
        ticker: String,
        method: &'static str,
        value: f64,
    },

    #[error("{entry}: failed to load members: {reason}")]
    Load { entry: String, reason: String },
}
