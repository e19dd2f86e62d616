//! Core valuation logic and its abstractions

pub mod analytics;
pub mod basket;
pub mod cache;
pub mod config;
pub mod currency;
pub mod error;
pub mod fair_price;
pub mod fetch;
pub mod fundamentals;
pub mod log;
pub mod method;
pub mod multiples;
pub mod valuation;
pub mod weights;

// Re-export main types for cleaner imports
pub use currency::{CurrencyNormalizer, CurrencyRateProvider};
pub use error::{ConfigError, FetchError, RateError};
pub use fundamentals::{Fundamentals, FundamentalsProvider};
pub use method::{Method, MethodWeights, OutlierBounds, PerMethod};
pub use valuation::{FairPrice, ValuationResult};
