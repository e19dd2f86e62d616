//! Currency conversion abstractions and normalization to the reporting currency

use crate::core::cache::Cache;
use crate::core::error::RateError;
use crate::core::fundamentals::Fundamentals;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64>;
}

/// Quotes in a minor unit (e.g. pence) map to their major currency and a factor.
fn minor_unit(currency: &str) -> Option<(&'static str, f64)> {
    match currency {
        "GBp" | "GBX" => Some(("GBP", 0.01)),
        "ZAc" | "ZAC" => Some(("ZAR", 0.01)),
        "ILA" => Some(("ILS", 0.01)),
        _ => None,
    }
}

/// Result of converting one amount.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub amount: f64,
    /// Set when the rate was unavailable and the amount was passed through 1:1.
    pub warning: Option<RateError>,
}

/// Converts monetary amounts into a single reporting currency.
///
/// Rates are memoized per currency pair for the lifetime of the normalizer. A failed
/// lookup is memoized too, so the degraded 1:1 fallback is applied consistently.
pub struct CurrencyNormalizer {
    provider: Arc<dyn CurrencyRateProvider>,
    target: String,
    rates: Cache<String, Result<f64, RateError>>,
}

impl CurrencyNormalizer {
    pub fn new(provider: Arc<dyn CurrencyRateProvider>, target: &str) -> Self {
        Self {
            provider,
            target: target.to_string(),
            rates: Cache::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Rate that turns one unit of `source` into the reporting currency.
    pub async fn rate(&self, source: &str) -> Result<f64, RateError> {
        let (major, factor) = minor_unit(source).unwrap_or((source, 1.0));
        if major == self.target {
            return Ok(factor);
        }

        let key = format!("{major}:{}", self.target);
        let rate = self
            .rates
            .get_or_insert_with(key, || async {
                debug!("Looking up rate {major} -> {}", self.target);
                match self.provider.get_rate(major, &self.target).await {
                    Ok(rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
                    Ok(rate) => Err(RateError {
                        from: major.to_string(),
                        to: self.target.clone(),
                        reason: format!("invalid rate {rate}"),
                    }),
                    Err(e) => Err(RateError {
                        from: major.to_string(),
                        to: self.target.clone(),
                        reason: e.to_string(),
                    }),
                }
            })
            .await?;
        Ok(rate * factor)
    }

    /// Converts `amount` from `source` into the reporting currency. On lookup failure
    /// the amount is returned unchanged with the failure attached as a warning.
    pub async fn to_reporting_currency(&self, amount: f64, source: &str) -> Conversion {
        match self.rate(source).await {
            Ok(rate) => Conversion {
                amount: amount * rate,
                warning: None,
            },
            Err(e) => {
                warn!(error = %e, "Currency conversion unavailable, using 1:1");
                Conversion {
                    amount,
                    warning: Some(e),
                }
            }
        }
    }

    /// Converts every monetary field of `fundamentals`. Share counts are left as is.
    ///
    /// Only the price can be quoted in a minor unit; statement figures are converted
    /// from their own currency. A failed lookup leaves the affected fields in the
    /// major source currency and records a warning.
    pub async fn normalize(&self, mut fundamentals: Fundamentals) -> Fundamentals {
        let quote_currency = fundamentals.currency.clone();
        let (quote_major, factor) =
            minor_unit(&quote_currency).unwrap_or((quote_currency.as_str(), 1.0));
        let quote_major = quote_major.to_string();
        let statement_currency = fundamentals
            .financial_currency
            .take()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| quote_major.clone());

        let price_rate = self.rate(&quote_currency).await;
        let statement_rate = self.rate(&statement_currency).await;

        let price_currency = match &price_rate {
            Ok(rate) => {
                fundamentals.price *= rate;
                self.target.clone()
            }
            Err(_) => {
                fundamentals.price *= factor;
                quote_major
            }
        };

        let statement_currency = match &statement_rate {
            Ok(rate) => {
                let convert = |v: Option<f64>| v.map(|v| v * rate);
                fundamentals.debt = convert(fundamentals.debt);
                fundamentals.cash = convert(fundamentals.cash);
                fundamentals.ebitda = convert(fundamentals.ebitda);
                fundamentals.revenue = convert(fundamentals.revenue);
                fundamentals.eps = convert(fundamentals.eps);
                self.target.clone()
            }
            Err(_) => statement_currency,
        };

        debug!(
            "Converted {} from {}/{} to {}",
            fundamentals.ticker, quote_currency, statement_currency, self.target
        );

        let mut warnings = Vec::new();
        match (price_rate, statement_rate) {
            (Err(e), Err(other)) if e == other => {
                warnings.push(format!("{e}; values left in {price_currency}"));
            }
            (price_rate, statement_rate) => {
                if let Err(e) = price_rate {
                    warnings.push(format!("{e}; price left in {price_currency}"));
                }
                if let Err(e) = statement_rate {
                    warnings.push(format!("{e}; financials left in {statement_currency}"));
                }
            }
        }
        for warning in &warnings {
            warn!(ticker = %fundamentals.ticker, "{warning}");
        }
        fundamentals.warnings.extend(warnings);

        fundamentals.financial_currency =
            (statement_currency != price_currency).then_some(statement_currency);
        fundamentals.currency = price_currency;
        fundamentals
    }
}
