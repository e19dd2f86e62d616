//! Per-ticker fundamentals and the provider abstraction

use crate::core::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fundamentals of one ticker, as obtained for a single run.
///
/// `price` is in `currency`. Statement figures (debt, cash, EBITDA, revenue, EPS) are
/// in `financial_currency`, or in the major unit of `currency` when that is absent.
/// `shares` is a plain count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub ticker: String,
    pub name: Option<String>,
    pub currency: String,
    #[serde(default)]
    pub financial_currency: Option<String>,
    pub price: f64,
    pub shares: Option<f64>,
    pub debt: Option<f64>,
    pub cash: Option<f64>,
    pub ebitda: Option<f64>,
    pub revenue: Option<f64>,
    pub eps: Option<f64>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Fundamentals {
    pub fn new(ticker: &str, currency: &str, price: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: None,
            currency: currency.to_string(),
            financial_currency: None,
            price,
            shares: None,
            debt: None,
            cash: None,
            ebitda: None,
            revenue: None,
            eps: None,
            warnings: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.ticker)
    }

    /// Shares outstanding, if known and positive.
    pub fn valid_shares(&self) -> Option<f64> {
        self.shares.filter(|s| *s > 0.0)
    }

    /// Market cap plus debt minus cash. Missing debt or cash count as zero.
    pub fn enterprise_value(&self) -> Option<f64> {
        let shares = self.valid_shares()?;
        Some(self.price * shares + self.debt.unwrap_or(0.0) - self.cash.unwrap_or(0.0))
    }

    /// Revenue per share, if both revenue and shares are positive.
    pub fn sales_per_share(&self) -> Option<f64> {
        let revenue = self.revenue.filter(|r| *r > 0.0)?;
        Some(revenue / self.valid_shares()?)
    }
}

#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals, FetchError>;
}
