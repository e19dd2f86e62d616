//! Security-level valuation: weighted fair price and premium/discount.

use crate::core::fair_price::{CandidatePrices, candidate_prices};
use crate::core::fundamentals::Fundamentals;
use crate::core::method::{MethodWeights, PerMethod};
use crate::core::multiples::PeerMultiples;
use crate::core::weights::{available_methods, redistribute};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FairPrice {
    Value(f64),
    /// No method produced a usable candidate price.
    Unvaluable,
}

impl FairPrice {
    pub fn value(&self) -> Option<f64> {
        match self {
            FairPrice::Value(v) => Some(*v),
            FairPrice::Unvaluable => None,
        }
    }
}

/// Weighted sum of the defined candidate prices.
pub fn aggregate(candidates: &CandidatePrices, weights: &MethodWeights) -> FairPrice {
    let mut total_weight = 0.0;
    let mut fair = 0.0;
    for (method, price) in candidates.iter() {
        if let Some(price) = price {
            let weight = *weights.get(method);
            total_weight += weight;
            fair += weight * price;
        }
    }

    if total_weight > 0.0 {
        FairPrice::Value(fair)
    } else {
        FairPrice::Unvaluable
    }
}

/// `(fair / current - 1) * 100`, undefined unless `current` is positive.
pub fn premium_discount(fair: f64, current: f64) -> Option<f64> {
    if current > 0.0 && current.is_finite() {
        Some((fair / current - 1.0) * 100.0)
    } else {
        None
    }
}

/// Valuation of one security against its peer group.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationResult {
    pub ticker: String,
    pub name: Option<String>,
    pub currency: String,
    pub current_price: f64,
    pub fair_price: FairPrice,
    pub premium_discount: Option<f64>,
    pub candidates: CandidatePrices,
    pub effective_weights: MethodWeights,
    pub peers: PeerMultiples,
    pub warnings: Vec<String>,
    /// Why the security could not be valued, when it could not.
    pub note: Option<String>,
}

impl ValuationResult {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.ticker)
    }
}

/// Values `target` from its peers' averaged multiples and the configured weights.
pub fn value_security(
    target: &Fundamentals,
    peers: PeerMultiples,
    configured_weights: &MethodWeights,
) -> ValuationResult {
    let candidates = candidate_prices(target, &peers.averages);
    let effective_weights = redistribute(configured_weights, &available_methods(&candidates));
    let fair_price = aggregate(&candidates, &effective_weights);
    let premium_discount = fair_price
        .value()
        .and_then(|fair| premium_discount(fair, target.price));

    debug!(
        ticker = %target.ticker,
        ?candidates,
        ?effective_weights,
        ?fair_price,
        "Valued security"
    );

    let note = match fair_price {
        FairPrice::Value(_) => None,
        FairPrice::Unvaluable if peers.peers_used() == 0 => {
            Some("no usable peer data".to_string())
        }
        FairPrice::Unvaluable => Some("not enough data to perform valuation".to_string()),
    };

    let mut warnings = target.warnings.clone();
    if !peers.failed.is_empty() {
        let failed: Vec<&str> = peers.failed.iter().map(|e| e.ticker()).collect();
        warnings.push(format!("peers without data: {}", failed.join(", ")));
    }

    ValuationResult {
        ticker: target.ticker.clone(),
        name: target.name.clone(),
        currency: target.currency.clone(),
        current_price: target.price,
        fair_price,
        premium_discount,
        candidates,
        effective_weights,
        peers,
        warnings,
        note,
    }
}

/// A target without any configured peer group.
pub fn unvaluable_without_peers(target: &Fundamentals) -> ValuationResult {
    ValuationResult {
        ticker: target.ticker.clone(),
        name: target.name.clone(),
        currency: target.currency.clone(),
        current_price: target.price,
        fair_price: FairPrice::Unvaluable,
        premium_discount: None,
        candidates: PerMethod::default(),
        effective_weights: PerMethod::default(),
        peers: PeerMultiples::default(),
        warnings: target.warnings.clone(),
        note: Some("no peer group configured".to_string()),
    }
}
