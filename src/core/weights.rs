//! Redistribution of method weights over the methods that produced a price.

use crate::core::method::{Method, MethodWeights, PerMethod};
use std::collections::BTreeSet;

/// Renormalizes `configured` over `available`.
///
/// Methods outside `available` get 0. Inside it each method gets its share of the
/// available configured total. When that total is 0 the weight is split equally
/// across `available`. An empty `available` yields all zeros, which marks the
/// security as unvaluable.
pub fn redistribute(configured: &MethodWeights, available: &BTreeSet<Method>) -> MethodWeights {
    if available.is_empty() {
        return MethodWeights::default();
    }

    // Negative or NaN weights never reach here from validated config; treat as 0.
    let weight = |m: Method| configured.get(m).max(0.0);
    let total: f64 = available.iter().map(|m| weight(*m)).sum();

    if total > 0.0 && total.is_finite() {
        PerMethod::from_fn(|m| {
            if available.contains(&m) {
                weight(m) / total
            } else {
                0.0
            }
        })
    } else {
        let share = 1.0 / available.len() as f64;
        PerMethod::from_fn(|m| if available.contains(&m) { share } else { 0.0 })
    }
}

/// Methods for which `values` holds something.
pub fn available_methods<T>(values: &PerMethod<Option<T>>) -> BTreeSet<Method> {
    values
        .iter()
        .filter(|(_, v)| v.is_some())
        .map(|(m, _)| m)
        .collect()
}
