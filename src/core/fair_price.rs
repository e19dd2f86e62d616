//! Candidate fair prices implied by peer-average multiples

use crate::core::fundamentals::Fundamentals;
use crate::core::method::PerMethod;
use crate::core::multiples::MultipleSet;

/// One optional candidate price per method.
pub type CandidatePrices = PerMethod<Option<f64>>;

/// Applies each available peer-average multiple to the target's own fundamentals.
///
/// A method yields `None` when its average is missing, when a required target
/// fundamental is missing or non-positive, or when the implied price is not positive.
pub fn candidate_prices(target: &Fundamentals, averages: &MultipleSet) -> CandidatePrices {
    let shares = target.valid_shares();

    let ev_ebitda = match (averages.ev_ebitda, target.ebitda, shares) {
        (Some(multiple), Some(ebitda), Some(shares)) if ebitda > 0.0 => {
            let enterprise_value = multiple * ebitda;
            let equity_value =
                enterprise_value - target.debt.unwrap_or(0.0) + target.cash.unwrap_or(0.0);
            Some(equity_value / shares)
        }
        _ => None,
    };

    let pe = match (averages.pe, target.eps) {
        (Some(multiple), Some(eps)) if eps > 0.0 => Some(multiple * eps),
        _ => None,
    };

    let ps = match (averages.ps, target.sales_per_share()) {
        (Some(multiple), Some(sales_per_share)) => Some(multiple * sales_per_share),
        _ => None,
    };

    PerMethod::new(ev_ebitda, pe, ps).map(|_, price| price.filter(|p| p.is_finite() && *p > 0.0))
}
