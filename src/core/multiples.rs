//! Peer multiples: per-peer EV/EBITDA, P/E and P/S with outlier filtering and
//! per-method averaging.

use crate::core::error::FetchError;
use crate::core::fundamentals::Fundamentals;
use crate::core::method::{Method, OutlierBounds, PerMethod};
use tracing::debug;

/// One optional value per method. `None` means not computable or discarded.
pub type MultipleSet = PerMethod<Option<f64>>;

/// Raw multiples of a single company, before any outlier filtering.
pub fn company_multiples(f: &Fundamentals) -> MultipleSet {
    let ev_ebitda = match (f.enterprise_value(), f.ebitda) {
        (Some(ev), Some(ebitda)) if ebitda > 0.0 => Some(ev / ebitda),
        _ => None,
    };
    let pe = f.eps.filter(|eps| *eps > 0.0).map(|eps| f.price / eps);
    let ps = f.sales_per_share().map(|sps| f.price / sps);

    PerMethod::new(ev_ebitda, pe, ps)
}

/// Drops multiples that are non-positive, not finite or above their bound.
pub fn filter_outliers(multiples: &MultipleSet, bounds: &OutlierBounds) -> MultipleSet {
    multiples.map(|method, value| {
        value.filter(|v| v.is_finite() && *v > 0.0 && *v <= *bounds.get(method))
    })
}

/// A peer that delivered fundamentals.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSample {
    pub ticker: String,
    pub name: Option<String>,
    pub raw: MultipleSet,
    pub accepted: MultipleSet,
}

impl PeerSample {
    /// Whether at least one of the peer's multiples survived filtering.
    pub fn is_used(&self) -> bool {
        self.accepted.iter().any(|(_, v)| v.is_some())
    }
}

/// Averaged peer multiples with the samples they were computed from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeerMultiples {
    pub averages: MultipleSet,
    pub samples: Vec<PeerSample>,
    pub failed: Vec<FetchError>,
}

impl PeerMultiples {
    pub fn peers_used(&self) -> usize {
        self.samples.iter().filter(|s| s.is_used()).count()
    }

    /// Number of accepted samples behind one method's average.
    pub fn sample_count(&self, method: Method) -> usize {
        self.samples
            .iter()
            .filter(|s| s.accepted.get(method).is_some())
            .count()
    }
}

/// Computes per-method averages over the peers' filtered multiples. Peers whose
/// fetch failed contribute to no method.
pub fn compute<'a>(
    peers: impl IntoIterator<Item = &'a Result<Fundamentals, FetchError>>,
    bounds: &OutlierBounds,
) -> PeerMultiples {
    let mut result = PeerMultiples::default();

    for peer in peers {
        match peer {
            Ok(f) => {
                let raw = company_multiples(f);
                let accepted = filter_outliers(&raw, bounds);
                debug!(peer = %f.ticker, ?raw, ?accepted, "Peer multiples");
                result.samples.push(PeerSample {
                    ticker: f.ticker.clone(),
                    name: f.name.clone(),
                    raw,
                    accepted,
                });
            }
            Err(e) => {
                debug!(peer = %e.ticker(), error = %e, "Peer excluded, no data");
                result.failed.push(e.clone());
            }
        }
    }

    result.averages = PerMethod::from_fn(|method| {
        let values: Vec<f64> = result
            .samples
            .iter()
            .filter_map(|s| *s.accepted.get(method))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    });

    result
}
