//! Runs the valuation pipeline over loaded portfolios and baskets.
//!
//! Fetching happens up front through the orchestrator; everything here works on the
//! resulting per-ticker outcomes and is synchronous.
use crate::core::basket::{self, BasketValuation, MemberValuation};
use crate::core::config::{AppConfig, Holding, Membership};
use crate::core::error::{ConfigError, FetchError};
use crate::core::fetch::FetchOutcome;
use crate::core::method::{MethodWeights, OutlierBounds};
use crate::core::multiples;
use crate::core::valuation::{self, FairPrice, ValuationResult};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a single security could not produce a valuation result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Valuation of one portfolio row.
#[derive(Debug, Clone)]
pub struct SecurityEntry {
    pub source: String,
    pub ticker: String,
    pub outcome: Result<ValuationResult, EntryError>,
}

/// A basket member with the valuation behind it.
#[derive(Debug, Clone)]
pub struct BasketMemberEntry {
    pub member: MemberValuation,
    pub outcome: Result<ValuationResult, FetchError>,
}

#[derive(Debug, Clone)]
pub struct BasketReport {
    pub members: Vec<BasketMemberEntry>,
    pub valuation: BasketValuation,
}

#[derive(Debug, Clone)]
pub struct BasketEntry {
    pub name: String,
    pub outcome: Result<BasketReport, ConfigError>,
}

#[derive(Debug, Clone, Default)]
pub struct ValuationRun {
    pub securities: Vec<SecurityEntry>,
    pub baskets: Vec<BasketEntry>,
}

/// Every ticker a run needs: the listed securities and each one's peers.
pub fn required_tickers(
    lists: &[&Membership],
    peers: &BTreeMap<String, Vec<String>>,
) -> BTreeSet<String> {
    let mut tickers = BTreeSet::new();
    for holding in lists
        .iter()
        .filter_map(|l| l.members.as_ref().ok())
        .flatten()
    {
        tickers.insert(holding.ticker.clone());
        if let Some(peer_list) = peers.get(&holding.ticker) {
            tickers.extend(peer_list.iter().cloned());
        }
    }
    tickers
}

/// Values securities and baskets from pre-fetched fundamentals.
pub struct ValuationEngine<'a> {
    peers: &'a BTreeMap<String, Vec<String>>,
    default_weights: MethodWeights,
    bounds: OutlierBounds,
}

impl<'a> ValuationEngine<'a> {
    pub fn new(
        peers: &'a BTreeMap<String, Vec<String>>,
        default_weights: MethodWeights,
        bounds: OutlierBounds,
    ) -> Self {
        Self {
            peers,
            default_weights,
            bounds,
        }
    }

    pub fn from_config(config: &'a AppConfig) -> Self {
        Self::new(&config.peers, config.default_weights, config.outlier_bounds)
    }

    /// Averages the multiples of a peer group. A peer listed more than once counts once.
    pub fn peer_multiples(
        &self,
        peer_list: &[String],
        data: &HashMap<String, FetchOutcome>,
    ) -> multiples::PeerMultiples {
        let mut seen = HashSet::new();
        let outcomes: Vec<FetchOutcome> = peer_list
            .iter()
            .filter(|peer| seen.insert(peer.as_str()))
            .map(|peer| lookup(peer, data))
            .collect();
        multiples::compute(&outcomes, &self.bounds)
    }

    /// Values one ticker with the given configured weights.
    pub fn value_ticker(
        &self,
        ticker: &str,
        weights: &MethodWeights,
        data: &HashMap<String, FetchOutcome>,
    ) -> Result<ValuationResult, FetchError> {
        let target = lookup(ticker, data)?;
        let result = match self.peers.get(ticker) {
            Some(peer_list) => {
                let peers = self.peer_multiples(peer_list, data);
                valuation::value_security(&target, peers, weights)
            }
            None => {
                warn!(ticker, "No peer group configured");
                valuation::unvaluable_without_peers(&target)
            }
        };
        Ok(result)
    }

    fn weights_for(&self, entry: &str, holding: &Holding) -> Result<MethodWeights, ConfigError> {
        let weights = holding.weights.unwrap_or(self.default_weights);
        match weights.first_invalid() {
            Some((method, value)) => Err(ConfigError::InvalidWeight {
                entry: entry.to_string(),
                ticker: holding.ticker.clone(),
                method: method.key(),
                value,
            }),
            None => Ok(weights),
        }
    }

    pub fn value_portfolio(
        &self,
        portfolio: &Membership,
        data: &HashMap<String, FetchOutcome>,
    ) -> Vec<SecurityEntry> {
        let holdings = match &portfolio.members {
            Ok(holdings) => holdings,
            Err(e) => {
                warn!(portfolio = %portfolio.name, error = %e, "Portfolio skipped");
                return Vec::new();
            }
        };

        holdings
            .iter()
            .map(|holding| {
                let outcome = self
                    .weights_for(&portfolio.name, holding)
                    .map_err(EntryError::from)
                    .and_then(|weights| {
                        self.value_ticker(&holding.ticker, &weights, data)
                            .map_err(EntryError::from)
                    });
                SecurityEntry {
                    source: portfolio.name.clone(),
                    ticker: holding.ticker.clone(),
                    outcome,
                }
            })
            .collect()
    }

    /// Values every member, then rolls the basket up. Any malformed member fails the
    /// whole basket with the member named in the error.
    pub fn value_basket(
        &self,
        basket: &Membership,
        data: &HashMap<String, FetchOutcome>,
    ) -> BasketEntry {
        let outcome = basket
            .members
            .clone()
            .and_then(|members| self.basket_report(&basket.name, &members, data));
        BasketEntry {
            name: basket.name.clone(),
            outcome,
        }
    }

    fn basket_report(
        &self,
        name: &str,
        members: &[Holding],
        data: &HashMap<String, FetchOutcome>,
    ) -> Result<BasketReport, ConfigError> {
        let mut validated = Vec::with_capacity(members.len());
        for holding in members {
            let share = match holding.share {
                None => {
                    return Err(ConfigError::MissingShare {
                        entry: name.to_string(),
                        ticker: holding.ticker.clone(),
                    });
                }
                Some(share) if !share.is_finite() || share < 0.0 => {
                    return Err(ConfigError::InvalidShare {
                        entry: name.to_string(),
                        ticker: holding.ticker.clone(),
                        value: share,
                    });
                }
                Some(share) => share,
            };
            let weights = self.weights_for(name, holding)?;
            validated.push((holding, share, weights));
        }

        let entries: Vec<BasketMemberEntry> = validated
            .into_iter()
            .map(|(holding, share, weights)| {
                let outcome = self.value_ticker(&holding.ticker, &weights, data);
                let member = MemberValuation {
                    ticker: holding.ticker.clone(),
                    share,
                    current_price: outcome
                        .as_ref()
                        .ok()
                        .map(|r| r.current_price)
                        .filter(|p| *p > 0.0),
                    fair_price: outcome
                        .as_ref()
                        .map_or(FairPrice::Unvaluable, |r| r.fair_price),
                };
                BasketMemberEntry { member, outcome }
            })
            .collect();

        let members: Vec<MemberValuation> = entries.iter().map(|e| e.member.clone()).collect();
        let valuation = basket::aggregate(&members);
        debug!(basket = name, ?valuation, "Basket valued");

        Ok(BasketReport {
            members: entries,
            valuation,
        })
    }

    pub fn run(
        &self,
        portfolios: &[Membership],
        baskets: &[Membership],
        data: &HashMap<String, FetchOutcome>,
    ) -> ValuationRun {
        ValuationRun {
            securities: portfolios
                .iter()
                .flat_map(|p| self.value_portfolio(p, data))
                .collect(),
            baskets: baskets.iter().map(|b| self.value_basket(b, data)).collect(),
        }
    }
}

fn lookup(ticker: &str, data: &HashMap<String, FetchOutcome>) -> FetchOutcome {
    data.get(ticker).cloned().unwrap_or_else(|| {
        Err(FetchError::Unreachable {
            ticker: ticker.to_string(),
            reason: "not fetched".to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fundamentals::Fundamentals;
    use crate::core::method::{DEFAULT_OUTLIER_BOUNDS, DEFAULT_WEIGHTS, PerMethod};

    fn company(ticker: &str, price: f64, eps: f64) -> Fundamentals {
        let mut f = Fundamentals::new(ticker, "EUR", price);
        f.shares = Some(100.0);
        f.eps = Some(eps);
        f
    }

    fn data(entries: Vec<Fundamentals>) -> HashMap<String, FetchOutcome> {
        entries
            .into_iter()
            .map(|f| (f.ticker.clone(), Ok(f)))
            .collect()
    }

    fn peers() -> BTreeMap<String, Vec<String>> {
        let mut peers = BTreeMap::new();
        peers.insert(
            "TGT".to_string(),
            vec!["P1".to_string(), "P2".to_string(), "MISSING".to_string()],
        );
        peers.insert("OTHER".to_string(), vec!["P1".to_string()]);
        peers
    }

    fn membership(name: &str, holdings: Vec<Holding>) -> Membership {
        Membership {
            name: name.to_string(),
            members: Ok(holdings),
        }
    }

    fn member(ticker: &str, share: f64) -> Holding {
        Holding {
            ticker: ticker.to_string(),
            share: Some(share),
            weights: None,
        }
    }

    #[test]
    fn test_required_tickers_include_peers() {
        let peers = peers();
        let stocks = membership("Stocks", vec![Holding::new("TGT")]);
        let fund = membership("Fund", vec![member("OTHER", 1.0), member("LONE", 1.0)]);
        let broken = Membership {
            name: "Broken".to_string(),
            members: Err(ConfigError::Load {
                entry: "Broken".to_string(),
                reason: "missing".to_string(),
            }),
        };

        let tickers = required_tickers(&[&stocks, &fund, &broken], &peers);
        let expected: BTreeSet<String> = ["TGT", "P1", "P2", "MISSING", "OTHER", "LONE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tickers, expected);
    }

    #[test]
    fn test_value_ticker_uses_peer_average() {
        let peers = peers();
        let engine = ValuationEngine::new(&peers, DEFAULT_WEIGHTS, DEFAULT_OUTLIER_BOUNDS);
        // Peer P/E: 10 and 14, average 12
        let data = data(vec![
            company("TGT", 25.0, 2.5),
            company("P1", 20.0, 2.0),
            company("P2", 28.0, 2.0),
        ]);

        let result = engine.value_ticker("TGT", &DEFAULT_WEIGHTS, &data).unwrap();
        assert_eq!(result.peers.failed.len(), 1);
        assert_eq!(result.peers.peers_used(), 2);
        assert!((result.candidates.pe.unwrap() - 30.0).abs() < 1e-9);
        assert!((result.fair_price.value().unwrap() - 30.0).abs() < 1e-9);
        assert!((result.premium_discount.unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_peer_counts_once() {
        let mut peers = BTreeMap::new();
        peers.insert(
            "TGT".to_string(),
            ["P1", "P1", "P2", "GONE", "GONE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let engine = ValuationEngine::new(&peers, DEFAULT_WEIGHTS, DEFAULT_OUTLIER_BOUNDS);
        let data = data(vec![
            company("TGT", 25.0, 2.5),
            company("P1", 20.0, 2.0),
            company("P2", 28.0, 2.0),
        ]);

        let result = engine.value_ticker("TGT", &DEFAULT_WEIGHTS, &data).unwrap();
        assert_eq!(result.peers.averages.pe, Some(12.0));
        assert_eq!(result.peers.samples.len(), 2);
        assert_eq!(result.peers.failed.len(), 1);
        let order: Vec<&str> = result.peers.samples.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(order, vec!["P1", "P2"]);
    }

    #[test]
    fn test_target_without_peer_group_is_unvaluable() {
        let peers = peers();
        let engine = ValuationEngine::new(&peers, DEFAULT_WEIGHTS, DEFAULT_OUTLIER_BOUNDS);
        let data = data(vec![company("LONE", 10.0, 1.0)]);

        let result = engine.value_ticker("LONE", &DEFAULT_WEIGHTS, &data).unwrap();
        assert_eq!(result.fair_price, FairPrice::Unvaluable);
        assert_eq!(result.note.as_deref(), Some("no peer group configured"));
    }

    #[test]
    fn test_failed_target_surfaces_fetch_error() {
        let peers = peers();
        let engine = ValuationEngine::new(&peers, DEFAULT_WEIGHTS, DEFAULT_OUTLIER_BOUNDS);
        let mut data = data(vec![company("P1", 20.0, 2.0)]);
        data.insert(
            "TGT".to_string(),
            Err(FetchError::MissingPrice("TGT".to_string())),
        );

        let portfolio = membership("Stocks", vec![Holding::new("TGT")]);
        let entries = engine.value_portfolio(&portfolio, &data);
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].outcome.as_ref().unwrap_err(),
            &EntryError::Fetch(FetchError::MissingPrice("TGT".to_string()))
        );
    }

    #[test]
    fn test_invalid_row_weight_fails_only_that_row() {
        let peers = peers();
        let engine = ValuationEngine::new(&peers, DEFAULT_WEIGHTS, DEFAULT_OUTLIER_BOUNDS);
        let data = data(vec![
            company("TGT", 25.0, 2.5),
            company("OTHER", 25.0, 2.5),
            company("P1", 20.0, 2.0),
        ]);
        let mut bad = Holding::new("TGT");
        bad.weights = Some(PerMethod::new(0.3, f64::INFINITY, 0.3));
        let portfolio = membership("Stocks", vec![bad, Holding::new("OTHER")]);

        let entries = engine.value_portfolio(&portfolio, &data);
        assert!(matches!(
            entries[0].outcome,
            Err(EntryError::Config(ConfigError::InvalidWeight { method: "pe", .. }))
        ));
        assert!(entries[1].outcome.is_ok());
    }

    #[test]
    fn test_basket_rolls_up_members() {
        let mut peers = BTreeMap::new();
        peers.insert("A".to_string(), vec!["PA".to_string()]);
        peers.insert("B".to_string(), vec!["PB".to_string()]);
        let engine = ValuationEngine::new(&peers, DEFAULT_WEIGHTS, DEFAULT_OUTLIER_BOUNDS);
        // A: fair 110 vs 100, B: fair 190 vs 200
        let data = data(vec![
            company("A", 100.0, 11.0),
            company("PA", 100.0, 10.0),
            company("B", 200.0, 19.0),
            company("PB", 100.0, 10.0),
            company("C", 50.0, 5.0),
        ]);

        let fund = membership("Fund", vec![member("A", 0.5), member("B", 0.5)]);
        let entry = engine.value_basket(&fund, &data);
        let report = entry.outcome.unwrap();
        assert!((report.valuation.current_value - 150.0).abs() < 1e-9);
        assert!((report.valuation.fair_value - 150.0).abs() < 1e-9);
        assert!(report.valuation.premium_discount.unwrap().abs() < 1e-9);
        assert_eq!(report.valuation.valued_count, 2);

        // C has no peers: counted, priced, but not valued
        let fund = membership("Fund", vec![member("A", 1.0), member("C", 1.0)]);
        let report = engine.value_basket(&fund, &data).outcome.unwrap();
        assert_eq!(report.valuation.total_count, 2);
        assert_eq!(report.valuation.valued_count, 1);
        assert!((report.valuation.current_value - 150.0).abs() < 1e-9);
        assert!((report.valuation.fair_value - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_basket_with_bad_share_fails_with_cause() {
        let peers = peers();
        let engine = ValuationEngine::new(&peers, DEFAULT_WEIGHTS, DEFAULT_OUTLIER_BOUNDS);
        let data = data(vec![company("TGT", 25.0, 2.5)]);

        let fund = membership("Fund", vec![member("TGT", 0.5), member("OTHER", -0.1)]);
        let entry = engine.value_basket(&fund, &data);
        assert_eq!(
            entry.outcome.unwrap_err(),
            ConfigError::InvalidShare {
                entry: "Fund".to_string(),
                ticker: "OTHER".to_string(),
                value: -0.1,
            }
        );

        let fund = membership("Fund", vec![Holding::new("TGT")]);
        let entry = engine.value_basket(&fund, &data);
        assert!(matches!(
            entry.outcome,
            Err(ConfigError::MissingShare { .. })
        ));
    }

    #[test]
    fn test_run_covers_portfolios_and_baskets() {
        let peers = peers();
        let engine = ValuationEngine::new(&peers, DEFAULT_WEIGHTS, DEFAULT_OUTLIER_BOUNDS);
        let data = data(vec![company("TGT", 25.0, 2.5), company("P1", 20.0, 2.0)]);

        let run = engine.run(
            &[membership("Stocks", vec![Holding::new("TGT")])],
            &[membership("Fund", vec![member("TGT", 1.0)])],
            &data,
        );
        assert_eq!(run.securities.len(), 1);
        assert_eq!(run.baskets.len(), 1);
        assert_eq!(run.securities[0].source, "Stocks");
    }
}
