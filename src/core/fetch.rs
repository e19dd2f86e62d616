//! Concurrent, paced acquisition of fundamentals for a set of tickers.

use crate::core::cache::Cache;
use crate::core::currency::CurrencyNormalizer;
use crate::core::error::FetchError;
use crate::core::fundamentals::{Fundamentals, FundamentalsProvider};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

pub type FetchOutcome = Result<Fundamentals, FetchError>;

/// One entry per ticker per run, holding the normalized record or the failure.
pub type FundamentalsCache = Cache<String, FetchOutcome>;

pub struct FetchOrchestrator {
    provider: Arc<dyn FundamentalsProvider>,
    normalizer: Arc<CurrencyNormalizer>,
    cache: Arc<FundamentalsCache>,
    max_workers: usize,
    delay: Duration,
}

impl FetchOrchestrator {
    pub fn new(
        provider: Arc<dyn FundamentalsProvider>,
        normalizer: Arc<CurrencyNormalizer>,
        cache: Arc<FundamentalsCache>,
        max_workers: usize,
        delay: Duration,
    ) -> Self {
        Self {
            provider,
            normalizer,
            cache,
            max_workers: max_workers.max(1),
            delay,
        }
    }

    /// Fundamentals for one ticker in the reporting currency. Only the first call per
    /// ticker reaches the provider; later calls replay the cached outcome.
    pub async fn get(&self, ticker: &str) -> FetchOutcome {
        self.cache
            .get_or_insert_with(ticker.to_string(), || async {
                match self.provider.fetch_fundamentals(ticker).await {
                    Ok(raw) => Ok(self.normalizer.normalize(raw).await),
                    Err(e) => {
                        warn!(ticker, error = %e, "Failed to fetch fundamentals");
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Fetches every ticker with at most `max_workers` in flight. Each worker waits
    /// at least `delay` between the provider calls it issues. Failures are returned
    /// per ticker; they never stop the batch. `on_fetched` runs once per ticker.
    #[instrument(skip_all, fields(tickers = tickers.len(), workers = self.max_workers))]
    pub async fn fetch_all(
        &self,
        tickers: &BTreeSet<String>,
        on_fetched: &(dyn Fn() + Sync),
    ) -> HashMap<String, FetchOutcome> {
        let queue = Mutex::new(tickers.iter().cloned().collect::<VecDeque<_>>());
        let workers = self.max_workers.min(tickers.len());

        let results: HashMap<String, FetchOutcome> = join_all(
            (0..workers).map(|worker| self.run_worker(worker, &queue, on_fetched)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        let failed = results.values().filter(|r| r.is_err()).count();
        info!("Fetched {} tickers ({} failed)", results.len(), failed);
        results
    }

    async fn run_worker(
        &self,
        worker: usize,
        queue: &Mutex<VecDeque<String>>,
        on_fetched: &(dyn Fn() + Sync),
    ) -> Vec<(String, FetchOutcome)> {
        let mut results = Vec::new();
        let mut last_call: Option<Instant> = None;

        loop {
            let Some(ticker) = queue.lock().await.pop_front() else {
                break;
            };

            let cached = self.cache.get(&ticker).await.is_some();
            if !cached {
                if let Some(last) = last_call {
                    tokio::time::sleep_until(last + self.delay).await;
                }
                last_call = Some(Instant::now());
            }

            debug!(worker, ticker = %ticker, cached, "Fetching");
            let outcome = self.get(&ticker).await;
            on_fetched();
            results.push((ticker, outcome));
        }

        results
    }
}
