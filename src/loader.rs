//! Loads portfolio and basket members from CSV files.
//!
//! Expected header: `ticker, share, price_ev_w, price_pe_w, price_ps_w`. `share` is
//! required for baskets only. The weight columns are optional; a row leaving all of
//! them empty uses the configured default weights.

use crate::core::config::{AppConfig, Holding, Membership};
use crate::core::error::ConfigError;
use crate::core::method::{Method, PerMethod};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;
use tracing::{debug, info};

const TICKER_COLUMN: &str = "ticker";
const SHARE_COLUMN: &str = "share";

fn weight_column(method: Method) -> &'static str {
    match method {
        Method::EvEbitda => "price_ev_w",
        Method::PriceEarnings => "price_pe_w",
        Method::PriceSales => "price_ps_w",
    }
}

/// Parses a number that may use a comma as decimal separator (`0,25`).
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse::<f64>().ok()
}

struct Columns {
    ticker: usize,
    share: Option<usize>,
    weights: Option<PerMethod<usize>>,
}

fn locate_columns(headers: &StringRecord, require_share: bool) -> Result<Columns, String> {
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let ticker = find(TICKER_COLUMN);
    let share = find(SHARE_COLUMN);
    let weights = PerMethod::from_fn(|method| find(weight_column(method)));
    let any_weight = weights.iter().any(|(_, idx)| idx.is_some());

    let mut missing = Vec::new();
    if ticker.is_none() {
        missing.push(TICKER_COLUMN);
    }
    if require_share && share.is_none() {
        missing.push(SHARE_COLUMN);
    }
    if any_weight {
        for (method, idx) in weights.iter() {
            if idx.is_none() {
                missing.push(weight_column(method));
            }
        }
    }

    match ticker {
        Some(ticker) if missing.is_empty() => Ok(Columns {
            ticker,
            share,
            weights: if any_weight {
                Some(weights.map(|_, idx| idx.unwrap_or_default()))
            } else {
                None
            },
        }),
        _ => Err(format!("missing required columns: {}", missing.join(", "))),
    }
}

fn cell<'r>(record: &'r StringRecord, idx: usize) -> &'r str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn number_cell(
    record: &StringRecord,
    idx: usize,
    column: &str,
    row: usize,
) -> Result<Option<f64>, String> {
    let text = cell(record, idx);
    if text.is_empty() {
        return Ok(None);
    }
    parse_number(text)
        .map(Some)
        .ok_or_else(|| format!("row {row}, column {column}: cannot parse '{text}' as a number"))
}

fn parse_members(path: &Path, require_share: bool) -> Result<Vec<Holding>, String> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;

    let headers = reader
        .headers()
        .map_err(|e| format!("cannot read header of {}: {e}", path.display()))?
        .clone();
    let columns =
        locate_columns(&headers, require_share).map_err(|e| format!("{}: {e}", path.display()))?;

    let mut holdings = Vec::new();
    for (index, record) in reader.records().enumerate() {
        // Header is line 1
        let row = index + 2;
        let record = record.map_err(|e| format!("{}: row {row}: {e}", path.display()))?;

        let ticker = cell(&record, columns.ticker);
        if ticker.is_empty() {
            debug!(row, "Skipping row without ticker");
            continue;
        }

        let share = match columns.share {
            Some(idx) => number_cell(&record, idx, SHARE_COLUMN, row)
                .map_err(|e| format!("{}: {e}", path.display()))?,
            None => None,
        };

        let weights = match &columns.weights {
            Some(indices) => {
                let mut values = PerMethod::<Option<f64>>::default();
                for (method, idx) in indices.iter() {
                    *values.get_mut(method) =
                        number_cell(&record, *idx, weight_column(method), row)
                            .map_err(|e| format!("{}: {e}", path.display()))?;
                }
                match (values.ev_ebitda, values.pe, values.ps) {
                    (Some(ev), Some(pe), Some(ps)) => Some(PerMethod::new(ev, pe, ps)),
                    (None, None, None) => None,
                    _ => {
                        return Err(format!(
                            "{}: row {row}: weights must be given for all methods or none",
                            path.display()
                        ));
                    }
                }
            }
            None => None,
        };

        holdings.push(Holding {
            ticker: ticker.to_string(),
            share,
            weights,
        });
    }

    info!(
        "Loaded {} members from {}",
        holdings.len(),
        path.display()
    );
    Ok(holdings)
}

fn load_members(
    config: &AppConfig,
    name: &str,
    file: Option<&str>,
    inline: &[Holding],
    require_share: bool,
) -> Membership {
    let mut members = Vec::new();
    if let Some(file) = file {
        match parse_members(&config.resolve_path(file), require_share) {
            Ok(rows) => members.extend(rows),
            Err(reason) => {
                return Membership {
                    name: name.to_string(),
                    members: Err(ConfigError::Load {
                        entry: name.to_string(),
                        reason,
                    }),
                };
            }
        }
    }
    members.extend(inline.iter().cloned());

    Membership {
        name: name.to_string(),
        members: Ok(members),
    }
}

/// Portfolios with file rows followed by inline holdings.
pub fn load_portfolios(config: &AppConfig) -> Vec<Membership> {
    config
        .portfolios
        .iter()
        .map(|p| load_members(config, &p.name, p.file.as_deref(), &p.holdings, false))
        .collect()
}

/// Baskets with file rows followed by inline members.
pub fn load_baskets(config: &AppConfig) -> Vec<Membership> {
    config
        .baskets
        .iter()
        .map(|b| load_members(config, &b.name, b.file.as_deref(), &b.members, true))
        .collect()
}
