use super::ui;
use crate::core::analytics::{
    self, BasketEntry, EntryError, SecurityEntry, ValuationEngine, ValuationRun,
};
use crate::core::config::AppConfig;
use crate::core::fetch::{FetchOrchestrator, FetchOutcome};
use crate::core::valuation::{FairPrice, ValuationResult};
use crate::loader;
use anyhow::Result;
use comfy_table::{Cell, Color, Table};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Which part of the configuration a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Stocks,
    Baskets,
}

impl Scope {
    fn includes_stocks(self) -> bool {
        matches!(self, Scope::All | Scope::Stocks)
    }

    fn includes_baskets(self) -> bool {
        matches!(self, Scope::All | Scope::Baskets)
    }
}

/// Fetches `tickers` behind a progress bar.
pub async fn fetch_with_progress(
    orchestrator: &FetchOrchestrator,
    tickers: &BTreeSet<String>,
) -> HashMap<String, FetchOutcome> {
    let pb = ui::new_progress_bar(tickers.len() as u64, true);
    pb.set_message("Fetching fundamentals...");
    let data = orchestrator.fetch_all(tickers, &|| pb.inc(1)).await;
    pb.finish_and_clear();
    data
}

pub async fn run(config: &AppConfig, orchestrator: &FetchOrchestrator, scope: Scope) -> Result<()> {
    let portfolios = if scope.includes_stocks() {
        loader::load_portfolios(config)
    } else {
        Vec::new()
    };
    let baskets = if scope.includes_baskets() {
        loader::load_baskets(config)
    } else {
        Vec::new()
    };

    let lists: Vec<_> = portfolios.iter().chain(baskets.iter()).collect();
    let tickers = analytics::required_tickers(&lists, &config.peers);
    info!(
        "Valuing {} portfolios and {} baskets over {} tickers",
        portfolios.len(),
        baskets.len(),
        tickers.len()
    );

    let data = fetch_with_progress(orchestrator, &tickers).await;
    let engine = ValuationEngine::from_config(config);
    let run = engine.run(&portfolios, &baskets, &data);

    let load_failures: Vec<String> = portfolios
        .iter()
        .filter_map(|p| p.members.as_ref().err().map(|e| e.to_string()))
        .collect();

    println!("{}", display_run(&run, &load_failures, &config.currency, scope));
    Ok(())
}

/// Renders the full report for one run.
pub fn display_run(
    run: &ValuationRun,
    load_failures: &[String],
    currency: &str,
    scope: Scope,
) -> String {
    let mut output = String::new();

    if scope.includes_stocks() {
        output.push_str(&format!(
            "{}\n\n",
            ui::style_text("Stocks", ui::StyleType::Title)
        ));
        if !run.securities.iter().any(|e| e.outcome.is_ok()) {
            output.push_str(&ui::style_text("No stocks valued.", ui::StyleType::Subtle));
        } else {
            output.push_str(&stocks_table(&run.securities, currency).to_string());
        }

        let failed = failed_securities(&run.securities);
        if !failed.is_empty() || !load_failures.is_empty() {
            output.push_str(&format!(
                "\n\n{}\n",
                ui::style_text("Failed entries:", ui::StyleType::TotalLabel)
            ));
            for line in load_failures.iter().chain(failed.iter()) {
                output.push_str(&format!(
                    "  {}\n",
                    ui::style_text(line, ui::StyleType::Error)
                ));
            }
        }
    }

    if scope.includes_baskets() && !run.baskets.is_empty() {
        if scope.includes_stocks() {
            output.push('\n');
        }
        output.push_str(&format!(
            "\n{}\n\n",
            ui::style_text("Baskets", ui::StyleType::Title)
        ));
        output.push_str(&baskets_table(&run.baskets, currency).to_string());
    }

    output
}

fn failed_securities(entries: &[SecurityEntry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| match &entry.outcome {
            Err(EntryError::Fetch(e)) => Some(format!("{} / {}: {e}", entry.source, entry.ticker)),
            Err(EntryError::Config(e)) => Some(e.to_string()),
            Ok(_) => None,
        })
        .collect()
}

/// Orders by premium/discount, largest first, undefined last.
pub fn compare_premium(a: &ValuationResult, b: &ValuationResult) -> Ordering {
    match (a.premium_discount, b.premium_discount) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.ticker.cmp(&b.ticker),
    }
}

fn methods_summary(result: &ValuationResult) -> String {
    let used: Vec<String> = result
        .effective_weights
        .iter()
        .filter(|(method, weight)| **weight > 0.0 && result.candidates.get(*method).is_some())
        .map(|(method, weight)| format!("{method} {weight:.2}"))
        .collect();
    used.join("\n")
}

fn notes(result: &ValuationResult) -> String {
    result
        .note
        .iter()
        .chain(result.warnings.iter())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn stocks_table(entries: &[SecurityEntry], currency: &str) -> Table {
    let mut rows: Vec<(&str, &ValuationResult)> = entries
        .iter()
        .filter_map(|e| e.outcome.as_ref().ok().map(|r| (e.source.as_str(), r)))
        .collect();
    rows.sort_by(|(_, a), (_, b)| compare_premium(a, b));

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Portfolio"),
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell(&format!("Price ({currency})")),
        ui::header_cell(&format!("Fair Price ({currency})")),
        ui::header_cell("Premium/Discount"),
        ui::header_cell("Methods"),
        ui::header_cell("Peers"),
        ui::header_cell("Notes"),
    ]);

    for (source, result) in rows {
        let price_ccy = if result.currency == currency {
            String::new()
        } else {
            format!(" {}", result.currency)
        };
        let fair = match result.fair_price {
            FairPrice::Value(v) => ui::amount_cell(v, &price_ccy),
            FairPrice::Unvaluable => ui::na_cell(true),
        };
        let premium = ui::premium_cell(result.premium_discount);
        let peer_total = result.peers.samples.len() + result.peers.failed.len();

        table.add_row(vec![
            Cell::new(source),
            Cell::new(&result.ticker),
            Cell::new(result.display_name()),
            ui::amount_cell(result.current_price, &price_ccy),
            fair,
            premium,
            Cell::new(methods_summary(result)),
            Cell::new(format!("{}/{}", result.peers.peers_used(), peer_total)),
            Cell::new(notes(result)).fg(Color::Yellow),
        ]);
    }

    table
}

pub fn baskets_table(entries: &[BasketEntry], currency: &str) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Basket"),
        ui::header_cell(&format!("Current Value ({currency})")),
        ui::header_cell(&format!("Fair Value ({currency})")),
        ui::header_cell("Premium/Discount"),
        ui::header_cell("Valued"),
        ui::header_cell("Notes"),
    ]);

    for entry in entries {
        match &entry.outcome {
            Ok(report) => {
                let v = &report.valuation;
                let unvalued: Vec<&str> = report
                    .members
                    .iter()
                    .filter(|m| m.member.fair_price == FairPrice::Unvaluable)
                    .map(|m| m.member.ticker.as_str())
                    .collect();
                let note = if unvalued.is_empty() {
                    String::new()
                } else {
                    format!("not valued: {}", unvalued.join(", "))
                };
                table.add_row(vec![
                    Cell::new(&entry.name),
                    ui::amount_cell(v.current_value, ""),
                    ui::amount_cell(v.fair_value, ""),
                    ui::premium_cell(v.premium_discount),
                    Cell::new(format!("{}/{}", v.valued_count, v.total_count)),
                    Cell::new(note).fg(Color::Yellow),
                ]);
            }
            Err(e) => {
                table.add_row(vec![
                    Cell::new(&entry.name),
                    ui::na_cell(true),
                    ui::na_cell(true),
                    ui::na_cell(true),
                    ui::na_cell(true),
                    Cell::new(e.to_string()).fg(Color::Red),
                ]);
            }
        }
    }

    table
}
