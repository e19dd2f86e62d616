use super::{ui, value};
use crate::core::analytics::ValuationEngine;
use crate::core::config::AppConfig;
use crate::core::fetch::FetchOrchestrator;
use crate::core::method::Method;
use crate::core::multiples::{MultipleSet, PeerMultiples};
use anyhow::{Result, anyhow};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table};
use std::collections::BTreeSet;

/// Shows how a target's peer averages were formed, then its valuation.
pub async fn run(config: &AppConfig, orchestrator: &FetchOrchestrator, ticker: &str) -> Result<()> {
    let peer_list = config
        .peers
        .get(ticker)
        .ok_or_else(|| anyhow!("{ticker} has no configured peer group"))?;

    let mut tickers: BTreeSet<String> = peer_list.iter().cloned().collect();
    tickers.insert(ticker.to_string());
    let data = value::fetch_with_progress(orchestrator, &tickers).await;

    let engine = ValuationEngine::from_config(config);
    let peers = engine.peer_multiples(peer_list, &data);

    println!(
        "Peers of {}\n",
        ui::style_text(ticker, ui::StyleType::Title)
    );
    println!("{}", peer_table(&peers));

    for failure in &peers.failed {
        println!(
            "  {}",
            ui::style_text(&failure.to_string(), ui::StyleType::Error)
        );
    }

    match engine.value_ticker(ticker, &config.default_weights, &data) {
        Ok(result) => {
            let fair = result
                .fair_price
                .value()
                .map_or("N/A".to_string(), |v| format!("{v:.2}"));
            let premium = result
                .premium_discount
                .map_or("N/A".to_string(), |p| format!("{p:+.2}%"));
            println!(
                "\n{} price {:.2} {}, fair price {} ({})",
                ui::style_text(result.display_name(), ui::StyleType::TotalLabel),
                result.current_price,
                result.currency,
                ui::style_text(&fair, ui::StyleType::TotalValue),
                premium
            );
            for warning in result.note.iter().chain(result.warnings.iter()) {
                println!("  {}", ui::style_text(warning, ui::StyleType::Warning));
            }
        }
        Err(e) => println!(
            "\n{}",
            ui::style_text(&e.to_string(), ui::StyleType::Error)
        ),
    }

    Ok(())
}

fn multiple_cell(raw: Option<f64>, accepted: Option<f64>) -> Cell {
    match (raw, accepted) {
        (Some(_), Some(v)) => Cell::new(format!("{v:.2}")).set_alignment(CellAlignment::Right),
        (Some(v), None) => Cell::new(format!("{v:.2} (excluded)"))
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        (None, _) => ui::na_cell(false),
    }
}

fn average_cell(averages: &MultipleSet, peers: &PeerMultiples, method: Method) -> Cell {
    match averages.get(method) {
        Some(avg) => Cell::new(format!("{avg:.2} (n={})", peers.sample_count(method)))
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right),
        None => ui::na_cell(true),
    }
}

/// One row per peer with raw multiples; excluded values are marked.
pub fn peer_table(peers: &PeerMultiples) -> Table {
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Peer"), ui::header_cell("Name")];
    header.extend(Method::ALL.iter().map(|m| ui::header_cell(&m.to_string())));
    table.set_header(header);

    for sample in &peers.samples {
        let mut row = vec![
            Cell::new(&sample.ticker),
            Cell::new(sample.name.as_deref().unwrap_or("")),
        ];
        row.extend(
            Method::ALL
                .iter()
                .map(|m| multiple_cell(*sample.raw.get(*m), *sample.accepted.get(*m))),
        );
        table.add_row(row);
    }

    let mut average_row = vec![
        Cell::new("Average").add_attribute(Attribute::Bold),
        Cell::new(""),
    ];
    average_row.extend(
        Method::ALL
            .iter()
            .map(|m| average_cell(&peers.averages, peers, *m)),
    );
    table.add_row(average_row);

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::method::PerMethod;
    use crate::core::multiples::PeerSample;

    #[test]
    fn test_peer_table_marks_excluded_multiples() {
        let peers = PeerMultiples {
            averages: PerMethod::new(None, Some(12.0), Some(2.0)),
            samples: vec![
                PeerSample {
                    ticker: "P1".to_string(),
                    name: Some("Peer One".to_string()),
                    raw: PerMethod::new(Some(75.0), Some(12.0), Some(2.0)),
                    accepted: PerMethod::new(None, Some(12.0), Some(2.0)),
                },
                PeerSample {
                    ticker: "P2".to_string(),
                    name: None,
                    raw: PerMethod::new(None, None, None),
                    accepted: PerMethod::new(None, None, None),
                },
            ],
            failed: Vec::new(),
        };

        let mut table = peer_table(&peers);
        let rendered = table.force_no_tty().to_string();
        assert!(rendered.contains("Peer One"));
        assert!(rendered.contains("75.00 (excluded)"));
        assert!(rendered.contains("12.00 (n=1)"));
        assert!(rendered.contains("EV/EBITDA"));
        assert!(rendered.contains("Average"));
    }
}
