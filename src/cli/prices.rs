use super::ui;
use crate::core::PriceRecord;
use crate::core::batch::{PriceService, normalize_symbols};
use anyhow::{Context, Result};
use comfy_table::Cell;
use serde::Serialize;
use std::collections::HashMap;

/// JSON envelope printed by `prices --json`.
#[derive(Debug, Serialize)]
pub struct PriceReport<'a> {
    pub prices: &'a [PriceRecord],
    pub currency: &'a str,
}

/// Table with one row per requested symbol, in request order. Symbols
/// missing from `records` are shown as unknown.
pub fn render_table(requested: &[String], records: &[PriceRecord], currency: &str) -> String {
    let by_symbol: HashMap<&str, &PriceRecord> =
        records.iter().map(|r| (r.symbol.as_str(), r)).collect();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell(&format!("Price ({currency})")),
        ui::header_cell("Change"),
        ui::header_cell("Change (%)"),
        ui::header_cell("Updated"),
    ]);

    for symbol in normalize_symbols(requested) {
        match by_symbol.get(symbol.as_str()) {
            Some(record) => table.add_row(vec![
                Cell::new(&record.symbol),
                ui::amount_cell(record.price),
                ui::change_cell(record.change, ""),
                ui::change_cell(record.change_percent, "%"),
                Cell::new(record.last_updated.format("%Y-%m-%d %H:%M:%S UTC")),
            ]),
            None => table.add_row(vec![
                Cell::new(&symbol),
                ui::unknown_cell(),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
            ]),
        };
    }

    table.to_string()
}

pub fn render_json(records: &[PriceRecord], currency: &str) -> Result<String> {
    let report = PriceReport {
        prices: records,
        currency,
    };
    serde_json::to_string_pretty(&report).context("Failed to serialize prices")
}

/// Runs one batch and prints it.
pub async fn run(service: &PriceService, symbols: &[String], json: bool) -> Result<()> {
    let spinner = ui::new_spinner("Fetching prices...");
    let result = service.get_prices(symbols).await;
    spinner.finish_and_clear();
    let records = result?;

    let currency = service.reporting_currency();
    if json {
        println!("{}", render_json(&records, currency)?);
    } else {
        println!("{}", render_table(symbols, &records, currency));
        let missing = normalize_symbols(symbols).len().saturating_sub(records.len());
        if missing > 0 {
            println!(
                "{}",
                ui::style_text(
                    &format!("{missing} symbol(s) could not be priced"),
                    ui::StyleType::Subtle
                )
            );
        }
    }
    Ok(())
}
