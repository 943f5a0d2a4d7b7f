use crate::core::ExchangeRateService;
use anyhow::{Result, bail};

/// Prints the rate from `currency` into the reporting currency.
pub async fn run(rates: &ExchangeRateService, currency: &str) -> Result<()> {
    let currency = currency.trim().to_uppercase();
    if currency.is_empty() {
        bail!("No currency provided");
    }
    let rate = rates.rate_to_reporting(&currency).await;
    println!("1 {currency} = {rate:.6} {}", rates.reporting_currency());
    Ok(())
}
