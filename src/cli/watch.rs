use super::{prices, ui};
use crate::core::PriceService;
use anyhow::{Result, bail};
use chrono::Local;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

/// Re-runs the batch every `every` until Ctrl-C.
pub async fn run(service: &PriceService, symbols: &[String], every: Duration) -> Result<()> {
    if every.is_zero() {
        bail!("Refresh interval must be greater than zero");
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(every_secs = every.as_secs(), "Watching prices");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let heading = format!("Prices at {}", Local::now().format("%H:%M:%S"));
                println!("\n{}", ui::style_text(&heading, ui::StyleType::Title));
                if let Err(e) = prices::run(service, symbols, false).await {
                    warn!(error = %e, "Refresh failed");
                    println!("{}", ui::style_text(&e.to_string(), ui::StyleType::Error));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
        }
    }
}
