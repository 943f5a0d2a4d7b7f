use super::ui;
use crate::core::PriceService;
use anyhow::{Context, Result};
use tracing::info;

pub async fn clear(service: &PriceService) -> Result<()> {
    service
        .clear_cache()
        .await
        .context("Failed to clear cache")?;
    info!("Cleared cached quotes and exchange rates");
    println!("{}", ui::style_text("Cache cleared", ui::StyleType::Subtle));
    Ok(())
}
