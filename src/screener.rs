use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::config::ScreenerConfig;
use crate::error::{AppError, Result};
use crate::fetcher::MarketDataProvider;
use crate::types::{Instrument, SnapshotRow};

/// Counts behind one screening pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScreenStats {
    pub total: usize,
    pub passed_volume_value: usize,
    /// Passed only through the limit-up rule.
    pub passed_limit_up_only: usize,
    pub rejected: usize,
}

fn finite_or_zero(x: Option<f64>) -> f64 {
    x.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Select instruments with anomalous activity, strongest trading value first.
pub fn screen(rows: &[SnapshotRow], cfg: &ScreenerConfig) -> (Vec<Instrument>, ScreenStats) {
    let mut stats = ScreenStats {
        total: rows.len(),
        ..Default::default()
    };
    let min_volume = cfg.min_volume as f64;
    let min_value = cfg.min_trading_value as f64;

    let mut out = Vec::new();
    for row in rows {
        let volume = finite_or_zero(row.volume);
        let value = finite_or_zero(row.trading_value);
        let change = finite_or_zero(row.change_pct);

        let activity = volume >= min_volume && value >= min_value;
        let limit_up = cfg.include_limit_up && change >= cfg.limit_up_change_pct;
        match (activity, limit_up) {
            (true, _) => stats.passed_volume_value += 1,
            (false, true) => stats.passed_limit_up_only += 1,
            (false, false) => {
                stats.rejected += 1;
                continue;
            }
        }

        out.push(Instrument {
            ticker: row.ticker.clone(),
            name: row.name.clone(),
            volume,
            trading_value: value,
            close: finite_or_zero(row.close),
            change_pct: change,
            open: row.open,
            high: row.high,
            low: row.low,
        });
    }

    // Vec::sort_by is stable; equal values keep snapshot order.
    out.sort_by(|a, b| b.trading_value.total_cmp(&a.trading_value));
    (out, stats)
}

pub async fn run_screener(
    provider: &dyn MarketDataProvider,
    date: NaiveDate,
    cfg: &ScreenerConfig,
) -> Result<(Vec<Instrument>, ScreenStats)> {
    let rows = provider
        .daily_snapshot(date)
        .await
        .map_err(|e| AppError::data_unavailable(date, e))?;

    let (screened, stats) = screen(&rows, cfg);
    info!(
        %date,
        total = stats.total,
        passed_volume_value = stats.passed_volume_value,
        passed_limit_up_only = stats.passed_limit_up_only,
        rejected = stats.rejected,
        "Screener finished: {} instruments selected",
        screened.len()
    );
    Ok((screened, stats))
}
