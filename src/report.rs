use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::pipeline::Report;
use crate::types::{yyyymmdd, EnrichmentGap};

const CONSOLE_RANKED_ROWS: usize = 20;
const CONSOLE_THEME_ROWS: usize = 10;
const CONSOLE_UNDERVALUED_ROWS: usize = 15;
const CONSOLE_NEWS_ROWS: usize = 10;

pub trait ReportSink {
    fn emit(&self, report: &Report) -> Result<()>;
}

/// Summary through the log.
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn emit(&self, report: &Report) -> Result<()> {
        let date = yyyymmdd(report.date);
        info!("==================== {date} ====================");
        info!(
            "[SCREEN] {} of {} instruments (volume/value {}, limit-up only {})",
            report.screened.len(),
            report.screen_stats.total,
            report.screen_stats.passed_volume_value,
            report.screen_stats.passed_limit_up_only,
        );

        for t in report.themes.themes.iter().take(CONSOLE_THEME_ROWS) {
            let samples: Vec<&str> = t.sample_tickers.iter().map(|s| s.as_str()).collect();
            info!(
                "[THEME] #{:<2} {:<16} members={:<3} strength={:>7.2} samples={}",
                t.rank,
                t.sector,
                t.count,
                t.strength,
                samples.join(",")
            );
        }

        for v in report.valuation.undervalued().take(CONSOLE_UNDERVALUED_ROWS) {
            info!(
                "[VALUE] {} per={} pbr={} sector={}",
                v.ticker,
                fmt_ratio(v.per),
                fmt_ratio(v.pbr),
                v.sector.as_deref().unwrap_or("-"),
            );
        }

        let mut counts: Vec<(&str, usize)> = Vec::new();
        for r in report.ranked.iter().filter(|r| r.news_count > 0) {
            counts.push((r.name.as_str(), r.news_count));
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        for (name, n) in counts.into_iter().take(CONSOLE_NEWS_ROWS) {
            info!("[NEWS] {name}: {n}");
        }

        for r in report.ranked.iter().take(CONSOLE_RANKED_ROWS) {
            info!(
                "[RANK] {} {} {:<12} total={:>6.2} trading={:>6.2} news={:>6.2} theme={:>6.2} value={:>6.2}",
                r.grade,
                r.ticker,
                r.name,
                r.score_total,
                r.score_trading,
                r.score_news,
                r.score_theme,
                r.score_valuation,
            );
        }
        info!("[RECOMMEND] {} instruments", report.recommended.len());

        let gaps = report.gaps().count();
        if gaps > 0 {
            info!("[GAPS] {gaps} enrichment gaps (see gaps.json)");
        }
        Ok(())
    }
}

fn fmt_ratio(x: Option<f64>) -> String {
    x.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

/// Stage tables as pretty JSON under `<root>/<YYYYMMDD>/`.
pub struct JsonFileSink {
    root: PathBuf,
}

impl JsonFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir_for(&self, report: &Report) -> PathBuf {
        self.root.join(yyyymmdd(report.date))
    }
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let mut w = BufWriter::new(File::create(dir.join(name))?);
    serde_json::to_writer_pretty(&mut w, value)?;
    w.flush()?;
    Ok(())
}

impl ReportSink for JsonFileSink {
    fn emit(&self, report: &Report) -> Result<()> {
        let dir = self.dir_for(report);
        fs::create_dir_all(&dir)?;

        let gaps: Vec<&EnrichmentGap> = report.gaps().collect();
        write_json(&dir, "screened.json", &report.screened)?;
        write_json(&dir, "themes.json", &report.themes)?;
        write_json(&dir, "valuation.json", &report.valuation.records)?;
        write_json(&dir, "news.json", &report.news.items)?;
        write_json(&dir, "ranked.json", &report.ranked)?;
        write_json(&dir, "recommended.json", &report.recommended)?;
        write_json(&dir, "gaps.json", &gaps)?;

        info!(dir = %dir.display(), "Report files written");
        Ok(())
    }
}
