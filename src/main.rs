mod config;
mod error;
mod fetcher;
mod news;
mod pipeline;
mod report;
mod scorer;
mod screener;
mod theme;
mod types;
mod valuation;

use std::path::PathBuf;

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::{HtmlArticleFetcher, KrxClient, NaverNewsClient};
use crate::pipeline::{run_pipeline, Providers, RunOutcome};
use crate::report::{ConsoleSink, JsonFileSink, ReportSink};

/// Daily KOSPI/KOSDAQ screener: volume/value filter, theme, valuation and news, A-F ranking.
#[derive(Debug, Parser)]
#[command(name = "screener", version)]
struct Cli {
    /// Target date, YYYY-MM-DD or YYYYMMDD. Defaults to the latest weekday before today.
    #[arg(long)]
    date: Option<String>,

    /// Console summary only; skip the JSON files.
    #[arg(long)]
    no_save: bool,

    /// YAML config file (overrides SCREENER_CONFIG and config/config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let date = match resolve_target_date(cli.date.as_deref(), Local::now().date_naive()) {
        Ok(d) => d,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cfg, date, !cli.no_save).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, date: NaiveDate, save: bool) -> Result<()> {
    info!(%date, "Starting screener run");

    let market = KrxClient::new(&cfg)?;
    let news = NaverNewsClient::new(&cfg)?;
    let articles = HtmlArticleFetcher::new(&cfg)?;
    let providers = Providers {
        market: &market,
        news: &news,
        articles: &articles,
    };

    let report = match run_pipeline(&providers, &cfg, date).await? {
        RunOutcome::NoCandidates => {
            info!(%date, "No instruments qualified; nothing to report");
            return Ok(());
        }
        RunOutcome::NoTopThemeMembers { sector } => {
            info!(%date, %sector, "No instruments in the leading theme; nothing to report");
            return Ok(());
        }
        RunOutcome::Completed(report) => report,
    };

    ConsoleSink.emit(&report)?;
    if save && cfg.output.save_json {
        JsonFileSink::new(&cfg.output.dir).emit(&report)?;
    }
    Ok(())
}

/// `--date` if given, else yesterday walked back to a weekday.
fn resolve_target_date(arg: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match arg {
        Some(raw) => {
            let digits: String = raw.trim().chars().filter(|c| *c != '-').collect();
            if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(AppError::Config(format!(
                    "--date must be YYYY-MM-DD or YYYYMMDD, got {raw:?}"
                )));
            }
            NaiveDate::parse_from_str(&digits, "%Y%m%d")
                .map_err(|_| AppError::Config(format!("--date {raw:?} is not a calendar date")))
        }
        None => {
            let mut d = today - Duration::days(1);
            while matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
                d -= Duration::days(1);
            }
            Ok(d)
        }
    }
}
