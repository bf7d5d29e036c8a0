use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{ArticleFetcher, MarketDataProvider, NewsSearchProvider};
use crate::news::{run_news_enricher, NewsTable};
use crate::scorer::{rank, recommend, RankerInputs};
use crate::screener::{run_screener, ScreenStats};
use crate::theme::{run_theme_analysis, ThemeAnalysis};
use crate::types::{yyyymmdd, EnrichmentGap, Instrument, ScoreRecord, Ticker};
use crate::valuation::{run_valuation, ValuationTable};

/// Collaborators for one run.
pub struct Providers<'a> {
    pub market: &'a dyn MarketDataProvider,
    pub news: &'a dyn NewsSearchProvider,
    pub articles: &'a dyn ArticleFetcher,
}

/// Every stage output of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(serialize_with = "serialize_date")]
    pub date: NaiveDate,
    pub screen_stats: ScreenStats,
    pub screened: Vec<Instrument>,
    pub themes: ThemeAnalysis,
    pub valuation: ValuationTable,
    pub news: NewsTable,
    pub ranked: Vec<ScoreRecord>,
    pub recommended: Vec<ScoreRecord>,
}

impl Report {
    /// Valuation gaps followed by news gaps.
    pub fn gaps(&self) -> impl Iterator<Item = &EnrichmentGap> {
        self.valuation.gaps.iter().chain(self.news.gaps.iter())
    }
}

fn serialize_date<S: serde::Serializer>(d: &NaiveDate, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&yyyymmdd(*d))
}

/// How a run ended. Only `Err` means the run failed.
#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing passed the screener.
    NoCandidates,
    /// Top-1 restriction left nobody.
    NoTopThemeMembers { sector: String },
    Completed(Box<Report>),
}

pub async fn run_pipeline(providers: &Providers<'_>, cfg: &Config, date: NaiveDate) -> Result<RunOutcome> {
    let (mut screened, screen_stats) = run_screener(providers.market, date, &cfg.screener).await?;
    if screened.is_empty() {
        info!(%date, "No instruments met the screening criteria");
        return Ok(RunOutcome::NoCandidates);
    }

    let themes = run_theme_analysis(providers.market, &screened, Some(date), &cfg.theme).await;

    if cfg.theme.only_top1_theme && !themes.ticker_sector.is_empty() {
        if let Some(top) = themes.top_sector() {
            screened.retain(|i| themes.ticker_sector.get(&i.ticker).map(String::as_str) == Some(top));
            info!(%date, sector = top, kept = screened.len(), "Restricted to the leading theme");
            if screened.is_empty() {
                return Ok(RunOutcome::NoTopThemeMembers {
                    sector: top.to_string(),
                });
            }
        }
    }

    let tickers: Vec<Ticker> = screened.iter().map(|i| i.ticker.clone()).collect();
    let valuation = run_valuation(
        providers.market,
        &tickers,
        date,
        Some(&themes.ticker_sector),
        &cfg.valuation,
    )
    .await?;

    let news = run_news_enricher(providers.news, providers.articles, &screened, Some(date), &cfg.news).await;

    let news_count = news.count_by_ticker();
    let sector_rank = themes.sector_rank();
    let labels = valuation.label_by_ticker();
    let ranked = rank(
        &RankerInputs {
            screened: &screened,
            news_count: &news_count,
            ticker_sector: &themes.ticker_sector,
            sector_rank: &sector_rank,
            valuation: &labels,
        },
        &cfg.ranker,
    );
    let recommended = recommend(&ranked, &cfg.recommend);
    info!(%date, ranked = ranked.len(), recommended = recommended.len(), "Pipeline complete");

    Ok(RunOutcome::Completed(Box::new(Report {
        date,
        screen_stats,
        screened,
        themes,
        valuation,
        news,
        ranked,
        recommended,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::fetcher::fake::{
        article, fundamental, sector_fact, snapshot_row, FakeArticles, FakeMarketData, FakeNewsSearch,
    };
    use crate::types::Grade;
    use std::collections::HashMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 26).unwrap()
    }

    fn market() -> FakeMarketData {
        FakeMarketData {
            snapshot: vec![
                snapshot_row("005930", "삼성전자", 15_000_000.0, 1_000e9, 2.5),
                snapshot_row("000660", "SK하이닉스", 3_000_000.0, 500e9, 4.0),
                snapshot_row("035720", "카카오", 2_000_000.0, 80e9, -1.0),
                snapshot_row("999999", "거래부진", 10_000.0, 1e8, 0.5),
            ],
            fundamentals: vec![
                fundamental("005930", Some(12.0), Some(1.1)),
                fundamental("000660", Some(20.0), Some(1.8)),
                fundamental("035720", Some(45.0), Some(2.2)),
            ],
            kospi_sectors: vec![
                sector_fact("005930", "전기전자"),
                sector_fact("000660", "전기전자"),
                sector_fact("035720", "서비스업"),
            ],
            ..Default::default()
        }
    }

    fn news() -> FakeNewsSearch {
        let day = "Mon, 26 Aug 2024 10:00:00 +0900";
        FakeNewsSearch {
            results: HashMap::from([
                (
                    "삼성전자 주가".to_string(),
                    vec![article("a", "https://n/1", day), article("b", "https://n/2", day)],
                ),
                ("SK하이닉스 주가".to_string(), vec![article("c", "https://n/3", day)]),
            ]),
            ..Default::default()
        }
    }

    fn cfg() -> Config {
        let mut cfg = Config::default();
        cfg.news.request_delay_ms = 0;
        cfg.news.article_request_delay_ms = 0;
        cfg.news.fetch_article_body = false;
        cfg
    }

    async fn run(market: &FakeMarketData, cfg: &Config) -> Result<RunOutcome> {
        let news = news();
        let articles = FakeArticles::default();
        let providers = Providers {
            market,
            news: &news,
            articles: &articles,
        };
        run_pipeline(&providers, cfg, date()).await
    }

    fn completed(outcome: RunOutcome) -> Report {
        match outcome {
            RunOutcome::Completed(r) => *r,
            other => panic!("expected a completed run, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn end_to_end_is_deterministic() {
        let m = market();
        let first = completed(run(&m, &cfg()).await.unwrap());
        let second = completed(run(&m, &cfg()).await.unwrap());

        let a = serde_json::to_string(&first.ranked).unwrap();
        let b = serde_json::to_string(&second.ranked).unwrap();
        assert_eq!(a, b);

        let order: Vec<_> = first.ranked.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, ["005930", "000660", "035720"]);
        let grades: Vec<_> = first.ranked.iter().map(|r| r.grade).collect();
        assert_eq!(grades, [Grade::A, Grade::C, Grade::E]);

        assert_eq!(first.screened.len(), 3);
        assert_eq!(first.themes.top_sector(), Some("전기전자"));
        assert_eq!(first.ranked[0].news_count, 2);
        assert_eq!(first.recommended.len(), 1);
    }

    #[tokio::test]
    async fn missing_fundamentals_degrade_to_neutral() {
        let mut m = market();
        m.fundamentals.retain(|f| f.ticker.as_str() != "035720");
        let report = completed(run(&m, &cfg()).await.unwrap());
        let kakao = report.ranked.iter().find(|r| r.ticker.as_str() == "035720").unwrap();
        assert_eq!(kakao.score_valuation, 50.0);
        assert_eq!(report.gaps().count(), 1);
    }

    #[tokio::test]
    async fn top1_restriction() {
        let mut c = cfg();
        c.theme.only_top1_theme = true;
        let report = completed(run(&market(), &c).await.unwrap());
        assert_eq!(report.ranked.len(), 2);
        assert!(report.ranked.iter().all(|r| r.sector == "전기전자"));
    }

    #[tokio::test]
    async fn empty_screen_is_not_an_error() {
        let mut m = market();
        m.snapshot.clear();
        assert!(matches!(run(&m, &cfg()).await.unwrap(), RunOutcome::NoCandidates));
    }

    #[tokio::test]
    async fn unreachable_snapshot_fails_the_run() {
        let mut m = market();
        m.fail_snapshot = true;
        assert!(matches!(run(&m, &cfg()).await, Err(AppError::DataUnavailable { .. })));
    }
}
