//! News enrichment: search per instrument, date-filter, summarize.

pub mod date;
pub mod extract;

use std::collections::HashMap;

use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::NewsConfig;
use crate::fetcher::{ArticleFetcher, NewsSearchProvider};
use crate::types::{EnrichmentGap, GapKind, Instrument, NewsItem, RawArticle, Ticker};

use self::date::{is_invalid_date, parse_published_date, within_tolerance};
use self::extract::{strip_highlight, truncate_chars};

/// Summary used when neither a body nor a description is available.
pub const NO_SUMMARY: &str = "(no summary)";

/// Date-filter counters, summed over the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NewsStats {
    pub candidates: usize,
    pub parse_failures: usize,
    pub date_mismatches: usize,
    pub kept: usize,
}

impl NewsStats {
    fn absorb(&mut self, other: NewsStats) {
        self.candidates += other.candidates;
        self.parse_failures += other.parse_failures;
        self.date_mismatches += other.date_mismatches;
        self.kept += other.kept;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewsTable {
    /// Grouped by instrument in screened order, search order within.
    pub items: Vec<NewsItem>,
    pub gaps: Vec<EnrichmentGap>,
    pub stats: NewsStats,
}

impl NewsTable {
    pub fn count_by_ticker(&self) -> HashMap<Ticker, usize> {
        let mut counts = HashMap::new();
        for item in &self.items {
            *counts.entry(item.ticker.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Default)]
struct InstrumentNews {
    items: Vec<NewsItem>,
    gaps: Vec<EnrichmentGap>,
    stats: NewsStats,
}

pub fn search_query(inst: &Instrument) -> String {
    let name = inst.name.trim();
    let name = if name.is_empty() { inst.ticker.as_str() } else { name };
    format!("{name} 주가")
}

fn summarize(body: &str, description: &str, max_chars: usize) -> String {
    if !body.trim().is_empty() {
        truncate_chars(body.trim(), max_chars)
    } else if !description.trim().is_empty() {
        description.trim().chars().take(max_chars).collect()
    } else {
        NO_SUMMARY.to_string()
    }
}

/// Keep-or-drop for one candidate plus its parsed date. `None` drops it.
fn date_decision(
    raw: &RawArticle,
    target: Option<NaiveDate>,
    cfg: &NewsConfig,
    out: &mut InstrumentNews,
    ticker: &Ticker,
) -> Option<Option<NaiveDate>> {
    let parsed = parse_published_date(&raw.pub_date);
    if parsed.is_none() {
        out.gaps.push(EnrichmentGap {
            ticker: ticker.clone(),
            kind: GapKind::UnparseableDate {
                raw: raw.pub_date.clone(),
            },
        });
    }

    let Some(target) = target.filter(|_| cfg.filter_by_target_date) else {
        return Some(parsed);
    };
    out.stats.candidates += 1;
    match parsed {
        None if is_invalid_date(&raw.pub_date) => {
            out.stats.date_mismatches += 1;
            None
        }
        None => {
            out.stats.parse_failures += 1;
            cfg.parse_fail_keep.then_some(None)
        }
        Some(d) if within_tolerance(d, target, cfg.target_date_tolerance_days) => Some(Some(d)),
        Some(_) => {
            out.stats.date_mismatches += 1;
            None
        }
    }
}

async fn enrich_one(
    search: &dyn NewsSearchProvider,
    fetcher: &dyn ArticleFetcher,
    inst: &Instrument,
    target: Option<NaiveDate>,
    cfg: &NewsConfig,
) -> InstrumentNews {
    let mut out = InstrumentNews::default();
    let query = search_query(inst);
    let candidates = match search.search(&query, cfg.max_articles_per_stock).await {
        Ok(c) => c,
        Err(e) => {
            warn!(ticker = %inst.ticker, "News search failed: {e}");
            out.gaps.push(EnrichmentGap {
                ticker: inst.ticker.clone(),
                kind: GapKind::SearchFailed { reason: e.to_string() },
            });
            return out;
        }
    };

    for (idx, raw) in candidates.iter().take(cfg.max_articles_per_stock).enumerate() {
        let Some(date) = date_decision(raw, target, cfg, &mut out, &inst.ticker) else {
            continue;
        };

        let mut body = String::new();
        if cfg.fetch_article_body && idx < cfg.max_articles_fetch_body && !raw.link.is_empty() {
            body = fetcher.fetch_body(&raw.link).await;
            if body.is_empty() {
                debug!(ticker = %inst.ticker, url = %raw.link, "No article body, using description");
                out.gaps.push(EnrichmentGap {
                    ticker: inst.ticker.clone(),
                    kind: GapKind::ArticleUnavailable { url: raw.link.clone() },
                });
            }
        }

        let description = strip_highlight(&raw.description);
        out.items.push(NewsItem {
            ticker: inst.ticker.clone(),
            name: inst.name.clone(),
            title: strip_highlight(&raw.title),
            link: raw.link.clone(),
            raw_date: raw.pub_date.clone(),
            date,
            body_summary: summarize(&body, &description, cfg.summary_max_chars),
            description,
        });
    }
    out.stats.kept = out.items.len();
    out
}

/// Collect news for every screened instrument.
///
/// Instruments are processed `cfg.concurrency` at a time; results are put
/// back into screened order before returning.
pub async fn run_news_enricher(
    search: &dyn NewsSearchProvider,
    fetcher: &dyn ArticleFetcher,
    screened: &[Instrument],
    target: Option<NaiveDate>,
    cfg: &NewsConfig,
) -> NewsTable {
    let mut results: Vec<(usize, InstrumentNews)> = stream::iter(screened.iter().enumerate())
        .map(|(i, inst)| async move { (i, enrich_one(search, fetcher, inst, target, cfg).await) })
        .buffer_unordered(cfg.concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(i, _)| *i);

    let mut table = NewsTable::default();
    for (_, r) in results {
        table.items.extend(r.items);
        table.gaps.extend(r.gaps);
        table.stats.absorb(r.stats);
    }

    let s = table.stats;
    if cfg.debug {
        info!(
            candidates = s.candidates,
            parse_failures = s.parse_failures,
            date_mismatches = s.date_mismatches,
            "News date filter"
        );
    } else {
        debug!(
            candidates = s.candidates,
            parse_failures = s.parse_failures,
            date_mismatches = s.date_mismatches,
            "News date filter"
        );
    }
    info!(
        instruments = screened.len(),
        items = table.items.len(),
        gaps = table.gaps.len(),
        "News enrichment finished"
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::fake::{article, FakeArticles, FakeNewsSearch};
    use std::sync::atomic::Ordering;

    fn inst(ticker: &str, name: &str) -> Instrument {
        Instrument {
            ticker: Ticker::new(ticker),
            name: name.to_string(),
            volume: 2e6,
            trading_value: 20e9,
            close: 1000.0,
            change_pct: 1.0,
            open: None,
            high: None,
            low: None,
        }
    }

    fn target() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 8, 26)
    }

    fn cfg() -> NewsConfig {
        NewsConfig {
            request_delay_ms: 0,
            article_request_delay_ms: 0,
            ..Default::default()
        }
    }

    fn search_with(query: &str, articles: Vec<RawArticle>) -> FakeNewsSearch {
        FakeNewsSearch {
            results: HashMap::from([(query.to_string(), articles)]),
            ..Default::default()
        }
    }

    #[test]
    fn query_falls_back_to_ticker() {
        assert_eq!(search_query(&inst("5930", "삼성전자")), "삼성전자 주가");
        assert_eq!(search_query(&inst("5930", " ")), "005930 주가");
    }

    #[test]
    fn summary_fallbacks() {
        assert_eq!(summarize("본문", "설명", 300), "본문");
        assert_eq!(summarize("", "설명", 300), "설명");
        assert_eq!(summarize(" ", "", 300), NO_SUMMARY);
        assert_eq!(summarize(&"가".repeat(10), "", 4), "가가가가...");
        assert_eq!(summarize("", &"설".repeat(10), 4), "설설설설");
    }

    #[tokio::test]
    async fn date_filter_keeps_target_and_unparseable() {
        let search = search_with(
            "삼성전자 주가",
            vec![
                article("<b>삼성전자</b> 오늘", "https://n/1", "Mon, 26 Aug 2024 09:00:00 +0900"),
                article("어제 기사", "https://n/2", "2024.08.25."),
                article("시간 모름", "https://n/3", "3시간 전"),
            ],
        );
        let fetcher = FakeArticles::default();
        let mut c = cfg();
        c.fetch_article_body = false;
        let table = run_news_enricher(&search, &fetcher, &[inst("005930", "삼성전자")], target(), &c).await;

        let titles: Vec<_> = table.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["삼성전자 오늘", "시간 모름"]);
        assert_eq!(table.items[0].date, target());
        assert_eq!(table.items[1].date, None);
        assert_eq!(
            table.stats,
            NewsStats { candidates: 3, parse_failures: 1, date_mismatches: 1, kept: 2 }
        );
        assert!(table
            .gaps
            .iter()
            .any(|g| matches!(&g.kind, GapKind::UnparseableDate { raw } if raw == "3시간 전")));
    }

    #[tokio::test]
    async fn tolerance_and_parse_fail_drop() {
        let search = search_with(
            "카카오 주가",
            vec![
                article("어제 기사", "https://n/2", "2024.08.25."),
                article("시간 모름", "https://n/3", "3시간 전"),
            ],
        );
        let fetcher = FakeArticles::default();
        let mut c = cfg();
        c.fetch_article_body = false;
        c.target_date_tolerance_days = 1;
        c.parse_fail_keep = false;
        let table = run_news_enricher(&search, &fetcher, &[inst("035720", "카카오")], target(), &c).await;
        assert_eq!(table.items.len(), 1);
        assert_eq!(table.items[0].title, "어제 기사");
    }

    #[tokio::test]
    async fn impossible_calendar_date_is_a_mismatch() {
        let search = search_with(
            "카카오 주가",
            vec![
                article("깨진 날짜", "https://n/1", "2024.13.45."),
                article("시간 모름", "https://n/2", "3시간 전"),
            ],
        );
        let fetcher = FakeArticles::default();
        let mut c = cfg();
        c.fetch_article_body = false;
        assert!(c.parse_fail_keep);
        let table = run_news_enricher(&search, &fetcher, &[inst("035720", "카카오")], target(), &c).await;
        assert_eq!(table.items.len(), 1);
        assert_eq!(table.items[0].title, "시간 모름");
        assert_eq!(table.stats.date_mismatches, 1);
        assert_eq!(table.stats.parse_failures, 1);
    }

    #[tokio::test]
    async fn no_target_date_keeps_everything() {
        let search = search_with("카카오 주가", vec![article("옛날 기사", "https://n/1", "2020.01.02.")]);
        let fetcher = FakeArticles::default();
        let mut c = cfg();
        c.fetch_article_body = false;
        let table = run_news_enricher(&search, &fetcher, &[inst("035720", "카카오")], None, &c).await;
        assert_eq!(table.items.len(), 1);
        assert_eq!(table.stats.candidates, 0);
    }

    #[tokio::test]
    async fn bodies_fetched_for_leading_candidates_only() {
        let articles: Vec<_> = (0..4)
            .map(|i| article(&format!("기사 {i}"), &format!("https://n/{i}"), "2024.08.26."))
            .collect();
        let search = search_with("삼성전자 주가", articles);
        let fetcher = FakeArticles {
            bodies: HashMap::from([("https://n/0".to_string(), "본문 ".repeat(200))]),
            ..Default::default()
        };
        let mut c = cfg();
        c.max_articles_fetch_body = 2;
        let table = run_news_enricher(&search, &fetcher, &[inst("005930", "삼성전자")], target(), &c).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(table.items[0].body_summary.ends_with("..."));
        assert_eq!(table.items[0].body_summary.chars().count(), 303);
        assert_eq!(table.items[1].body_summary, "기사 1 요약");
        assert_eq!(table.items[3].body_summary, "기사 3 요약");
        let unavailable = table
            .gaps
            .iter()
            .filter(|g| matches!(g.kind, GapKind::ArticleUnavailable { .. }))
            .count();
        assert_eq!(unavailable, 1);
    }

    #[tokio::test]
    async fn search_failure_is_a_gap_and_order_is_screened_order() {
        let mut search = FakeNewsSearch::default();
        search.results.insert("B 주가".to_string(), vec![article("B news", "https://n/b", "2024.08.26.")]);
        search.results.insert("C 주가".to_string(), vec![article("C news", "https://n/c", "2024.08.26.")]);
        search.failing.push("A 주가".to_string());
        let fetcher = FakeArticles::default();
        let mut c = cfg();
        c.fetch_article_body = false;
        c.concurrency = 3;
        let screened = [inst("1", "A"), inst("3", "C"), inst("2", "B")];
        let table = run_news_enricher(&search, &fetcher, &screened, target(), &c).await;

        let order: Vec<_> = table.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(order, ["C news", "B news"]);
        assert!(matches!(table.gaps[0].kind, GapKind::SearchFailed { .. }));
        let counts = table.count_by_ticker();
        assert_eq!(counts.get(&Ticker::new("1")), None);
        assert_eq!(counts[&Ticker::new("3")], 1);
    }
}
