use std::collections::{BTreeMap, HashMap};

use tracing::info;

use crate::config::{RankerConfig, RecommendConfig};
use crate::types::{Grade, Instrument, ScoreRecord, Ticker, ValuationLabel, NEUTRAL_SCORE, UNCLASSIFIED_SECTOR};

/// Everything the ranker joins against, keyed by canonical ticker.
pub struct RankerInputs<'a> {
    pub screened: &'a [Instrument],
    pub news_count: &'a HashMap<Ticker, usize>,
    pub ticker_sector: &'a BTreeMap<Ticker, String>,
    pub sector_rank: &'a HashMap<String, usize>,
    pub valuation: &'a HashMap<Ticker, ValuationLabel>,
}

/// Min-max scale to [0, 100]. A constant batch scores `NEUTRAL_SCORE` throughout.
pub fn normalize(raw: &[f64]) -> Vec<f64> {
    let lo = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi <= lo {
        return vec![NEUTRAL_SCORE; raw.len()];
    }
    raw.iter()
        .map(|x| ((x - lo) / (hi - lo) * 100.0).clamp(0.0, 100.0))
        .collect()
}

/// Rank 1 scores 100, ranks at or past `max_rank + 1` score 0. Members of a
/// rank ≤ 3 sector get `bonus` on top, capped at 100.
pub fn theme_score(rank: usize, max_rank: usize, bonus: f64) -> f64 {
    let steps = rank.saturating_sub(1) as f64;
    let base = (100.0 - steps / max_rank.max(1) as f64 * 100.0).clamp(0.0, 100.0);
    if bonus > 0.0 && rank <= 3 {
        (base + bonus).min(100.0)
    } else {
        base
    }
}

pub fn valuation_score(label: Option<ValuationLabel>) -> f64 {
    match label {
        Some(ValuationLabel::Undervalued) => 100.0,
        Some(ValuationLabel::Overvalued) => 0.0,
        Some(ValuationLabel::Fair) | Some(ValuationLabel::NotAvailable) | None => NEUTRAL_SCORE,
    }
}

/// Score and grade every screened instrument, best first. Ties keep screened order.
pub fn rank(inputs: &RankerInputs<'_>, cfg: &RankerConfig) -> Vec<ScoreRecord> {
    let screened = inputs.screened;

    let trading_raw: Vec<f64> = screened
        .iter()
        .map(|i| i.trading_value / 1e9 + i.volume / 1e6)
        .collect();
    let counts: Vec<usize> = screened
        .iter()
        .map(|i| inputs.news_count.get(&i.ticker).copied().unwrap_or(0))
        .collect();
    let news_raw: Vec<f64> = counts.iter().map(|c| *c as f64).collect();
    let score_trading = normalize(&trading_raw);
    let score_news = normalize(&news_raw);

    let max_rank = inputs.sector_rank.values().copied().max().unwrap_or(1);

    let mut records: Vec<ScoreRecord> = screened
        .iter()
        .enumerate()
        .map(|(idx, inst)| {
            let sector = inputs.ticker_sector.get(&inst.ticker);
            let theme_rank = sector
                .and_then(|s| inputs.sector_rank.get(s))
                .copied()
                .unwrap_or(max_rank + 1);
            let score_theme = theme_score(theme_rank, max_rank, cfg.theme_top_bonus);
            let score_valuation = valuation_score(inputs.valuation.get(&inst.ticker).copied());

            let score_total = score_trading[idx] * cfg.weight_trading
                + score_news[idx] * cfg.weight_news
                + score_theme * cfg.weight_theme
                + score_valuation * cfg.weight_valuation;

            ScoreRecord {
                ticker: inst.ticker.clone(),
                name: inst.name.clone(),
                volume: inst.volume,
                trading_value: inst.trading_value,
                change_pct: inst.change_pct,
                sector: sector.cloned().unwrap_or_else(|| UNCLASSIFIED_SECTOR.to_string()),
                news_count: counts[idx],
                theme_rank,
                score_trading: score_trading[idx],
                score_news: score_news[idx],
                score_theme,
                score_valuation,
                score_total,
                grade: Grade::from_score(score_total),
            }
        })
        .collect();

    records.sort_by(|a, b| b.score_total.total_cmp(&a.score_total));
    info!(
        ranked = records.len(),
        a = records.iter().filter(|r| r.grade == Grade::A).count(),
        b = records.iter().filter(|r| r.grade == Grade::B).count(),
        "Ranking finished"
    );
    records
}

/// Rows graded `min_grade` or better, best first, at most `max_count`.
pub fn recommend(ranked: &[ScoreRecord], cfg: &RecommendConfig) -> Vec<ScoreRecord> {
    let mut picks: Vec<ScoreRecord> = ranked
        .iter()
        .filter(|r| r.grade <= cfg.min_grade)
        .cloned()
        .collect();
    picks.sort_by(|a, b| b.score_total.total_cmp(&a.score_total));
    picks.truncate(cfg.max_count);
    picks
}
