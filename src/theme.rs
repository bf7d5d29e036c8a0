use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ThemeConfig;
use crate::fetcher::MarketDataProvider;
use crate::types::{Instrument, MarketSegment, SectorFact, Theme, Ticker, UNCLASSIFIED_SECTOR};

/// Segments queried for classification, in first-seen-wins order.
pub const SECTOR_SEGMENTS: [MarketSegment; 2] = [MarketSegment::Kospi, MarketSegment::Kosdaq];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThemeAnalysis {
    /// Strongest first, at most `top_n_sectors` entries.
    pub themes: Vec<Theme>,
    /// Every screened instrument the classification covers.
    pub ticker_sector: BTreeMap<Ticker, String>,
}

impl ThemeAnalysis {
    pub fn sector_rank(&self) -> HashMap<String, usize> {
        self.themes.iter().map(|t| (t.sector.clone(), t.rank)).collect()
    }

    pub fn top_sector(&self) -> Option<&str> {
        self.themes.first().map(|t| t.sector.as_str())
    }
}

/// Union of the per-segment facts; the first segment to mention a ticker wins.
/// A segment that fails is skipped.
pub async fn fetch_sector_facts(provider: &dyn MarketDataProvider, date: NaiveDate) -> Vec<SectorFact> {
    let mut seen = HashSet::new();
    let mut facts = Vec::new();
    for segment in SECTOR_SEGMENTS {
        match provider.sector_classification(date, segment).await {
            Ok(rows) => {
                for fact in rows {
                    if seen.insert(fact.ticker.clone()) {
                        facts.push(fact);
                    }
                }
            }
            Err(e) => warn!(%segment, %date, "Sector classification failed, skipping segment: {e}"),
        }
    }
    facts
}

struct Group {
    sector: String,
    count: usize,
    positive_change: f64,
    samples: Vec<Ticker>,
}

pub fn aggregate_themes(screened: &[Instrument], facts: &[SectorFact], cfg: &ThemeConfig) -> ThemeAnalysis {
    let change: HashMap<&Ticker, f64> = screened.iter().map(|i| (&i.ticker, i.change_pct)).collect();

    let mut ticker_sector = BTreeMap::new();
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for fact in facts {
        let Some(&chg) = change.get(&fact.ticker) else {
            continue;
        };
        if ticker_sector.contains_key(&fact.ticker) {
            continue;
        }
        let sector = match fact.sector.trim() {
            "" => UNCLASSIFIED_SECTOR.to_string(),
            s => s.to_string(),
        };
        ticker_sector.insert(fact.ticker.clone(), sector.clone());

        let slot = *index.entry(sector.clone()).or_insert_with(|| {
            groups.push(Group {
                sector,
                count: 0,
                positive_change: 0.0,
                samples: Vec::new(),
            });
            groups.len() - 1
        });
        let g = &mut groups[slot];
        g.count += 1;
        g.positive_change += chg.max(0.0);
        if g.samples.len() < 2 {
            g.samples.push(fact.ticker.clone());
        }
    }

    let mut themes: Vec<Theme> = groups
        .into_iter()
        .map(|g| Theme {
            strength: if cfg.weight_by_change_pct {
                g.positive_change
            } else {
                g.count as f64
            },
            sector: g.sector,
            count: g.count,
            sample_tickers: g.samples,
            rank: 0,
        })
        .collect();
    themes.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    themes.truncate(cfg.top_n_sectors);
    for (i, t) in themes.iter_mut().enumerate() {
        t.rank = i + 1;
    }

    ThemeAnalysis { themes, ticker_sector }
}

pub async fn run_theme_analysis(
    provider: &dyn MarketDataProvider,
    screened: &[Instrument],
    date: Option<NaiveDate>,
    cfg: &ThemeConfig,
) -> ThemeAnalysis {
    let Some(date) = date else {
        return ThemeAnalysis::default();
    };
    if screened.is_empty() {
        return ThemeAnalysis::default();
    }
    let facts = fetch_sector_facts(provider, date).await;
    if facts.is_empty() {
        warn!(%date, "No sector classification available");
        return ThemeAnalysis::default();
    }

    let analysis = aggregate_themes(screened, &facts, cfg);
    info!(
        %date,
        sectors = analysis.themes.len(),
        mapped = analysis.ticker_sector.len(),
        top = analysis.top_sector().unwrap_or("-"),
        "Theme analysis finished"
    );
    analysis
}
