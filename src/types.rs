use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sector assigned to instruments the classification facts do not cover.
pub const UNCLASSIFIED_SECTOR: &str = "(unclassified)";

/// Score given when a component has no usable signal (join miss, flat batch).
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Width of a canonical instrument code.
pub const TICKER_WIDTH: usize = 6;

/// Format a date as the canonical `YYYYMMDD` key.
pub fn yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Fixed-width, zero-padded instrument code. Every join goes through this type,
/// so `"5930"` and `"005930"` always meet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        Self(format!("{trimmed:0>width$}", width = TICKER_WIDTH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Ticker::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Ticker::new(&s)
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> Self {
        t.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Provider facts
// ---------------------------------------------------------------------------

/// Market segment as understood by the market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSegment {
    All,
    Kospi,
    Kosdaq,
}

impl std::fmt::Display for MarketSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketSegment::All => "ALL",
            MarketSegment::Kospi => "KOSPI",
            MarketSegment::Kosdaq => "KOSDAQ",
        };
        write!(f, "{s}")
    }
}

/// One row of the full-market daily snapshot. Numeric fields are `None` when
/// the provider sent something non-numeric; the screener coerces them to zero.
#[derive(Debug, Clone, Default)]
pub struct SnapshotRow {
    pub ticker: Ticker,
    pub name: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub trading_value: Option<f64>,
    pub change_pct: Option<f64>,
}

impl Default for Ticker {
    fn default() -> Self {
        Ticker::new("")
    }
}

/// Per-instrument fundamental ratios for one date.
#[derive(Debug, Clone, Default)]
pub struct FundamentalRow {
    pub ticker: Ticker,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub eps: Option<f64>,
    pub bps: Option<f64>,
    pub dividend_yield: Option<f64>,
}

/// Instrument → sector-name fact from the classification provider.
#[derive(Debug, Clone)]
pub struct SectorFact {
    pub ticker: Ticker,
    pub sector: String,
}

/// Candidate article as returned by a news search provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Published date exactly as the source rendered it.
    pub pub_date: String,
}

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// An instrument that passed the screener. Immutable downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: Ticker,
    pub name: String,
    pub volume: f64,
    pub trading_value: f64,
    pub close: f64,
    pub change_pct: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub sector: String,
    pub count: usize,
    /// Sum of positive change-pct across members, or member count when
    /// momentum weighting is off.
    pub strength: f64,
    pub sample_tickers: Vec<Ticker>,
    /// 1 = strongest.
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationLabel {
    Undervalued,
    Fair,
    Overvalued,
    NotAvailable,
}

impl std::fmt::Display for ValuationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValuationLabel::Undervalued => "undervalued",
            ValuationLabel::Fair => "fair",
            ValuationLabel::Overvalued => "overvalued",
            ValuationLabel::NotAvailable => "n/a",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRecord {
    pub ticker: Ticker,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub eps: Option<f64>,
    pub bps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub label: ValuationLabel,
    /// Present only when a sector mapping was supplied.
    pub sector: Option<String>,
    pub sector_median_per: Option<f64>,
    pub sector_median_pbr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub ticker: Ticker,
    pub name: String,
    pub title: String,
    pub link: String,
    pub raw_date: String,
    #[serde(with = "serde_yyyymmdd")]
    pub date: Option<NaiveDate>,
    pub description: String,
    pub body_summary: String,
}

/// Six-level letter grade. Ordering follows quality: `A < B < ... < F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    /// Six equal bands over [0, 100].
    pub fn from_score(score: f64) -> Self {
        if score >= 100.0 * 5.0 / 6.0 {
            Grade::A
        } else if score >= 100.0 * 4.0 / 6.0 {
            Grade::B
        } else if score >= 100.0 * 3.0 / 6.0 {
            Grade::C
        } else if score >= 100.0 * 2.0 / 6.0 {
            Grade::D
        } else if score >= 100.0 / 6.0 {
            Grade::E
        } else {
            Grade::F
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub ticker: Ticker,
    pub name: String,
    pub volume: f64,
    pub trading_value: f64,
    pub change_pct: f64,
    pub sector: String,
    pub news_count: usize,
    pub theme_rank: usize,
    pub score_trading: f64,
    pub score_news: f64,
    pub score_theme: f64,
    pub score_valuation: f64,
    pub score_total: f64,
    pub grade: Grade,
}

// ---------------------------------------------------------------------------
// Enrichment gaps
// ---------------------------------------------------------------------------

/// A per-item enrichment failure. Degrades that item to a neutral or fallback
/// value and is reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentGap {
    pub ticker: Ticker,
    #[serde(flatten)]
    pub kind: GapKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapKind {
    MissingFundamentals,
    SearchFailed { reason: String },
    UnparseableDate { raw: String },
    ArticleUnavailable { url: String },
}

impl std::fmt::Display for GapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapKind::MissingFundamentals => write!(f, "missing_fundamentals"),
            GapKind::SearchFailed { reason } => write!(f, "search_failed ({reason})"),
            GapKind::UnparseableDate { raw } => write!(f, "unparseable_date ({raw:?})"),
            GapKind::ArticleUnavailable { url } => write!(f, "article_unavailable ({url})"),
        }
    }
}

/// Serialize an optional date as `"YYYYMMDD"` or `null`.
pub mod serde_yyyymmdd {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_str(&super::yyyymmdd(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            Some(s) => NaiveDate::parse_from_str(&s, "%Y%m%d")
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
