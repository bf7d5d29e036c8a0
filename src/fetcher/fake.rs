//! In-memory collaborators for stage and pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::types::{FundamentalRow, MarketSegment, RawArticle, SectorFact, SnapshotRow, Ticker};

use super::{ArticleFetcher, MarketDataProvider, NewsSearchProvider};

fn offline(what: &str) -> AppError {
    AppError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, what.to_string()))
}

#[derive(Default)]
pub struct FakeMarketData {
    pub snapshot: Vec<SnapshotRow>,
    pub fundamentals: Vec<FundamentalRow>,
    pub kospi_sectors: Vec<SectorFact>,
    pub kosdaq_sectors: Vec<SectorFact>,
    pub fail_snapshot: bool,
    pub fail_fundamentals: bool,
    pub fail_segment: Option<MarketSegment>,
    pub fundamentals_calls: AtomicUsize,
}

#[async_trait]
impl MarketDataProvider for FakeMarketData {
    async fn daily_snapshot(&self, _date: NaiveDate) -> Result<Vec<SnapshotRow>> {
        if self.fail_snapshot {
            return Err(offline("snapshot offline"));
        }
        Ok(self.snapshot.clone())
    }

    async fn fundamentals(&self, _date: NaiveDate) -> Result<Vec<FundamentalRow>> {
        self.fundamentals_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fundamentals {
            return Err(offline("fundamentals offline"));
        }
        Ok(self.fundamentals.clone())
    }

    async fn sector_classification(
        &self,
        _date: NaiveDate,
        segment: MarketSegment,
    ) -> Result<Vec<SectorFact>> {
        if self.fail_segment == Some(segment) {
            return Err(offline(&format!("{segment} offline")));
        }
        Ok(match segment {
            MarketSegment::Kospi => self.kospi_sectors.clone(),
            MarketSegment::Kosdaq => self.kosdaq_sectors.clone(),
            MarketSegment::All => Vec::new(),
        })
    }
}

/// Search results keyed by exact query. Queries listed in `failing` error out.
#[derive(Default)]
pub struct FakeNewsSearch {
    pub results: HashMap<String, Vec<RawArticle>>,
    pub failing: Vec<String>,
}

#[async_trait]
impl NewsSearchProvider for FakeNewsSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawArticle>> {
        if self.failing.iter().any(|q| q == query) {
            return Err(offline("search offline"));
        }
        Ok(self
            .results
            .get(query)
            .map(|v| v.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Bodies keyed by URL; unknown URLs yield an empty body.
#[derive(Default)]
pub struct FakeArticles {
    pub bodies: HashMap<String, String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ArticleFetcher for FakeArticles {
    async fn fetch_body(&self, url: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies.get(url).cloned().unwrap_or_default()
    }
}

pub fn snapshot_row(ticker: &str, name: &str, volume: f64, value: f64, change: f64) -> SnapshotRow {
    SnapshotRow {
        ticker: Ticker::new(ticker),
        name: name.to_string(),
        close: Some(10_000.0),
        volume: Some(volume),
        trading_value: Some(value),
        change_pct: Some(change),
        ..Default::default()
    }
}

pub fn sector_fact(ticker: &str, sector: &str) -> SectorFact {
    SectorFact {
        ticker: Ticker::new(ticker),
        sector: sector.to_string(),
    }
}

pub fn fundamental(ticker: &str, per: Option<f64>, pbr: Option<f64>) -> FundamentalRow {
    FundamentalRow {
        ticker: Ticker::new(ticker),
        per,
        pbr,
        ..Default::default()
    }
}

pub fn article(title: &str, link: &str, pub_date: &str) -> RawArticle {
    RawArticle {
        title: title.to_string(),
        link: link.to_string(),
        description: format!("{title} 요약"),
        pub_date: pub_date.to_string(),
    }
}
