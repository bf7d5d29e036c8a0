//! Collaborator seams: market data, news search and article bodies.
//!
//! Stages only see these traits; the concrete HTTP clients live in the
//! submodules and the tests swap in the in-memory fakes.

pub mod article;
pub mod krx;
pub mod naver;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{FundamentalRow, MarketSegment, RawArticle, SectorFact, SnapshotRow};

pub use article::HtmlArticleFetcher;
pub use krx::KrxClient;
pub use naver::NaverNewsClient;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Whole-market OHLCV plus change-pct. Empty when the date had no trading.
    async fn daily_snapshot(&self, date: NaiveDate) -> Result<Vec<SnapshotRow>>;

    /// Whole-market P/E, P/B and related ratios.
    async fn fundamentals(&self, date: NaiveDate) -> Result<Vec<FundamentalRow>>;

    async fn sector_classification(
        &self,
        date: NaiveDate,
        segment: MarketSegment,
    ) -> Result<Vec<SectorFact>>;
}

#[async_trait]
pub trait NewsSearchProvider: Send + Sync {
    /// At most `limit` candidates. An empty list is a normal answer.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawArticle>>;
}

#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    /// Extracted body text, or an empty string on any failure.
    async fn fetch_body(&self, url: &str) -> String;
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}
