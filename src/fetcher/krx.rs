use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{REFERER, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{timeouts, Config, BROWSER_USER_AGENT, KRX_REFERER};
use crate::error::Result;
use crate::types::{yyyymmdd, FundamentalRow, MarketSegment, SectorFact, SnapshotRow, Ticker};

use super::{http_client, MarketDataProvider};

/// Report identifiers on the KRX data service.
mod bld {
    pub const DAILY_PRICES: &str = "dbms/MDC/STAT/standard/MDCSTAT01501";
    pub const FUNDAMENTALS: &str = "dbms/MDC/STAT/standard/MDCSTAT03501";
    pub const SECTOR_CLASSIFICATION: &str = "dbms/MDC/STAT/standard/MDCSTAT03901";
}

/// Market-data provider backed by the KRX JSON endpoint.
pub struct KrxClient {
    client: reqwest::Client,
    url: String,
}

impl KrxClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(timeouts::KRX_SECS)?,
            url: cfg.krx_api_url.clone(),
        })
    }

    /// Transport and HTTP-status failures are errors. A body that is not JSON
    /// comes back as `Value::Null`, which the parsers read as an empty table.
    async fn query(&self, bld: &str, segment: MarketSegment, date: NaiveDate) -> Result<Value> {
        let trd_dd = yyyymmdd(date);
        let form = [
            ("bld", bld),
            ("mktId", market_id(segment)),
            ("trdDd", trd_dd.as_str()),
            ("share", "1"),
            ("money", "1"),
            ("csvxls_isNo", "false"),
        ];
        let resp = self
            .client
            .post(&self.url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(REFERER, KRX_REFERER)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        let body = resp.text().await?;
        let v = serde_json::from_str(&body).unwrap_or_else(|e| {
            warn!(bld, %segment, date = %trd_dd, "KRX body is not JSON, treating as empty: {e}");
            Value::Null
        });
        debug!(bld, %segment, date = %trd_dd, "KRX response received");
        Ok(v)
    }
}

#[async_trait]
impl MarketDataProvider for KrxClient {
    async fn daily_snapshot(&self, date: NaiveDate) -> Result<Vec<SnapshotRow>> {
        let v = self.query(bld::DAILY_PRICES, MarketSegment::All, date).await?;
        Ok(parse_snapshot(&v))
    }

    async fn fundamentals(&self, date: NaiveDate) -> Result<Vec<FundamentalRow>> {
        let v = self.query(bld::FUNDAMENTALS, MarketSegment::All, date).await?;
        Ok(parse_fundamentals(&v))
    }

    async fn sector_classification(
        &self,
        date: NaiveDate,
        segment: MarketSegment,
    ) -> Result<Vec<SectorFact>> {
        let v = self.query(bld::SECTOR_CLASSIFICATION, segment, date).await?;
        Ok(parse_sectors(&v))
    }
}

fn market_id(segment: MarketSegment) -> &'static str {
    match segment {
        MarketSegment::All => "ALL",
        MarketSegment::Kospi => "STK",
        MarketSegment::Kosdaq => "KSQ",
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// The data service returns its table under a report-specific key
/// (`OutBlock_1`, `output`, `block1`). Take the first array found; any
/// other shape is an empty table.
fn table(v: &Value) -> Vec<&serde_json::Map<String, Value>> {
    let Some(obj) = v.as_object() else {
        if !v.is_null() {
            warn!("KRX response was not an object, treating as empty");
        }
        return Vec::new();
    };
    obj.values()
        .find_map(|x| x.as_array())
        .map(|a| a.iter().filter_map(|r| r.as_object()).collect())
        .unwrap_or_default()
}

/// `"1,234.5"` → 1234.5. `"-"`, `""` and anything non-numeric → None.
pub fn parse_krx_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
}

fn num(row: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::String(s) => parse_krx_number(s),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn text<'a>(row: &'a serde_json::Map<String, Value>, key: &str) -> &'a str {
    row.get(key).and_then(|x| x.as_str()).unwrap_or("").trim()
}

pub fn parse_snapshot(v: &Value) -> Vec<SnapshotRow> {
    table(v)
        .into_iter()
        .filter(|r| !text(r, "ISU_SRT_CD").is_empty())
        .map(|r| SnapshotRow {
            ticker: Ticker::new(text(r, "ISU_SRT_CD")),
            name: text(r, "ISU_ABBRV").to_string(),
            open: num(r, "TDD_OPNPRC"),
            high: num(r, "TDD_HGPRC"),
            low: num(r, "TDD_LWPRC"),
            close: num(r, "TDD_CLSPRC"),
            volume: num(r, "ACC_TRDVOL"),
            trading_value: num(r, "ACC_TRDVAL"),
            change_pct: num(r, "FLUC_RT"),
        })
        .collect()
}

pub fn parse_fundamentals(v: &Value) -> Vec<FundamentalRow> {
    table(v)
        .into_iter()
        .filter(|r| !text(r, "ISU_SRT_CD").is_empty())
        .map(|r| FundamentalRow {
            ticker: Ticker::new(text(r, "ISU_SRT_CD")),
            per: num(r, "PER"),
            pbr: num(r, "PBR"),
            eps: num(r, "EPS"),
            bps: num(r, "BPS"),
            dividend_yield: num(r, "DVD_YLD"),
        })
        .collect()
}

pub fn parse_sectors(v: &Value) -> Vec<SectorFact> {
    table(v)
        .into_iter()
        .filter(|r| !text(r, "ISU_SRT_CD").is_empty())
        .map(|r| SectorFact {
            ticker: Ticker::new(text(r, "ISU_SRT_CD")),
            sector: text(r, "IDX_IND_NM").to_string(),
        })
        .collect()
}
