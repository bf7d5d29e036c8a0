use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ValuationConfig;
use crate::error::{AppError, Result};
use crate::fetcher::MarketDataProvider;
use crate::types::{EnrichmentGap, FundamentalRow, GapKind, Ticker, ValuationLabel, ValuationRecord};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValuationTable {
    /// In requested order.
    pub records: Vec<ValuationRecord>,
    pub gaps: Vec<EnrichmentGap>,
}

impl ValuationTable {
    pub fn label_by_ticker(&self) -> HashMap<Ticker, ValuationLabel> {
        self.records.iter().map(|r| (r.ticker.clone(), r.label)).collect()
    }

    pub fn undervalued(&self) -> impl Iterator<Item = &ValuationRecord> {
        self.records
            .iter()
            .filter(|r| r.label == ValuationLabel::Undervalued)
    }
}

/// Per-sector medians over strictly positive ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SectorMedians {
    pub per: Option<f64>,
    pub pbr: Option<f64>,
}

impl SectorMedians {
    fn usable(&self) -> bool {
        self.per.is_some() || self.pbr.is_some()
    }
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

fn positive(x: Option<f64>) -> Option<f64> {
    x.filter(|v| v.is_finite() && *v > 0.0)
}

pub fn sector_medians(
    rows: &[FundamentalRow],
    mapping: &BTreeMap<Ticker, String>,
) -> HashMap<String, SectorMedians> {
    let mut per: HashMap<&str, Vec<f64>> = HashMap::new();
    let mut pbr: HashMap<&str, Vec<f64>> = HashMap::new();
    for row in rows {
        let Some(sector) = mapping.get(&row.ticker) else {
            continue;
        };
        let per_list = per.entry(sector.as_str()).or_default();
        if let Some(v) = positive(row.per) {
            per_list.push(v);
        }
        let pbr_list = pbr.entry(sector.as_str()).or_default();
        if let Some(v) = positive(row.pbr) {
            pbr_list.push(v);
        }
    }

    per.into_iter()
        .map(|(sector, mut pers)| {
            let mut pbrs = pbr.remove(sector).unwrap_or_default();
            let m = SectorMedians {
                per: median(&mut pers),
                pbr: median(&mut pbrs),
            };
            (sector.to_string(), m)
        })
        .collect()
}

/// Label one instrument. Sector-relative when `medians` carries a usable
/// median, absolute thresholds otherwise.
pub fn label(
    per: Option<f64>,
    pbr: Option<f64>,
    medians: Option<&SectorMedians>,
    cfg: &ValuationConfig,
) -> ValuationLabel {
    if per.is_none() && pbr.is_none() {
        return ValuationLabel::NotAvailable;
    }
    let per = per.unwrap_or(0.0);
    let pbr = pbr.unwrap_or(0.0);

    if let Some(m) = medians.filter(|m| m.usable()) {
        let med_per = m.per.unwrap_or(0.0);
        let med_pbr = m.pbr.unwrap_or(0.0);
        let per_ok = med_per > 0.0 && per > 0.0;
        let pbr_ok = med_pbr > 0.0 && pbr > 0.0;

        if per_ok
            && per <= med_per * cfg.undervalued_per_ratio
            && (!pbr_ok || pbr <= med_pbr * cfg.undervalued_pbr_ratio)
        {
            return ValuationLabel::Undervalued;
        }
        if (per_ok && per >= med_per * cfg.overvalued_per_ratio)
            || (pbr_ok && pbr >= med_pbr * cfg.overvalued_pbr_ratio)
        {
            return ValuationLabel::Overvalued;
        }
        return ValuationLabel::Fair;
    }

    if per > 0.0 && per <= cfg.abs_under_per {
        ValuationLabel::Undervalued
    } else if per >= cfg.abs_over_per {
        ValuationLabel::Overvalued
    } else if pbr > 0.0 && pbr <= cfg.abs_under_pbr {
        ValuationLabel::Undervalued
    } else if pbr >= cfg.abs_over_pbr {
        ValuationLabel::Overvalued
    } else {
        ValuationLabel::Fair
    }
}

/// Label the requested tickers against one market-wide fundamentals pull.
pub fn judge(
    fundamentals: &[FundamentalRow],
    tickers: &[Ticker],
    mapping: Option<&BTreeMap<Ticker, String>>,
    cfg: &ValuationConfig,
) -> ValuationTable {
    let mut by_ticker: HashMap<&Ticker, &FundamentalRow> = HashMap::new();
    for row in fundamentals {
        by_ticker.entry(&row.ticker).or_insert(row);
    }
    let medians = mapping.map(|m| sector_medians(fundamentals, m)).unwrap_or_default();

    let mut table = ValuationTable::default();
    for ticker in tickers {
        let Some(row) = by_ticker.get(ticker) else {
            warn!(%ticker, "No fundamentals row");
            table.gaps.push(EnrichmentGap {
                ticker: ticker.clone(),
                kind: GapKind::MissingFundamentals,
            });
            continue;
        };
        let sector = mapping.and_then(|m| m.get(ticker)).cloned();
        let sector_m = sector
            .as_deref()
            .and_then(|s| medians.get(s))
            .filter(|m| m.usable());
        table.records.push(ValuationRecord {
            ticker: ticker.clone(),
            per: row.per,
            pbr: row.pbr,
            eps: row.eps,
            bps: row.bps,
            dividend_yield: row.dividend_yield,
            label: label(row.per, row.pbr, sector_m, cfg),
            sector,
            sector_median_per: sector_m.and_then(|m| m.per),
            sector_median_pbr: sector_m.and_then(|m| m.pbr),
        });
    }
    table
}

pub async fn run_valuation(
    provider: &dyn MarketDataProvider,
    tickers: &[Ticker],
    date: NaiveDate,
    mapping: Option<&BTreeMap<Ticker, String>>,
    cfg: &ValuationConfig,
) -> Result<ValuationTable> {
    if tickers.is_empty() {
        return Ok(ValuationTable::default());
    }
    let fundamentals = provider
        .fundamentals(date)
        .await
        .map_err(|e| AppError::data_unavailable(date, e))?;
    if fundamentals.is_empty() {
        warn!(%date, "Fundamentals table is empty");
    }

    let table = judge(&fundamentals, tickers, mapping, cfg);
    info!(
        %date,
        labelled = table.records.len(),
        undervalued = table.undervalued().count(),
        gaps = table.gaps.len(),
        "Valuation finished"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::fake::{fundamental, FakeMarketData};
    use std::sync::atomic::Ordering;

    fn cfg() -> ValuationConfig {
        ValuationConfig::default()
    }

    fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<Ticker, String> {
        pairs
            .iter()
            .map(|(t, s)| (Ticker::new(t), s.to_string()))
            .collect()
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn both_missing_is_not_available() {
        let m = SectorMedians { per: Some(10.0), pbr: Some(1.0) };
        assert_eq!(label(None, None, Some(&m), &cfg()), ValuationLabel::NotAvailable);
        assert_eq!(label(None, None, None, &cfg()), ValuationLabel::NotAvailable);
    }

    #[test]
    fn sector_relative_labels() {
        let m = SectorMedians { per: Some(10.0), pbr: Some(1.0) };
        assert_eq!(label(Some(7.0), Some(0.7), Some(&m), &cfg()), ValuationLabel::Undervalued);
        // Cheap on P/E but expensive on P/B is not undervalued.
        assert_eq!(label(Some(7.0), Some(2.0), Some(&m), &cfg()), ValuationLabel::Overvalued);
        assert_eq!(label(Some(13.0), Some(1.0), Some(&m), &cfg()), ValuationLabel::Overvalued);
        assert_eq!(label(Some(10.0), Some(1.0), Some(&m), &cfg()), ValuationLabel::Fair);
        // Loss-making: P/E check is skipped, P/B decides.
        assert_eq!(label(Some(-5.0), Some(1.0), Some(&m), &cfg()), ValuationLabel::Fair);
    }

    #[test]
    fn absolute_thresholds() {
        assert_eq!(label(Some(12.0), None, None, &cfg()), ValuationLabel::Undervalued);
        assert_eq!(label(Some(35.0), Some(0.5), None, &cfg()), ValuationLabel::Overvalued);
        assert_eq!(label(Some(20.0), Some(0.8), None, &cfg()), ValuationLabel::Undervalued);
        assert_eq!(label(Some(20.0), Some(3.5), None, &cfg()), ValuationLabel::Overvalued);
        assert_eq!(label(Some(20.0), Some(2.0), None, &cfg()), ValuationLabel::Fair);
    }

    #[test]
    fn negative_only_sector_falls_back_to_absolute() {
        let rows = vec![
            fundamental("1", Some(-4.0), Some(-0.5)),
            fundamental("2", Some(-8.0), Some(-1.2)),
            fundamental("3", Some(12.0), Some(-0.1)),
        ];
        let map = mapping(&[("1", "Biotech"), ("2", "Biotech")]);
        let medians = sector_medians(&rows, &map);
        assert_eq!(medians["Biotech"], SectorMedians::default());

        let map = mapping(&[("1", "Biotech"), ("2", "Biotech"), ("3", "Biotech")]);
        let rows = vec![
            fundamental("1", Some(-4.0), Some(-0.5)),
            fundamental("2", Some(-8.0), Some(-1.2)),
            fundamental("3", Some(-2.0), Some(0.9)),
        ];
        let table = judge(&rows, &[Ticker::new("3")], Some(&map), &cfg());
        let rec = &table.records[0];
        // Only P/B has a positive member, so the sector branch applies with
        // median P/B 0.9; P/B equals the median, which is fair.
        assert_eq!(rec.label, ValuationLabel::Fair);
        assert_eq!(rec.sector_median_pbr, Some(0.9));

        let rows = vec![
            fundamental("1", Some(-4.0), Some(-0.5)),
            fundamental("2", Some(-8.0), Some(-1.2)),
            fundamental("3", Some(-2.0), Some(-0.9)),
        ];
        let table = judge(&rows, &[Ticker::new("3")], Some(&map), &cfg());
        let rec = &table.records[0];
        assert_eq!(rec.sector_median_per, None);
        assert_eq!(rec.sector_median_pbr, None);
        // Absolute: P/E and P/B both non-positive, neither threshold trips.
        assert_eq!(rec.label, ValuationLabel::Fair);

        let rows = vec![
            fundamental("1", Some(-4.0), Some(-0.5)),
            fundamental("3", Some(10.0), Some(-0.9)),
        ];
        let map = mapping(&[("1", "Biotech"), ("3", "Loners")]);
        let table = judge(&rows, &[Ticker::new("1")], Some(&map), &cfg());
        assert_eq!(table.records[0].sector.as_deref(), Some("Biotech"));
        assert_eq!(table.records[0].label, ValuationLabel::Fair);
    }

    #[test]
    fn absolute_fallback_applies_to_unmapped_ticker() {
        let rows = vec![fundamental("1", Some(9.0), Some(2.0))];
        let table = judge(&rows, &[Ticker::new("1")], Some(&BTreeMap::new()), &cfg());
        assert_eq!(table.records[0].label, ValuationLabel::Undervalued);
        assert!(table.records[0].sector.is_none());
    }

    #[test]
    fn missing_rows_are_gaps() {
        let rows = vec![fundamental("1", Some(9.0), None)];
        let table = judge(&rows, &[Ticker::new("1"), Ticker::new("2")], None, &cfg());
        assert_eq!(table.records.len(), 1);
        assert_eq!(
            table.gaps,
            vec![EnrichmentGap {
                ticker: Ticker::new("2"),
                kind: GapKind::MissingFundamentals
            }]
        );
    }

    #[test]
    fn empty_fundamentals_table_gaps_every_ticker() {
        let tickers = [Ticker::new("1"), Ticker::new("2")];
        let table = judge(&[], &tickers, None, &cfg());
        assert!(table.records.is_empty());
        assert_eq!(table.gaps.len(), 2);
        assert!(table.gaps.iter().all(|g| g.kind == GapKind::MissingFundamentals));
    }

    #[tokio::test]
    async fn fundamentals_fetched_once() {
        let provider = FakeMarketData {
            fundamentals: vec![fundamental("1", Some(9.0), Some(0.5))],
            ..Default::default()
        };
        let date = NaiveDate::from_ymd_opt(2024, 8, 26).unwrap();
        let map = mapping(&[("1", "A")]);
        let table = run_valuation(&provider, &[Ticker::new("1")], date, Some(&map), &cfg())
            .await
            .unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(provider.fundamentals_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_data_unavailable() {
        let provider = FakeMarketData {
            fail_fundamentals: true,
            ..Default::default()
        };
        let date = NaiveDate::from_ymd_opt(2024, 8, 26).unwrap();
        let err = run_valuation(&provider, &[Ticker::new("1")], date, None, &cfg())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DataUnavailable { .. }));
    }
}
