use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::{AppError, Result};
use crate::types::Grade;

pub const KRX_API_URL: &str = "http://data.krx.co.kr/comm/bldAttendant/getJsonData.cmd";
pub const KRX_REFERER: &str = "http://data.krx.co.kr/contents/MDC/MDI/mdiLoader";
pub const NAVER_NEWS_API_URL: &str = "https://openapi.naver.com/v1/search/news.json";
pub const NAVER_NEWS_SEARCH_URL: &str = "https://search.naver.com/search.naver";

/// Used when neither `--config` nor `SCREENER_CONFIG` is given and the file exists.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en;q=0.8";

/// Per-call HTTP timeouts (seconds). A stalled fetch degrades that item only.
pub mod timeouts {
    pub const KRX_SECS: u64 = 30;
    pub const SEARCH_API_SECS: u64 = 10;
    pub const SEARCH_SCRAPE_SECS: u64 = 12;
    pub const ARTICLE_SECS: u64 = 8;
}

/// Hard cap the search API accepts for `display`.
pub const SEARCH_API_MAX_DISPLAY: usize = 100;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    #[serde(deserialize_with = "separated_u64")]
    pub min_volume: u64,
    #[serde(deserialize_with = "separated_u64")]
    pub min_trading_value: u64,
    pub include_limit_up: bool,
    pub limit_up_change_pct: f64,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            min_volume: 1_000_000,
            min_trading_value: 10_000_000_000,
            include_limit_up: false,
            limit_up_change_pct: 29.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub top_n_sectors: usize,
    pub weight_by_change_pct: bool,
    /// Restrict the rest of the run to members of the strongest sector.
    pub only_top1_theme: bool,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            top_n_sectors: 10,
            weight_by_change_pct: true,
            only_top1_theme: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    pub undervalued_per_ratio: f64,
    pub overvalued_per_ratio: f64,
    pub undervalued_pbr_ratio: f64,
    pub overvalued_pbr_ratio: f64,
    /// Absolute fallback thresholds, used when no sector median applies.
    pub abs_under_per: f64,
    pub abs_over_per: f64,
    pub abs_under_pbr: f64,
    pub abs_over_pbr: f64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            undervalued_per_ratio: 0.8,
            overvalued_per_ratio: 1.2,
            undervalued_pbr_ratio: 0.8,
            overvalued_pbr_ratio: 1.2,
            abs_under_per: 15.0,
            abs_over_per: 30.0,
            abs_under_pbr: 1.0,
            abs_over_pbr: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// Prefer the credentialed search API when credentials are present.
    pub use_api: bool,
    pub max_articles_per_stock: usize,
    pub filter_by_target_date: bool,
    pub target_date_tolerance_days: i64,
    /// Keep items whose published date cannot be parsed.
    pub parse_fail_keep: bool,
    pub fetch_article_body: bool,
    pub max_articles_fetch_body: usize,
    pub summary_max_chars: usize,
    pub request_delay_ms: u64,
    pub article_request_delay_ms: u64,
    /// Instruments enriched in parallel.
    pub concurrency: usize,
    pub debug: bool,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            use_api: true,
            max_articles_per_stock: 20,
            filter_by_target_date: true,
            target_date_tolerance_days: 0,
            parse_fail_keep: true,
            fetch_article_body: true,
            max_articles_fetch_body: 5,
            summary_max_chars: 300,
            request_delay_ms: 300,
            article_request_delay_ms: 500,
            concurrency: 1,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub weight_trading: f64,
    pub weight_news: f64,
    pub weight_theme: f64,
    pub weight_valuation: f64,
    /// Added to the theme score of members of a top-3 sector, capped at 100.
    pub theme_top_bonus: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            weight_trading: 0.25,
            weight_news: 0.30,
            weight_theme: 0.30,
            weight_valuation: 0.15,
            theme_top_bonus: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    pub min_grade: Grade,
    pub max_count: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            min_grade: Grade::B,
            max_count: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub save_json: bool,
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_json: true,
            dir: PathBuf::from("output"),
        }
    }
}

/// Credentials for the search API. Absent means scrape-only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NaverCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl NaverCredentials {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// YAML file shape. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub screener: ScreenerConfig,
    pub theme: ThemeConfig,
    pub valuation: ValuationConfig,
    pub news: NewsConfig,
    pub ranker: RankerConfig,
    pub recommend: RecommendConfig,
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Built once in `main` and passed by reference to every stage.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub krx_api_url: String,
    pub naver_api_url: String,
    pub naver_search_url: String,
    pub naver: NaverCredentials,
    pub screener: ScreenerConfig,
    pub theme: ThemeConfig,
    pub valuation: ValuationConfig,
    pub news: NewsConfig,
    pub ranker: RankerConfig,
    pub recommend: RecommendConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file_config(FileConfig::default())
    }
}

impl Config {
    /// Defaults, then the YAML file (if any), then environment overrides.
    ///
    /// `explicit` is the `--config` path; it must exist when given. Otherwise
    /// `SCREENER_CONFIG` is tried, then `DEFAULT_CONFIG_PATH` if present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => match std::env::var("SCREENER_CONFIG") {
                Ok(p) if !p.trim().is_empty() => Some(PathBuf::from(p)),
                _ => {
                    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                    default.exists().then_some(default)
                }
            },
        };

        let file = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(&p).map_err(|e| {
                    AppError::Config(format!("cannot read {}: {e}", p.display()))
                })?;
                Self::parse_yaml(&raw)?
            }
            None => FileConfig::default(),
        };

        let mut cfg = Self::from_file_config(file);
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse_yaml(raw: &str) -> Result<FileConfig> {
        if raw.trim().is_empty() {
            return Ok(FileConfig::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_file_config(file: FileConfig) -> Self {
        Self {
            log_level: "info".to_string(),
            krx_api_url: KRX_API_URL.to_string(),
            naver_api_url: NAVER_NEWS_API_URL.to_string(),
            naver_search_url: NAVER_NEWS_SEARCH_URL.to_string(),
            naver: NaverCredentials::default(),
            screener: file.screener,
            theme: file.theme,
            valuation: file.valuation,
            news: file.news,
            ranker: file.ranker,
            recommend: file.recommend,
            output: file.output,
        }
    }

    fn apply_env(&mut self) {
        self.log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        if let Ok(url) = std::env::var("KRX_API_URL") {
            self.krx_api_url = url;
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        self.naver = NaverCredentials {
            client_id: std::env::var("NAVER_CLIENT_ID").unwrap_or_default().trim().to_string(),
            client_secret: std::env::var("NAVER_CLIENT_SECRET")
                .unwrap_or_default()
                .trim()
                .to_string(),
        };
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.ranker;
        let weights = [r.weight_trading, r.weight_news, r.weight_theme, r.weight_valuation];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AppError::Config(
                "ranker weights must be finite and non-negative".to_string(),
            ));
        }
        if self.theme.top_n_sectors == 0 {
            return Err(AppError::Config("theme.top_n_sectors must be >= 1".to_string()));
        }
        if self.news.concurrency == 0 {
            return Err(AppError::Config("news.concurrency must be >= 1".to_string()));
        }
        if self.news.target_date_tolerance_days < 0 {
            return Err(AppError::Config(
                "news.target_date_tolerance_days must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accept `5000000`, `"5_000_000"` or `"5,000,000"`.
fn separated_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .replace(['_', ','], "")
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("not an integer: {s:?}"))),
    }
}
