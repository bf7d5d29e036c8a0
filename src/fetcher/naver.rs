use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{self, timeouts, Config, NaverCredentials, SEARCH_API_MAX_DISPLAY};
use crate::error::Result;
use crate::news::extract::extract_search_results;
use crate::types::RawArticle;

use super::{http_client, NewsSearchProvider};

/// News search: credentialed search API first, search-page scraping second.
pub struct NaverNewsClient {
    api_client: reqwest::Client,
    scrape_client: reqwest::Client,
    api_url: String,
    search_url: String,
    credentials: Option<NaverCredentials>,
    request_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    items: Vec<ApiItem>,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "pubDate")]
    pub_date: String,
}

impl From<ApiItem> for RawArticle {
    fn from(it: ApiItem) -> Self {
        RawArticle {
            title: it.title,
            link: it.link,
            description: it.description,
            pub_date: it.pub_date,
        }
    }
}

impl NaverNewsClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let credentials = (cfg.news.use_api && cfg.naver.is_configured()).then(|| cfg.naver.clone());
        if credentials.is_none() {
            warn!("Search API credentials not configured (or use_api=false); news falls back to scraping");
        }
        Ok(Self {
            api_client: http_client(timeouts::SEARCH_API_SECS)?,
            scrape_client: http_client(timeouts::SEARCH_SCRAPE_SECS)?,
            api_url: cfg.naver_api_url.clone(),
            search_url: cfg.naver_search_url.clone(),
            credentials,
            request_delay: Duration::from_millis(cfg.news.request_delay_ms),
        })
    }

    async fn search_api(&self, creds: &NaverCredentials, query: &str, limit: usize) -> Result<Vec<RawArticle>> {
        let display = limit.clamp(1, SEARCH_API_MAX_DISPLAY).to_string();
        let resp: ApiResponse = self
            .api_client
            .get(&self.api_url)
            .header("X-Naver-Client-Id", &creds.client_id)
            .header("X-Naver-Client-Secret", &creds.client_secret)
            .query(&[("query", query), ("display", display.as_str()), ("start", "1"), ("sort", "date")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.items.into_iter().map(RawArticle::from).collect())
    }

    async fn search_scrape(&self, query: &str, limit: usize) -> Result<Vec<RawArticle>> {
        tokio::time::sleep(self.request_delay).await;
        let html = self
            .scrape_client
            .get(&self.search_url)
            .header(USER_AGENT, config::BROWSER_USER_AGENT)
            .header(ACCEPT_LANGUAGE, config::ACCEPT_LANGUAGE)
            .query(&[("where", "news"), ("query", query)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let (strategy, rows) = extract_search_results(&html, limit);
        debug!(query, strategy = strategy.unwrap_or("none"), found = rows.len(), "search page scraped");
        Ok(rows)
    }
}

#[async_trait]
impl NewsSearchProvider for NaverNewsClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RawArticle>> {
        if let Some(creds) = &self.credentials {
            match self.search_api(creds, query, limit).await {
                Ok(items) if !items.is_empty() => {
                    return Ok(items.into_iter().take(limit).collect());
                }
                Ok(_) => debug!(query, "search API returned nothing, scraping instead"),
                Err(e) => warn!(query, "search API failed, scraping instead: {e}"),
            }
        }
        self.search_scrape(query, limit).await
    }
}
