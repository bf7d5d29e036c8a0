use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use tracing::debug;

use crate::config::{self, timeouts, Config};
use crate::error::Result;
use crate::news::extract::extract_article_body;

use super::{http_client, ArticleFetcher};

/// Fetches article pages and extracts their body text.
pub struct HtmlArticleFetcher {
    client: reqwest::Client,
    request_delay: Duration,
}

impl HtmlArticleFetcher {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            client: http_client(timeouts::ARTICLE_SECS)?,
            request_delay: Duration::from_millis(cfg.news.article_request_delay_ms),
        })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        Ok(self
            .client
            .get(url)
            .header(USER_AGENT, config::BROWSER_USER_AGENT)
            .header(ACCEPT_LANGUAGE, config::ACCEPT_LANGUAGE)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }
}

#[async_trait]
impl ArticleFetcher for HtmlArticleFetcher {
    async fn fetch_body(&self, url: &str) -> String {
        tokio::time::sleep(self.request_delay).await;
        match self.fetch_html(url).await {
            Ok(html) => extract_article_body(&html),
            Err(e) => {
                debug!(url, "article fetch failed: {e}");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HtmlArticleFetcher {
        let mut cfg = Config::default();
        cfg.news.article_request_delay_ms = 0;
        HtmlArticleFetcher::new(&cfg).unwrap()
    }

    #[tokio::test]
    async fn extracts_body_from_page() {
        let server = MockServer::start().await;
        let body = "본문 ".repeat(40);
        Mock::given(method("GET"))
            .and(path("/article/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<html><body><div id=\"articleBody\">{body}</div></body></html>"
            )))
            .mount(&server)
            .await;

        let text = fetcher().fetch_body(&format!("{}/article/1", server.uri())).await;
        assert_eq!(text, body.trim());
    }

    #[tokio::test]
    async fn http_error_yields_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let text = fetcher().fetch_body(&format!("{}/gone", server.uri())).await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_yields_empty_body() {
        let text = fetcher().fetch_body("http://127.0.0.1:9/nothing").await;
        assert!(text.is_empty());
    }
}
