use crate::config::{env_parse, Settings};
use crate::domain::event::AnalystEvent;
use crate::error::FeedError;
use crate::ingest::types::{EventPage, FeedPage};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_PAGES: usize = 10_000;

#[async_trait::async_trait]
pub trait EventFeed: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Fetches one page. `None` asks for the first page.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<EventPage>;
}

#[derive(Debug, Clone)]
pub struct HttpEventFeed {
    http: reqwest::Client,
    url: String,
    api_token: String,
}

impl HttpEventFeed {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url = settings.require_feed_url()?.to_string();
        let api_token = settings.require_feed_api_token()?.to_string();
        let timeout_secs = env_parse("FEED_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        Self::new(url, api_token, Duration::from_secs(timeout_secs))
    }

    pub fn new(url: String, api_token: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!url.trim().is_empty(), "feed url must be non-empty");
        anyhow::ensure!(!api_token.trim().is_empty(), "feed api token must be non-empty");

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build feed http client")?;

        Ok(Self {
            http,
            url,
            api_token,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer_value(&self.api_token))
                .context("feed api token is not a valid header value")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl EventFeed for HttpEventFeed {
    fn provider_name(&self) -> &'static str {
        "analyst_feed_http"
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<EventPage> {
        let mut req = self.http.get(&self.url).headers(self.headers()?);
        if let Some(cursor) = cursor {
            req = req.query(&[("next_page", cursor)]);
        }

        let res = req.send().await.context("feed request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read feed response")?;

        if !status.is_success() {
            return Err(FeedError {
                stage: "http",
                page: 0,
                cursor: cursor.map(str::to_string),
                detail: format!("status={status}"),
                raw_body: Some(text),
            }
            .into());
        }

        let parsed = serde_json::from_str::<FeedPage>(&text).map_err(|err| FeedError {
            stage: "decode",
            page: 0,
            cursor: cursor.map(str::to_string),
            detail: err.to_string(),
            raw_body: Some(text),
        })?;

        Ok(parsed.into_event_page(chrono::Utc::now()))
    }
}

/// Accepts tokens configured with or without the `Bearer ` prefix.
fn bearer_value(token: &str) -> String {
    let token = token.trim();
    match token.strip_prefix("Bearer ") {
        Some(rest) => format!("Bearer {}", rest.trim()),
        None => format!("Bearer {token}"),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DrainedFeed {
    pub events: Vec<AnalystEvent>,
    pub pages: usize,
    pub skipped: usize,
}

/// Follows the cursor chain until the feed reports no next page. Any page failure fails
/// the whole drain; nothing is returned for partial chains.
pub async fn drain_feed(feed: &dyn EventFeed, max_pages: usize) -> Result<DrainedFeed> {
    let mut out = DrainedFeed::default();
    let mut cursor: Option<String> = None;
    let mut seen = HashSet::<String>::new();

    loop {
        anyhow::ensure!(
            out.pages < max_pages,
            "feed exceeded {max_pages} pages without terminating"
        );

        let page_no = out.pages + 1;
        let page = feed
            .fetch_page(cursor.as_deref())
            .await
            .map_err(|err| tag_page(err, page_no))
            .with_context(|| format!("fetch feed page {page_no} failed"))?;

        out.pages = page_no;
        out.skipped += page.skipped;
        out.events.extend(page.events);

        tracing::debug!(
            provider = feed.provider_name(),
            page = page_no,
            events = out.events.len(),
            "feed page fetched"
        );

        match page.next_cursor {
            Some(next) => {
                anyhow::ensure!(
                    seen.insert(next.clone()),
                    "feed repeated cursor {next:?} at page {page_no}"
                );
                cursor = Some(next);
            }
            None => break,
        }
    }

    Ok(out)
}

pub fn max_pages_from_env() -> usize {
    env_parse("FEED_MAX_PAGES", DEFAULT_MAX_PAGES)
}

fn tag_page(err: anyhow::Error, page_no: usize) -> anyhow::Error {
    match err.downcast::<FeedError>() {
        Ok(mut feed_err) => {
            feed_err.page = page_no;
            feed_err.into()
        }
        Err(other) => other,
    }
}
