pub mod models;

use std::{future::Future, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use opentelemetry::{
    KeyValue,
    global,
    trace::{Span, SpanKind, Status, Tracer}
};
use reqwest::{
    Method,
    header::{ACCEPT, ACCEPT_ENCODING, HeaderMap, HeaderValue}
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use models::{
    BatchTitlesResponse,
    CatalogTitle,
    Episode,
    EpisodesPage,
    Season,
    SeasonsResponse
};


static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

pub const EPISODES_PAGE_SIZE: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ImdbError {
    #[error("non-2xx status: {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error)
}

impl ImdbError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ImdbError::Status(429))
    }
}


pub struct Request {
    method: Method,
    url:    String,
    query:  Vec<(String, String)>,
    trace:  bool
}

impl Request {
    pub fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            query: Vec::new(),
            trace: true
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn suppress_tracer(mut self) -> Self {
        self.trace = false;
        self
    }

    pub fn get_client() -> &'static reqwest::Client {
        CLIENT.get_or_init(|| {
            reqwest::Client::builder()
                .user_agent(concat!("brunan/", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(30))
                .default_headers(HeaderMap::from_iter([
                    (ACCEPT_ENCODING, HeaderValue::from_static("gzip")),
                    (ACCEPT, HeaderValue::from_static("application/json"))
                ]))
                .build()
                .unwrap_or_default()
        })
    }

    pub async fn send<T>(self) -> Result<T, ImdbError>
    where T: DeserializeOwned {
        let request = Request::get_client()
            .request(self.method.clone(), &self.url)
            .query(&self.query);

        let operation = async move {
            let response = request.send().await?;

            let status = response.status();

            if !status.is_success() {
                return Err(ImdbError::Status(status.as_u16()));
            }

            Ok(response.json::<T>().await?)
        };

        if !self.trace {
            return operation.await;
        }

        let path = self
            .url
            .splitn(4, '/')
            .last()
            .unwrap_or_default()
            .to_string();

        let tracer = global::tracer("");
        let mut span = tracer
            .span_builder(format!("{} /{}", self.method, path))
            .with_kind(SpanKind::Client)
            .with_attributes([
                KeyValue::new("http.method", self.method.to_string()),
                KeyValue::new("http.path", format!("/{path}"))
            ])
            .start(&tracer);

        let result = operation.await;

        match &result {
            Ok(_) => span.set_status(Status::Ok),
            Err(e) => {
                span.set_status(Status::Error {
                    description: e.to_string().into()
                });
                span.record_error(e);
            }
        }

        result
    }
}


/// Read access to the external title catalog.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn title(&self, id: &str) -> Result<CatalogTitle, ImdbError>;

    async fn batch_titles(
        &self,
        ids: &[String]
    ) -> Result<Vec<CatalogTitle>, ImdbError>;

    async fn seasons(&self, id: &str) -> Result<Vec<Season>, ImdbError>;

    async fn episodes_page(
        &self,
        id: &str,
        page_size: u32,
        page_token: Option<&str>
    ) -> Result<EpisodesPage, ImdbError>;
}

#[derive(Debug, Clone)]
pub struct ImdbClient {
    base_url: String
}

impl ImdbClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string()
        }
    }
}

#[async_trait]
impl MetadataSource for ImdbClient {
    async fn title(&self, id: &str) -> Result<CatalogTitle, ImdbError> {
        Request::new(Method::GET, &format!("{}/titles/{id}", self.base_url))
            .send()
            .await
    }

    async fn batch_titles(
        &self,
        ids: &[String]
    ) -> Result<Vec<CatalogTitle>, ImdbError> {
        let mut request = Request::new(
            Method::GET,
            &format!("{}/titles:batchGet", self.base_url)
        );

        for id in ids {
            request = request.with_query("titleIds", id);
        }

        Ok(request.send::<BatchTitlesResponse>().await?.titles)
    }

    async fn seasons(&self, id: &str) -> Result<Vec<Season>, ImdbError> {
        Ok(Request::new(
            Method::GET,
            &format!("{}/titles/{id}/seasons", self.base_url)
        )
        .send::<SeasonsResponse>()
        .await?
        .seasons)
    }

    async fn episodes_page(
        &self,
        id: &str,
        page_size: u32,
        page_token: Option<&str>
    ) -> Result<EpisodesPage, ImdbError> {
        let mut request = Request::new(
            Method::GET,
            &format!("{}/titles/{id}/episodes", self.base_url)
        )
        .with_query("pageSize", &page_size.to_string());

        if let Some(token) = page_token {
            request = request.with_query("pageToken", token);
        }

        request.send().await
    }
}


#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub cooldown:     Duration
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown:     Duration::from_secs(60)
        }
    }
}

impl RetryPolicy {
    /// A single attempt, a rate limit is returned to the caller as is.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            cooldown:     Duration::ZERO
        }
    }
}

/// Runs `call` until it succeeds, sleeping `policy.cooldown` after every
/// rate-limited attempt. Any other failure is returned immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut call: F
) -> Result<T, ImdbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ImdbError>>
{
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() && attempt < policy.max_attempts => {
                warn!(
                    what,
                    attempt,
                    max_attempts = policy.max_attempts,
                    cooldown_secs = policy.cooldown.as_secs(),
                    "rate limit hit, sleeping before retry"
                );

                tokio::time::sleep(policy.cooldown).await;

                attempt += 1;
            }
            Err(e) => return Err(e)
        }
    }
}

/// Pages through every episode of a series. A failing page ends the walk
/// and whatever was collected so far is returned.
pub async fn fetch_all_episodes(
    source: &dyn MetadataSource,
    id: &str,
    policy: &RetryPolicy
) -> Vec<Episode> {
    let mut episodes = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = with_retry(policy, id, || {
            source.episodes_page(id, EPISODES_PAGE_SIZE, page_token.as_deref())
        })
        .await;

        let page = match page {
            Ok(page) => page,
            Err(e) => {
                warn!(title_id = id, error = %e, "failed to fetch episodes");
                break;
            }
        };

        debug!(title_id = id, count = page.episodes.len(), "fetched episodes page");

        let next = page.next_token().map(str::to_string);

        episodes.extend(page.episodes);

        match next {
            Some(token) => page_token = Some(token),
            None => break
        }
    }

    episodes
}

#[derive(Debug, Default)]
pub struct SeriesDetails {
    pub seasons:  Vec<Season>,
    pub episodes: Vec<Episode>
}

pub async fn fetch_series_details(
    source: &dyn MetadataSource,
    id: &str,
    policy: &RetryPolicy
) -> SeriesDetails {
    let seasons = match with_retry(policy, id, || source.seasons(id)).await {
        Ok(seasons) => seasons,
        Err(e) => {
            warn!(title_id = id, error = %e, "failed to fetch seasons");
            Vec::new()
        }
    };

    SeriesDetails {
        seasons,
        episodes: fetch_all_episodes(source, id, policy).await
    }
}


#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering}
    };

    use super::*;

    fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            cooldown:     Duration::from_millis(1)
        }
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(ImdbError::Status(429).is_rate_limited());
        assert!(!ImdbError::Status(500).is_rate_limited());
        assert_eq!(ImdbError::Status(404).to_string(), "non-2xx status: 404");
    }

    #[tokio::test]
    async fn test_retry_recovers_after_rate_limit() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = with_retry(&instant_policy(), "test", || {
            let calls = calls.clone();
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(ImdbError::Status(429)),
                    _ => Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = with_retry(&instant_policy(), "test", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ImdbError::Status(429))
            }
        })
        .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_returns_rate_limit() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = with_retry(&RetryPolicy::once(), "test", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ImdbError::Status(429))
            }
        })
        .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_other_errors() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = with_retry(&instant_policy(), "test", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ImdbError::Status(500))
            }
        })
        .await;

        assert!(matches!(result, Err(ImdbError::Status(500))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_client_trims_base_url() {
        assert_eq!(
            ImdbClient::new("https://api.imdbapi.dev/").base_url,
            "https://api.imdbapi.dev"
        );
    }
}
