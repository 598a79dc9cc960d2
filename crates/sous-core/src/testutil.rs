//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::config::{OpenAiConfig, ScraperConfig, ServiceConfig};
use crate::error::AppError;
use crate::models::{
    Capability, CleanedPage, ProviderDescriptor, ProviderKind, RawContent, RecipeQuery,
};
use crate::rate_limit::{RateLimitConfig, Upstream};
use crate::traits::{CompletionClient, CompletionRequest, Fetcher, PageCleaner, RecipeProvider};

/// A reply that passes extraction: three steps, three ingredients.
pub const PASTA_REPLY: &str =
    r#"{"steps": ["Boil water", "Add pasta", "Drain"], "ingredients": ["pasta", "water", "salt"]}"#;

/// Raw content as the structured provider would return it.
pub fn raw_content(body: &str) -> RawContent {
    RawContent {
        provider: ProviderKind::Edamam,
        source: "recipe_abc".to_string(),
        title: None,
        body: body.to_string(),
        ingredient_hints: Vec::new(),
    }
}

/// Configuration for tests: one hour TTL, default budgets, no credentials
/// beyond a dummy completion key.
pub fn service_config() -> ServiceConfig {
    ServiceConfig {
        provider: ProviderKind::Edamam,
        cache: CacheConfig {
            ttl: Duration::from_secs(3600),
            max_entries: 100,
        },
        cache_sweep_interval: Duration::from_secs(300),
        rate_limits: RateLimitConfig::default(),
        upstream_timeout: Duration::from_secs(15),
        completion_timeout: Duration::from_secs(25),
        host: "127.0.0.1".into(),
        port: 8000,
        openai: OpenAiConfig {
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
        },
        edamam: None,
        spoonacular: None,
        scraper: ScraperConfig {
            probe_url: "https://www.allrecipes.com/".into(),
            allow_private_urls: false,
        },
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Mock provider with a response queue and a fetch counter.
#[derive(Clone)]
pub struct MockProvider {
    kind: ProviderKind,
    supports: &'static [Capability],
    /// Queue of responses. Each fetch pops the first element.
    /// If empty, returns content built from the query.
    responses: Arc<Mutex<Vec<Result<RawContent, AppError>>>>,
    probe_result: Arc<Mutex<Result<(), AppError>>>,
    delay: Option<Duration>,
    fetches: Arc<AtomicUsize>,
    pub queries: Arc<Mutex<Vec<RecipeQuery>>>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        let supports: &'static [Capability] = match kind {
            ProviderKind::Edamam | ProviderKind::Spoonacular => {
                &[Capability::Search, Capability::FetchById]
            }
            ProviderKind::Scraper => &[Capability::FetchByUrl],
        };
        Self {
            kind,
            supports,
            responses: Arc::new(Mutex::new(Vec::new())),
            probe_result: Arc::new(Mutex::new(Ok(()))),
            delay: None,
            fetches: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_capabilities(mut self, supports: &'static [Capability]) -> Self {
        self.supports = supports;
        self
    }

    pub fn with_responses(self, responses: Vec<Result<RawContent, AppError>>) -> Self {
        *self.responses.lock().unwrap() = responses;
        self
    }

    pub fn with_error(self, error: AppError) -> Self {
        self.with_responses(vec![Err(error)])
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_probe_result(self, result: Result<(), AppError>) -> Self {
        *self.probe_result.lock().unwrap() = result;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl RecipeProvider for MockProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: self.kind,
            supports: self.supports,
            upstream: Upstream::Scraping,
        }
    }

    async fn fetch(&self, query: &RecipeQuery) -> Result<RawContent, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };
        next.unwrap_or_else(|| {
            Ok(RawContent {
                provider: self.kind,
                source: query.to_string(),
                title: None,
                body: format!("content for {query}"),
                ingredient_hints: Vec::new(),
            })
        })
    }

    async fn probe(&self) -> Result<(), AppError> {
        self.probe_result.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// MockCompletion
// ---------------------------------------------------------------------------

/// Mock completion client that replays queued replies and records requests.
#[derive(Clone)]
pub struct MockCompletion {
    /// If empty, replies with [`PASTA_REPLY`].
    replies: Arc<Mutex<Vec<Result<String, AppError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    delay: Option<Duration>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::with_replies(Vec::new())
    }

    pub fn with_replies(replies: Vec<Result<String, AppError>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionClient for MockCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Ok(PASTA_REPLY.to_string())
        } else {
            replies.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    delay: Option<Duration>,
    pub urls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            delay: None,
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.urls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Mock cleaner that passes the HTML through as page text.
#[derive(Clone)]
pub struct MockCleaner {
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockCleaner {
    pub fn passthrough() -> Self {
        Self {
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl PageCleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<CleanedPage, AppError> {
        let mut err = self.error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(CleanedPage {
            title: None,
            ingredients: Vec::new(),
            text: html.to_string(),
        })
    }
}
