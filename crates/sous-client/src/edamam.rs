//! Edamam recipe search API (v2).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sous_core::{
    AppError, Capability, EdamamConfig, Fetcher, PageCleaner, ProviderDescriptor, ProviderKind,
    RawContent, RecipeProvider, RecipeQuery, SearchFilters, Upstream,
};
use tokio::time::Instant;
use url::Url;

use crate::http::{excerpt, send_error, status_error};

const CAPABILITIES: &[Capability] = &[Capability::Search, Capability::FetchById];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    recipe: Recipe,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipe {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    label: String,
    /// Publisher page the recipe was indexed from.
    url: Option<String>,
    source: Option<String>,
    #[serde(default)]
    ingredient_lines: Vec<String>,
    #[serde(rename = "yield")]
    servings: Option<f64>,
    total_time: Option<f64>,
    #[serde(default)]
    cuisine_type: Vec<String>,
    #[serde(default)]
    dish_type: Vec<String>,
}

impl Recipe {
    /// The short id Edamam uses in `/api/recipes/v2/{id}`.
    fn id(&self) -> Option<&str> {
        self.uri
            .rsplit_once("#recipe_")
            .map(|(_, id)| id)
            .filter(|id| !id.is_empty())
    }
}

/// Structured recipe API provider.
///
/// Edamam indexes recipe metadata and ingredient lines but not the method, so
/// when a hit links to its publisher page that page is downloaded and cleaned
/// for the instruction text. If the page cannot be read before the page
/// deadline, the metadata alone is handed on.
#[derive(Clone)]
pub struct EdamamProvider<F: Fetcher, C: PageCleaner> {
    client: Client,
    config: EdamamConfig,
    pages: Option<(F, C)>,
    /// Measured from the start of a fetch; the page read is abandoned past it.
    page_deadline: Duration,
}

impl<F: Fetcher, C: PageCleaner> EdamamProvider<F, C> {
    pub fn new(config: EdamamConfig, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            pages: None,
            page_deadline: timeout.mul_f32(0.75),
        })
    }

    /// Read instruction text from each hit's publisher page.
    pub fn with_source_pages(mut self, fetcher: F, cleaner: C) -> Self {
        self.pages = Some((fetcher, cleaner));
        self
    }

    fn endpoint(&self, id: Option<&str>, extra: Vec<(&str, String)>) -> Result<Url, AppError> {
        let base = self.config.base_url.trim_end_matches('/');
        let path = match id {
            Some(id) => format!("{base}/api/recipes/v2/{id}"),
            None => format!("{base}/api/recipes/v2"),
        };
        let mut params = vec![
            ("type", "public".to_string()),
            ("app_id", self.config.app_id.clone()),
            ("app_key", self.config.app_key.clone()),
        ];
        params.extend(extra);
        Url::parse_with_params(&path, &params)
            .map_err(|e| AppError::ConfigError(format!("invalid EDAMAM_BASE_URL: {e}")))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| send_error("edamam", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("recipe not found on edamam".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("edamam", status, excerpt(&body)));
        }

        response.json().await.map_err(|e| {
            AppError::MalformedUpstreamOutput(format!("unexpected edamam response: {e}"))
        })
    }

    async fn search(
        &self,
        text: &str,
        limit: u32,
        filters: &SearchFilters,
    ) -> Result<Recipe, AppError> {
        let mut params = vec![("q", text.to_string())];
        if let Some(cuisine) = &filters.cuisine {
            params.push(("cuisineType", cuisine.trim().to_string()));
        }
        if let Some(diet) = &filters.diet {
            params.push(("diet", diet.trim().to_lowercase()));
        }
        for intolerance in &filters.intolerances {
            params.push(("health", format!("{}-free", intolerance.trim().to_lowercase())));
        }
        if filters.random {
            params.push(("random", "true".to_string()));
        }
        let url = self.endpoint(None, params)?;
        let response: SearchResponse = self.get(url).await?;
        tracing::debug!(query = text, hits = response.hits.len(), "Edamam search");
        response
            .hits
            .into_iter()
            .take(limit as usize)
            .map(|hit| hit.recipe)
            .find(|recipe| !recipe.label.trim().is_empty())
            .ok_or_else(|| AppError::NotFound(format!("no recipes match '{text}'")))
    }

    async fn by_id(&self, id: &str) -> Result<Recipe, AppError> {
        let id = id.trim().to_lowercase();
        let url = self.endpoint(Some(&id), Vec::new())?;
        let hit: Hit = self.get(url).await?;
        Ok(hit.recipe)
    }

    /// Instruction text from the publisher page, if it can be had by `deadline`.
    async fn source_text(&self, recipe: &Recipe, deadline: Instant) -> Option<String> {
        let (fetcher, cleaner) = self.pages.as_ref()?;
        let url = recipe.url.as_deref()?;
        let page = match tokio::time::timeout_at(deadline, fetcher.fetch(url)).await {
            Ok(Ok(html)) => cleaner.clean(&html),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::UpstreamUnavailable(format!(
                "publisher page not read within {}s",
                self.page_deadline.as_secs_f32()
            ))),
        };
        match page {
            Ok(page) => Some(page.text),
            Err(e) => {
                tracing::warn!(url, error = %e, "Publisher page unavailable, using metadata only");
                None
            }
        }
    }

    async fn to_raw(&self, recipe: Recipe, fallback_source: &str, deadline: Instant) -> RawContent {
        let mut body = String::new();
        body.push_str(&format!("Recipe: {}\n", recipe.label.trim()));
        if let Some(source) = &recipe.source {
            body.push_str(&format!("Publisher: {source}\n"));
        }
        if let Some(servings) = recipe.servings.filter(|s| *s > 0.0) {
            body.push_str(&format!("Servings: {servings}\n"));
        }
        if let Some(minutes) = recipe.total_time.filter(|t| *t > 0.0) {
            body.push_str(&format!("Total time: {minutes} minutes\n"));
        }
        if !recipe.cuisine_type.is_empty() {
            body.push_str(&format!("Cuisine: {}\n", recipe.cuisine_type.join(", ")));
        }
        if !recipe.dish_type.is_empty() {
            body.push_str(&format!("Dish: {}\n", recipe.dish_type.join(", ")));
        }
        if let Some(text) = self.source_text(&recipe, deadline).await {
            body.push_str("\nMethod from the publisher page:\n");
            body.push_str(&text);
        }

        let source = recipe
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| fallback_source.to_string());
        RawContent {
            provider: ProviderKind::Edamam,
            source,
            title: Some(recipe.label.trim().to_string()).filter(|t| !t.is_empty()),
            body,
            ingredient_hints: recipe.ingredient_lines,
        }
    }
}

impl<F: Fetcher, C: PageCleaner> RecipeProvider for EdamamProvider<F, C> {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::Edamam,
            supports: CAPABILITIES,
            upstream: Upstream::Scraping,
        }
    }

    async fn fetch(&self, query: &RecipeQuery) -> Result<RawContent, AppError> {
        let deadline = Instant::now() + self.page_deadline;
        match query {
            RecipeQuery::Search {
                text,
                limit,
                filters,
            } => {
                let recipe = self.search(text.trim(), *limit, filters).await?;
                Ok(self.to_raw(recipe, text, deadline).await)
            }
            RecipeQuery::Ingredients { items, limit } => {
                let text = items
                    .iter()
                    .map(|i| i.trim())
                    .filter(|i| !i.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                let recipe = self.search(&text, *limit, &SearchFilters::default()).await?;
                Ok(self.to_raw(recipe, &text, deadline).await)
            }
            RecipeQuery::ProviderId { id } => {
                let recipe = self.by_id(id).await?;
                Ok(self.to_raw(recipe, id, deadline).await)
            }
            RecipeQuery::Url { .. } => Err(AppError::ConfigError(
                "edamam does not support fetch-by-url queries".into(),
            )),
        }
    }

    async fn probe(&self) -> Result<(), AppError> {
        let url = self.endpoint(None, vec![("q", "salt".to_string())])?;
        let _: SearchResponse = self.get(url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sous_core::CallPolicy;
    use sous_core::gateway::ProviderGateway;
    use sous_core::testutil::{MockCleaner, MockFetcher};
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(server: &MockServer) -> EdamamProvider<MockFetcher, MockCleaner> {
        EdamamProvider::new(
            EdamamConfig {
                app_id: "app".into(),
                app_key: "secret".into(),
                base_url: server.uri(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn recipe_json(id: &str, label: &str) -> serde_json::Value {
        json!({
            "uri": format!("http://www.edamam.com/ontologies/edamam.owl#recipe_{id}"),
            "label": label,
            "url": "https://publisher.example/pasta",
            "source": "Publisher",
            "yield": 2.0,
            "totalTime": 20.0,
            "ingredientLines": ["200g pasta", "1 l water", "salt"]
        })
    }

    #[tokio::test]
    async fn search_uses_top_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2"))
            .and(query_param("type", "public"))
            .and(query_param("q", "pasta"))
            .and(query_param("app_id", "app"))
            .and(query_param("app_key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [
                    {"recipe": recipe_json("abc123", "Simple Pasta")},
                    {"recipe": recipe_json("def456", "Other Pasta")}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let raw = provider(&server)
            .fetch(&RecipeQuery::search(" pasta ", 1))
            .await
            .unwrap();

        assert_eq!(raw.provider, ProviderKind::Edamam);
        assert_eq!(raw.source, "abc123");
        assert_eq!(raw.title.as_deref(), Some("Simple Pasta"));
        assert_eq!(raw.ingredient_hints, vec!["200g pasta", "1 l water", "salt"]);
        assert!(raw.body.contains("Recipe: Simple Pasta"));
        assert!(raw.body.contains("Total time: 20 minutes"));
    }

    #[tokio::test]
    async fn empty_hits_are_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": []})))
            .mount(&server)
            .await;

        let err = provider(&server)
            .fetch(&RecipeQuery::search("unobtainium", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_by_id_lowercases_the_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2/abc123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"recipe": recipe_json("abc123", "Simple Pasta")})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let raw = provider(&server)
            .fetch(&RecipeQuery::provider_id("ABC123"))
            .await
            .unwrap();
        assert_eq!(raw.source, "abc123");
    }

    #[tokio::test]
    async fn statuses_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2/denied"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized app_id"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2/busy"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert!(matches!(
            provider.fetch(&RecipeQuery::provider_id("missing")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            provider.fetch(&RecipeQuery::provider_id("denied")).await,
            Err(AppError::UpstreamRejected { status: 401, .. })
        ));
        assert!(matches!(
            provider.fetch(&RecipeQuery::provider_id("busy")).await,
            Err(AppError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn publisher_page_text_is_appended() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{"recipe": recipe_json("abc123", "Simple Pasta")}]
            })))
            .mount(&server)
            .await;

        let fetcher = MockFetcher::new("Boil water. Add pasta. Drain.");
        let raw = provider(&server)
            .with_source_pages(fetcher.clone(), MockCleaner::passthrough())
            .fetch(&RecipeQuery::search("pasta", 1))
            .await
            .unwrap();

        assert!(raw.body.contains("Method from the publisher page:\nBoil water."));
        assert_eq!(
            fetcher.urls.lock().unwrap().as_slice(),
            ["https://publisher.example/pasta".to_string()]
        );
    }

    #[tokio::test]
    async fn unreadable_publisher_page_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{"recipe": recipe_json("abc123", "Simple Pasta")}]
            })))
            .mount(&server)
            .await;

        let raw = provider(&server)
            .with_source_pages(
                MockFetcher::with_error(AppError::UpstreamRejected {
                    status: 403,
                    message: "bot check".into(),
                }),
                MockCleaner::passthrough(),
            )
            .fetch(&RecipeQuery::search("pasta", 1))
            .await
            .unwrap();

        assert!(!raw.body.contains("Method from the publisher page"));
        assert!(raw.body.contains("Recipe: Simple Pasta"));
    }

    #[tokio::test]
    async fn slow_publisher_page_falls_back_to_metadata_within_the_call_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{"recipe": recipe_json("abc123", "Simple Pasta")}]
            })))
            .mount(&server)
            .await;

        let timeout = Duration::from_secs(1);
        let provider = EdamamProvider::new(
            EdamamConfig {
                app_id: "app".into(),
                app_key: "secret".into(),
                base_url: server.uri(),
            },
            timeout,
        )
        .unwrap()
        .with_source_pages(
            MockFetcher::new("too late").with_delay(Duration::from_secs(10)),
            MockCleaner::passthrough(),
        );
        let gateway = ProviderGateway::new(
            provider,
            CallPolicy::new(timeout).with_retry_delay(Duration::ZERO),
        );

        let raw = gateway
            .fetch(&RecipeQuery::search("pasta", 1))
            .await
            .expect("metadata should be served before the call times out");
        assert!(raw.body.contains("Recipe: Simple Pasta"));
        assert!(!raw.body.contains("too late"));
        assert_eq!(raw.ingredient_hints.len(), 3);
    }

    #[tokio::test]
    async fn filters_become_edamam_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2"))
            .and(query_param("q", "pasta"))
            .and(query_param("cuisineType", "Italian"))
            .and(query_param("diet", "balanced"))
            .and(query_param("health", "gluten-free"))
            .and(query_param("random", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{"recipe": recipe_json("abc123", "Simple Pasta")}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let filters = SearchFilters {
            cuisine: Some("Italian".into()),
            diet: Some("Balanced".into()),
            intolerances: vec!["Gluten".into()],
            random: true,
        };
        let raw = provider(&server)
            .fetch(&RecipeQuery::filtered_search("pasta", 1, filters))
            .await
            .unwrap();
        assert_eq!(raw.source, "abc123");
    }

    #[tokio::test]
    async fn ingredient_query_searches_the_joined_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2"))
            .and(query_param("q", "tomato basil"))
            .and(query_param_is_missing("random"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{"recipe": recipe_json("tb1", "Tomato Basil Pasta")}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let raw = provider(&server)
            .fetch(&RecipeQuery::ingredients(["tomato", " basil "], 3))
            .await
            .unwrap();
        assert_eq!(raw.title.as_deref(), Some("Tomato Basil Pasta"));
    }

    #[tokio::test]
    async fn probe_reports_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/recipes/v2"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        assert!(matches!(
            provider(&server).probe().await,
            Err(AppError::UpstreamRejected { status: 403, .. })
        ));
    }
}
