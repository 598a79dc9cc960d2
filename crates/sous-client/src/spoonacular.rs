//! Spoonacular recipe API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sous_core::{
    AppError, Capability, ProviderDescriptor, ProviderKind, RawContent, RecipeProvider,
    RecipeQuery, SearchFilters, SpoonacularConfig, Upstream,
};
use url::Url;

use crate::http::{excerpt, send_error, status_error};

const CAPABILITIES: &[Capability] = &[Capability::Search, Capability::FetchById];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Recipe>,
}

#[derive(Debug, Deserialize)]
struct RandomResponse {
    #[serde(default)]
    recipes: Vec<Recipe>,
}

/// One row of `findByIngredients`; only the id is needed.
#[derive(Debug, Deserialize)]
struct IngredientMatch {
    id: u64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipe {
    id: u64,
    #[serde(default)]
    title: String,
    source_url: Option<String>,
    source_name: Option<String>,
    servings: Option<u32>,
    ready_in_minutes: Option<u32>,
    #[serde(default)]
    cuisines: Vec<String>,
    #[serde(default)]
    dish_types: Vec<String>,
    /// Free-form HTML method, present on most recipes.
    instructions: Option<String>,
    #[serde(default)]
    analyzed_instructions: Vec<InstructionBlock>,
    #[serde(default)]
    extended_ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InstructionBlock {
    #[serde(default)]
    name: String,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Step {
    #[serde(default)]
    step: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Ingredient {
    #[serde(default)]
    original: String,
}

impl Recipe {
    /// Method text: analyzed steps when Spoonacular has them, otherwise the
    /// HTML instructions converted to text.
    fn method(&self) -> Option<String> {
        let mut lines = Vec::new();
        for block in &self.analyzed_instructions {
            if !block.name.trim().is_empty() {
                lines.push(format!("{}:", block.name.trim()));
            }
            lines.extend(
                block
                    .steps
                    .iter()
                    .map(|s| s.step.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| format!("- {s}")),
            );
        }
        if !lines.is_empty() {
            return Some(lines.join("\n"));
        }
        let html = self.instructions.as_deref()?.trim();
        if html.is_empty() {
            return None;
        }
        Some(htmd::convert(html).unwrap_or_else(|_| html.to_string()))
    }
}

/// Structured recipe API provider with its own instruction analysis.
#[derive(Clone)]
pub struct SpoonacularProvider {
    client: Client,
    config: SpoonacularConfig,
}

impl SpoonacularProvider {
    pub fn new(config: SpoonacularConfig, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str, extra: Vec<(&str, String)>) -> Result<Url, AppError> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut params = vec![("apiKey", self.config.api_key.clone())];
        params.extend(extra);
        Url::parse_with_params(&format!("{base}{path}"), &params)
            .map_err(|e| AppError::ConfigError(format!("invalid SPOONACULAR_BASE_URL: {e}")))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| send_error("spoonacular", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("recipe not found on spoonacular".into()));
        }
        if status == StatusCode::PAYMENT_REQUIRED {
            return Err(AppError::UpstreamRejected {
                status: status.as_u16(),
                message: "spoonacular daily quota exhausted".into(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("spoonacular", status, excerpt(&body)));
        }

        response.json().await.map_err(|e| {
            AppError::MalformedUpstreamOutput(format!("unexpected spoonacular response: {e}"))
        })
    }

    async fn search(
        &self,
        text: &str,
        limit: u32,
        filters: &SearchFilters,
    ) -> Result<Recipe, AppError> {
        let recipes = if filters.random {
            self.random(text, limit, filters).await?
        } else {
            let mut params = vec![
                ("query", text.to_string()),
                ("number", limit.to_string()),
                ("addRecipeInformation", "true".to_string()),
                ("fillIngredients", "true".to_string()),
            ];
            if let Some(cuisine) = &filters.cuisine {
                params.push(("cuisine", cuisine.trim().to_string()));
            }
            if let Some(diet) = &filters.diet {
                params.push(("diet", diet.trim().to_string()));
            }
            if !filters.intolerances.is_empty() {
                params.push(("intolerances", join_trimmed(&filters.intolerances)));
            }
            let url = self.endpoint("/recipes/complexSearch", params)?;
            let response: SearchResponse = self.get(url).await?;
            response.results
        };
        tracing::debug!(query = text, hits = recipes.len(), "Spoonacular search");
        recipes
            .into_iter()
            .take(limit as usize)
            .find(|recipe| !recipe.title.trim().is_empty())
            .ok_or_else(|| AppError::NotFound(format!("no recipes match '{text}'")))
    }

    /// `/recipes/random` takes tags rather than a query; each word of the
    /// search text is one, unless the text is the placeholder "random".
    async fn random(
        &self,
        text: &str,
        limit: u32,
        filters: &SearchFilters,
    ) -> Result<Vec<Recipe>, AppError> {
        let mut tags: Vec<String> = Vec::new();
        if !text.trim().eq_ignore_ascii_case("random") {
            tags.extend(text.split_whitespace().map(str::to_lowercase));
        }
        tags.extend(filters.cuisine.iter().map(|c| c.trim().to_lowercase()));
        tags.extend(filters.diet.iter().map(|d| d.trim().to_lowercase()));
        let mut params = vec![("number", limit.to_string())];
        if !tags.is_empty() {
            params.push(("tags", tags.join(",")));
        }
        let url = self.endpoint("/recipes/random", params)?;
        let response: RandomResponse = self.get(url).await?;
        Ok(response.recipes)
    }

    async fn by_ingredients(&self, items: &[String], limit: u32) -> Result<Recipe, AppError> {
        let ingredients = join_trimmed(items);
        let url = self.endpoint(
            "/recipes/findByIngredients",
            vec![
                ("ingredients", ingredients.clone()),
                ("number", limit.to_string()),
                ("ranking", "1".to_string()),
                ("ignorePantry", "true".to_string()),
            ],
        )?;
        let matches: Vec<IngredientMatch> = self.get(url).await?;
        tracing::debug!(%ingredients, hits = matches.len(), "Spoonacular ingredient search");
        let best = matches
            .into_iter()
            .take(limit as usize)
            .find(|m| !m.title.trim().is_empty())
            .ok_or_else(|| AppError::NotFound(format!("no recipes use {ingredients}")))?;
        self.by_id(best.id).await
    }

    async fn by_id(&self, id: u64) -> Result<Recipe, AppError> {
        let url = self.endpoint(
            &format!("/recipes/{id}/information"),
            vec![("includeNutrition", "false".to_string())],
        )?;
        self.get(url).await
    }

    fn to_raw(recipe: Recipe) -> RawContent {
        let mut body = String::new();
        body.push_str(&format!("Recipe: {}\n", recipe.title.trim()));
        if let Some(source) = &recipe.source_name {
            body.push_str(&format!("Publisher: {source}\n"));
        }
        if let Some(url) = &recipe.source_url {
            body.push_str(&format!("Source page: {url}\n"));
        }
        if let Some(servings) = recipe.servings.filter(|s| *s > 0) {
            body.push_str(&format!("Servings: {servings}\n"));
        }
        if let Some(minutes) = recipe.ready_in_minutes.filter(|m| *m > 0) {
            body.push_str(&format!("Ready in: {minutes} minutes\n"));
        }
        if !recipe.cuisines.is_empty() {
            body.push_str(&format!("Cuisine: {}\n", recipe.cuisines.join(", ")));
        }
        if !recipe.dish_types.is_empty() {
            body.push_str(&format!("Dish: {}\n", recipe.dish_types.join(", ")));
        }
        if let Some(method) = recipe.method() {
            body.push_str("\nInstructions:\n");
            body.push_str(&method);
        }

        RawContent {
            provider: ProviderKind::Spoonacular,
            source: recipe.id.to_string(),
            title: Some(recipe.title.trim().to_string()).filter(|t| !t.is_empty()),
            body,
            ingredient_hints: recipe
                .extended_ingredients
                .into_iter()
                .map(|i| i.original.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect(),
        }
    }
}

fn join_trimmed(items: &[String]) -> String {
    items
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

impl RecipeProvider for SpoonacularProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::Spoonacular,
            supports: CAPABILITIES,
            upstream: Upstream::Scraping,
        }
    }

    async fn fetch(&self, query: &RecipeQuery) -> Result<RawContent, AppError> {
        let recipe = match query {
            RecipeQuery::Search {
                text,
                limit,
                filters,
            } => self.search(text.trim(), *limit, filters).await?,
            RecipeQuery::Ingredients { items, limit } => {
                self.by_ingredients(items, *limit).await?
            }
            RecipeQuery::ProviderId { id } => {
                let numeric = id.trim().parse::<u64>().map_err(|_| {
                    AppError::InvalidQuery(format!("spoonacular ids are numeric, got '{id}'"))
                })?;
                self.by_id(numeric).await?
            }
            RecipeQuery::Url { .. } => {
                return Err(AppError::ConfigError(
                    "spoonacular does not support fetch-by-url queries".into(),
                ));
            }
        };
        Ok(Self::to_raw(recipe))
    }

    async fn probe(&self) -> Result<(), AppError> {
        let url = self.endpoint(
            "/recipes/complexSearch",
            vec![("query", "salt".to_string()), ("number", "1".to_string())],
        )?;
        let _: SearchResponse = self.get(url).await?;
        Ok(())
    }
}
