use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sous_core::{BudgetSnapshot, SearchFilters, Served, ServiceStats};

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const DEFAULT_RANDOM_LIMIT: u32 = 5;

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SearchParams {
    /// Ingredient or recipe name to search for
    pub query: String,
    /// How many provider hits to consider (default 10)
    pub limit: Option<u32>,
    /// Cuisine, e.g. `italian`
    pub cuisine: Option<String>,
    /// Diet, e.g. `vegetarian`
    pub diet: Option<String>,
    /// Comma-separated intolerances, e.g. `gluten,dairy`
    pub intolerances: Option<String>,
}

impl SearchParams {
    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            cuisine: non_blank(self.cuisine.as_deref()),
            diet: non_blank(self.diet.as_deref()),
            intolerances: split_list(self.intolerances.as_deref()),
            random: false,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct IngredientsParams {
    /// Comma-separated ingredients, e.g. `tomato,basil`
    pub ingredients: String,
    /// How many provider hits to consider (default 10)
    pub limit: Option<u32>,
}

impl IngredientsParams {
    pub fn items(&self) -> Vec<String> {
        split_list(Some(&self.ingredients))
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct RandomParams {
    /// How many provider hits to consider (default 5)
    pub limit: Option<u32>,
    /// Comma-separated tags, e.g. `vegetarian,dessert`
    pub tags: Option<String>,
}

impl RandomParams {
    /// Search text for a random pick: the tags, or `random` without any.
    pub fn search_text(&self) -> String {
        let tags = split_list(self.tags.as_deref());
        if tags.is_empty() {
            "random".to_string()
        } else {
            tags.join(" ")
        }
    }

    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            random: true,
            ..SearchFilters::default()
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Comma-separated values, trimmed, blanks dropped.
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct UrlParams {
    /// Recipe page to scrape
    pub url: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RecipeResponse {
    pub title: Option<String>,
    pub steps: Vec<String>,
    pub ingredients: Vec<String>,
    pub source_provider: String,
    pub source_url_or_id: String,
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
    /// True when served from the cache without touching any upstream
    pub cached: bool,
}

impl From<Served> for RecipeResponse {
    fn from(served: Served) -> Self {
        let r = served.result;
        Self {
            title: r.title,
            steps: r.steps,
            ingredients: r.ingredients,
            source_provider: r.source_provider.to_string(),
            source_url_or_id: r.source_url_or_id,
            content_hash: r.content_hash,
            extracted_at: r.extracted_at,
            cached: served.cached,
        }
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProbeResponse {
    pub provider: String,
    pub status: &'static str,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BudgetResponse {
    pub upstream: String,
    pub count: u32,
    pub limit: u32,
    pub window_remaining_secs: u64,
}

impl From<BudgetSnapshot> for BudgetResponse {
    fn from(b: BudgetSnapshot) -> Self {
        Self {
            upstream: b.upstream.to_string(),
            count: b.count,
            limit: b.limit,
            window_remaining_secs: b.window_remaining.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub provider: String,
    pub cache_entries: u64,
    pub in_flight: usize,
    pub budgets: Vec<BudgetResponse>,
}

impl From<ServiceStats> for HealthResponse {
    fn from(stats: ServiceStats) -> Self {
        Self {
            status: "ok",
            provider: stats.provider.to_string(),
            cache_entries: stats.cache_entries,
            in_flight: stats.in_flight,
            budgets: stats.budgets.into_iter().map(BudgetResponse::from).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Seconds until the exhausted budget resets (rate-limited responses only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random(tags: Option<&str>) -> RandomParams {
        RandomParams {
            limit: None,
            tags: tags.map(String::from),
        }
    }

    #[test]
    fn random_without_tags_searches_random() {
        assert_eq!(random(None).search_text(), "random");
        assert_eq!(random(Some(" , ")).search_text(), "random");
    }

    #[test]
    fn search_filters_ignore_blanks() {
        let params = SearchParams {
            query: "pasta".into(),
            limit: None,
            cuisine: Some(" Italian ".into()),
            diet: Some("  ".into()),
            intolerances: Some("gluten, ,dairy".into()),
        };
        assert_eq!(
            params.filters(),
            SearchFilters {
                cuisine: Some("Italian".into()),
                diet: None,
                intolerances: vec!["gluten".into(), "dairy".into()],
                random: false,
            }
        );
    }

    #[test]
    fn ingredient_list_is_split_on_commas() {
        let params = IngredientsParams {
            ingredients: "tomato, basil,,".into(),
            limit: None,
        };
        assert_eq!(params.items(), vec!["tomato", "basil"]);
    }

    #[test]
    fn random_tags_become_search_text() {
        assert_eq!(
            random(Some("vegetarian, dessert,")).search_text(),
            "vegetarian dessert"
        );
    }
}
