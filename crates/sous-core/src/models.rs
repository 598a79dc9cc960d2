use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::rate_limit::Upstream;

/// Largest page size a search may ask the provider for.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// The normalized identity of an inbound request.
///
/// Two queries are equivalent iff their [`cache_key`](Self::cache_key)s are
/// equal; the key is what the cache and the in-flight registry are keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipeQuery {
    /// Free-text recipe-name search.
    Search {
        text: String,
        limit: u32,
        #[serde(default, skip_serializing_if = "SearchFilters::is_empty")]
        filters: SearchFilters,
    },
    /// Recipes that use the given ingredients.
    Ingredients { items: Vec<String>, limit: u32 },
    /// A recipe page to fetch directly.
    Url { url: String },
    /// An identifier native to the active provider.
    ProviderId { id: String },
}

impl RecipeQuery {
    pub fn search(text: impl Into<String>, limit: u32) -> Self {
        Self::filtered_search(text, limit, SearchFilters::default())
    }

    pub fn filtered_search(text: impl Into<String>, limit: u32, filters: SearchFilters) -> Self {
        Self::Search {
            text: text.into(),
            limit,
            filters,
        }
    }

    pub fn ingredients<S: Into<String>>(items: impl IntoIterator<Item = S>, limit: u32) -> Self {
        Self::Ingredients {
            items: items.into_iter().map(Into::into).collect(),
            limit,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn provider_id(id: impl Into<String>) -> Self {
        Self::ProviderId { id: id.into() }
    }

    /// Variant tag, also the first segment of the cache key.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::Ingredients { .. } => "ingredients",
            Self::Url { .. } => "url",
            Self::ProviderId { .. } => "id",
        }
    }

    /// Capability a provider needs to serve this query.
    pub fn required_capability(&self) -> Capability {
        match self {
            Self::Search { .. } | Self::Ingredients { .. } => Capability::Search,
            Self::Url { .. } => Capability::FetchByUrl,
            Self::ProviderId { .. } => Capability::FetchById,
        }
    }

    /// Deterministic cache key: variant tag, then normalized fields in
    /// alphabetical order.
    ///
    /// Filters only appear when set. Example: `search|limit=1|text=pasta`
    ///
    /// URLs and ids are lowercased like every other field, so two URLs that
    /// differ only in case share one entry, and whichever caller leads the
    /// execution decides the casing actually fetched.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Search {
                text,
                limit,
                filters,
            } => {
                let mut key = String::from("search");
                if let Some(cuisine) = filters.cuisine.as_deref().map(normalize) {
                    key.push_str(&format!("|cuisine={cuisine}"));
                }
                if let Some(diet) = filters.diet.as_deref().map(normalize) {
                    key.push_str(&format!("|diet={diet}"));
                }
                let intolerances = normalize_list(&filters.intolerances);
                if !intolerances.is_empty() {
                    key.push_str(&format!("|intolerances={}", intolerances.join(",")));
                }
                key.push_str(&format!("|limit={limit}"));
                if filters.random {
                    key.push_str("|random=true");
                }
                key.push_str(&format!("|text={}", normalize(text)));
                key
            }
            Self::Ingredients { items, limit } => format!(
                "ingredients|items={}|limit={limit}",
                normalize_list(items).join(",")
            ),
            Self::Url { url } => format!("url|url={}", normalize(url)),
            Self::ProviderId { id } => format!("id|id={}", normalize(id)),
        }
    }

    pub fn is_equivalent(&self, other: &RecipeQuery) -> bool {
        self.cache_key() == other.cache_key()
    }

    /// Reject queries no provider could meaningfully serve.
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Self::Search { text, limit, .. } => {
                if normalize(text).is_empty() {
                    return Err(AppError::InvalidQuery("search text is empty".into()));
                }
                check_limit(*limit)
            }
            Self::Ingredients { items, limit } => {
                if normalize_list(items).is_empty() {
                    return Err(AppError::InvalidQuery("ingredient list is empty".into()));
                }
                check_limit(*limit)
            }
            Self::Url { url } => {
                let parsed = url::Url::parse(url.trim())
                    .map_err(|e| AppError::InvalidQuery(format!("invalid URL '{url}': {e}")))?;
                match parsed.scheme() {
                    "http" | "https" => Ok(()),
                    scheme => Err(AppError::InvalidQuery(format!(
                        "URL scheme '{scheme}' is not allowed (only http/https)"
                    ))),
                }
            }
            Self::ProviderId { id } => {
                if normalize(id).is_empty() {
                    Err(AppError::InvalidQuery("recipe id is empty".into()))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl std::fmt::Display for RecipeQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search { text, limit, .. } => {
                write!(f, "search '{}' (limit {limit})", text.trim())
            }
            Self::Ingredients { items, limit } => {
                write!(f, "ingredients [{}] (limit {limit})", items.join(", "))
            }
            Self::Url { url } => write!(f, "url {}", url.trim()),
            Self::ProviderId { id } => write!(f, "id {}", id.trim()),
        }
    }
}

/// Optional narrowing of a search, passed through to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub cuisine: Option<String>,
    pub diet: Option<String>,
    #[serde(default)]
    pub intolerances: Vec<String>,
    /// Ask the provider for a shuffled result set.
    #[serde(default)]
    pub random: bool,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn check_limit(limit: u32) -> Result<(), AppError> {
    if limit == 0 || limit > MAX_SEARCH_LIMIT {
        return Err(AppError::InvalidQuery(format!(
            "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {limit}"
        )));
    }
    Ok(())
}

/// Normalized, sorted and deduplicated, blanks dropped.
fn normalize_list(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = items
        .iter()
        .map(|i| normalize(i))
        .filter(|i| !i.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Trim, lowercase and collapse inner whitespace.
fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// What a provider can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Search,
    FetchById,
    FetchByUrl,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Search => write!(f, "search"),
            Capability::FetchById => write!(f, "fetch-by-id"),
            Capability::FetchByUrl => write!(f, "fetch-by-url"),
        }
    }
}

/// The fixed set of content providers the gateway can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Structured recipe API.
    Edamam,
    /// Raw-page scraper.
    Scraper,
    /// Structured recipe API with analyzed instruction steps.
    Spoonacular,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Edamam => "edamam",
            ProviderKind::Scraper => "scraper",
            ProviderKind::Spoonacular => "spoonacular",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "edamam" | "structured" | "api" => Ok(ProviderKind::Edamam),
            "scraper" | "scraping" | "page" => Ok(ProviderKind::Scraper),
            "spoonacular" => Ok(ProviderKind::Spoonacular),
            other => Err(format!(
                "unknown provider '{other}' (expected 'edamam', 'spoonacular' or 'scraper')"
            )),
        }
    }
}

/// Capability descriptor of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub supports: &'static [Capability],
    /// Budget charged for each fetch.
    pub upstream: Upstream,
}

impl ProviderDescriptor {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.supports.contains(&capability)
    }
}

/// Content returned by a provider, not yet structured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContent {
    pub provider: ProviderKind,
    /// Source URL or provider-native identifier.
    pub source: String,
    pub title: Option<String>,
    /// Text context handed to the completion API.
    pub body: String,
    /// Ingredient lines the provider already knows about.
    pub ingredient_hints: Vec<String>,
}

/// A recipe page reduced to the parts worth sending to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedPage {
    pub title: Option<String>,
    pub ingredients: Vec<String>,
    pub text: String,
}

/// Ordered cooking instructions extracted from provider content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Cooking steps in order. Never empty.
    pub steps: Vec<String>,
    /// Ingredient lines in order. Never empty.
    pub ingredients: Vec<String>,
    pub source_provider: ProviderKind,
    pub source_url_or_id: String,
    pub title: Option<String>,
    /// SHA-256 of the raw content the extraction was made from.
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_consistency() {
        let h1 = compute_hash("boil water");
        let h2 = compute_hash("boil water");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_hash("drain"));
    }

    #[test]
    fn cache_key_normalizes_fields() {
        let a = RecipeQuery::search("  Pasta   Carbonara ", 3);
        let b = RecipeQuery::search("pasta carbonara", 3);
        assert_eq!(a.cache_key(), "search|limit=3|text=pasta carbonara");
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn cache_key_depends_on_limit() {
        let a = RecipeQuery::search("pasta", 1);
        let b = RecipeQuery::search("pasta", 2);
        assert!(!a.is_equivalent(&b));
    }

    #[test]
    fn cache_key_separates_variants() {
        let text = "https://example.com/pasta";
        let search = RecipeQuery::search(text, 1);
        let url = RecipeQuery::url(text);
        let id = RecipeQuery::provider_id(text);
        assert_ne!(search.cache_key(), url.cache_key());
        assert_ne!(url.cache_key(), id.cache_key());
        assert!(url.cache_key().starts_with("url|"));
        assert!(id.cache_key().starts_with("id|"));
    }

    #[test]
    fn validate_rejects_bad_queries() {
        assert!(matches!(
            RecipeQuery::search("   ", 1).validate(),
            Err(AppError::InvalidQuery(_))
        ));
        assert!(RecipeQuery::search("pasta", 0).validate().is_err());
        assert!(RecipeQuery::search("pasta", 101).validate().is_err());
        assert!(RecipeQuery::search("pasta", 100).validate().is_ok());
        assert!(RecipeQuery::url("file:///etc/passwd").validate().is_err());
        assert!(RecipeQuery::url("not a url").validate().is_err());
        assert!(RecipeQuery::url(" https://example.com/r/1 ").validate().is_ok());
        assert!(RecipeQuery::provider_id("").validate().is_err());
    }

    #[test]
    fn required_capability_per_variant() {
        assert_eq!(
            RecipeQuery::search("x", 1).required_capability(),
            Capability::Search
        );
        assert_eq!(
            RecipeQuery::url("https://a.b").required_capability(),
            Capability::FetchByUrl
        );
        assert_eq!(
            RecipeQuery::provider_id("abc").required_capability(),
            Capability::FetchById
        );
    }

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!("EDAMAM".parse::<ProviderKind>(), Ok(ProviderKind::Edamam));
        assert_eq!("scraping".parse::<ProviderKind>(), Ok(ProviderKind::Scraper));
        assert_eq!(
            " Spoonacular ".parse::<ProviderKind>(),
            Ok(ProviderKind::Spoonacular)
        );
        assert!("spoon".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn filters_extend_search_key_only_when_set() {
        let filters = SearchFilters {
            cuisine: Some(" Italian ".into()),
            diet: Some("Vegetarian".into()),
            intolerances: vec!["Gluten".into(), "dairy".into()],
            random: true,
        };
        let filtered = RecipeQuery::filtered_search("Pasta", 2, filters);
        assert_eq!(
            filtered.cache_key(),
            "search|cuisine=italian|diet=vegetarian|intolerances=dairy,gluten\
             |limit=2|random=true|text=pasta"
        );
        assert!(!filtered.is_equivalent(&RecipeQuery::search("pasta", 2)));
        assert_eq!(
            RecipeQuery::filtered_search("pasta", 2, SearchFilters::default()).cache_key(),
            "search|limit=2|text=pasta"
        );
    }

    #[test]
    fn ingredient_key_ignores_order_and_case() {
        let a = RecipeQuery::ingredients(["Tomato", " basil ", "tomato"], 4);
        let b = RecipeQuery::ingredients(["basil", "TOMATO"], 4);
        assert_eq!(a.cache_key(), "ingredients|items=basil,tomato|limit=4");
        assert!(a.is_equivalent(&b));
        assert_ne!(a.cache_key(), RecipeQuery::search("basil,tomato", 4).cache_key());
        assert_eq!(a.required_capability(), Capability::Search);
        assert_eq!(a.tag(), "ingredients");
    }

    #[test]
    fn ingredient_query_needs_an_item() {
        assert!(matches!(
            RecipeQuery::ingredients([" ", ""], 1).validate(),
            Err(AppError::InvalidQuery(_))
        ));
        assert!(RecipeQuery::ingredients(["egg"], 0).validate().is_err());
        assert!(RecipeQuery::ingredients(["egg"], 1).validate().is_ok());
    }

    #[test]
    fn url_keys_fold_case() {
        let upper = RecipeQuery::url("https://Example.com/Recipes/Pasta");
        let lower = RecipeQuery::url("https://example.com/recipes/pasta");
        assert_eq!(upper.cache_key(), lower.cache_key());
    }

    #[test]
    fn query_serializes_with_type_tag() {
        let json = serde_json::to_value(RecipeQuery::search("pasta", 1)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "search", "text": "pasta", "limit": 1})
        );
        let back: RecipeQuery =
            serde_json::from_value(serde_json::json!({"type": "search", "text": "pasta", "limit": 1}))
                .unwrap();
        assert_eq!(back, RecipeQuery::search("pasta", 1));
    }
}
