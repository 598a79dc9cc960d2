use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::error::AppError;
use crate::models::ProviderKind;
use crate::rate_limit::RateLimitConfig;

/// Completion API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Structured recipe API credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdamamConfig {
    pub app_id: String,
    pub app_key: String,
    pub base_url: String,
}

/// Spoonacular API credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoonacularConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Page scraper settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScraperConfig {
    pub probe_url: String,
    pub allow_private_urls: bool,
}

/// Everything the service reads from its environment, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub provider: ProviderKind,
    pub cache: CacheConfig,
    pub cache_sweep_interval: Duration,
    pub rate_limits: RateLimitConfig,
    pub upstream_timeout: Duration,
    pub completion_timeout: Duration,
    pub host: String,
    pub port: u16,
    pub openai: OpenAiConfig,
    /// Present whenever both credentials are set; required for `edamam`.
    pub edamam: Option<EdamamConfig>,
    /// Present whenever the key is set; required for `spoonacular`.
    pub spoonacular: Option<SpoonacularConfig>,
    pub scraper: ScraperConfig,
}

impl ServiceConfig {
    /// Read configuration from environment variables.
    ///
    /// - `OPENAI_API_KEY` (required)
    /// - `EDAMAM_APP_ID`, `EDAMAM_API_KEY` (required when `API_PROVIDER=edamam`)
    /// - `SPOONACULAR_API_KEY` (required when `API_PROVIDER=spoonacular`)
    /// - everything else optional, see [`ServiceConfig::from_lookup`]
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("API_PROVIDER") {
            None => ProviderKind::Edamam,
            Some(raw) => ProviderKind::from_str(&raw)
                .map_err(|e| AppError::ConfigError(format!("Invalid API_PROVIDER: {e}")))?,
        };

        let openai = OpenAiConfig {
            api_key: get("OPENAI_API_KEY").ok_or_else(|| {
                AppError::ConfigError(
                    "OPENAI_API_KEY not set. Required for instruction extraction.".into(),
                )
            })?,
            model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        };

        let edamam = match (get("EDAMAM_APP_ID"), get("EDAMAM_API_KEY")) {
            (Some(app_id), Some(app_key)) => Some(EdamamConfig {
                app_id,
                app_key,
                base_url: get("EDAMAM_BASE_URL")
                    .unwrap_or_else(|| "https://api.edamam.com".to_string()),
            }),
            _ => None,
        };

        let spoonacular = get("SPOONACULAR_API_KEY").map(|api_key| SpoonacularConfig {
            api_key,
            base_url: get("SPOONACULAR_BASE_URL")
                .unwrap_or_else(|| "https://api.spoonacular.com".to_string()),
        });

        let config = Self {
            provider,
            cache: CacheConfig {
                ttl: Duration::from_secs(parse_positive(&get, "CACHE_TTL", 86_400)?),
                max_entries: parse_positive(&get, "CACHE_MAX_ENTRIES", 10_000)?,
            },
            cache_sweep_interval: Duration::from_secs(parse_positive(
                &get,
                "CACHE_SWEEP_INTERVAL",
                300,
            )?),
            rate_limits: RateLimitConfig {
                scraping_per_minute: parse_positive(&get, "SCRAPING_RATE_LIMIT", 100)?,
                completion_per_minute: parse_positive(&get, "OPENAI_RATE_LIMIT", 20)?,
            },
            upstream_timeout: Duration::from_secs(parse_positive(&get, "UPSTREAM_TIMEOUT", 15)?),
            completion_timeout: Duration::from_secs(parse_positive(
                &get,
                "COMPLETION_TIMEOUT",
                25,
            )?),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_positive(&get, "PORT", 8000)?,
            openai,
            edamam,
            spoonacular,
            scraper: ScraperConfig {
                probe_url: get("SCRAPER_PROBE_URL")
                    .unwrap_or_else(|| "https://www.allrecipes.com/".to_string()),
                allow_private_urls: parse_bool(&get, "ALLOW_PRIVATE_URLS")?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.provider == ProviderKind::Edamam && self.edamam.is_none() {
            return Err(AppError::ConfigError(
                "EDAMAM_APP_ID and EDAMAM_API_KEY must both be set when API_PROVIDER=edamam"
                    .into(),
            ));
        }
        if self.provider == ProviderKind::Spoonacular && self.spoonacular.is_none() {
            return Err(AppError::ConfigError(
                "SPOONACULAR_API_KEY must be set when API_PROVIDER=spoonacular".into(),
            ));
        }
        for (key, value) in [
            ("OPENAI_BASE_URL", self.openai.base_url.as_str()),
            ("SCRAPER_PROBE_URL", self.scraper.probe_url.as_str()),
        ] {
            url::Url::parse(value)
                .map_err(|e| AppError::ConfigError(format!("Invalid {key} '{value}': {e}")))?;
        }
        if let Some(edamam) = &self.edamam {
            url::Url::parse(&edamam.base_url).map_err(|e| {
                AppError::ConfigError(format!("Invalid EDAMAM_BASE_URL '{}': {e}", edamam.base_url))
            })?;
        }
        if let Some(spoonacular) = &self.spoonacular {
            url::Url::parse(&spoonacular.base_url).map_err(|e| {
                AppError::ConfigError(format!(
                    "Invalid SPOONACULAR_BASE_URL '{}': {e}",
                    spoonacular.base_url
                ))
            })?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_positive<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr + PartialEq + Default,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => {
            let parsed: T = raw.parse().map_err(|_| {
                AppError::ConfigError(format!("Invalid {key} '{raw}': must be a positive integer"))
            })?;
            if parsed == T::default() {
                return Err(AppError::ConfigError(format!("{key} must be at least 1")));
            }
            Ok(parsed)
        }
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, AppError> {
    match get(key).map(|v| v.to_lowercase()).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(AppError::ConfigError(format!(
            "Invalid {key} '{other}': expected true or false"
        ))),
    }
}
