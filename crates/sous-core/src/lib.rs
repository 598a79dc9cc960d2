pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod extract;
pub mod flight;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use cache::{CacheConfig, CacheStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    EdamamConfig, OpenAiConfig, ScraperConfig, ServiceConfig, SpoonacularConfig,
};
pub use error::AppError;
pub use models::{
    Capability, CleanedPage, ExtractionResult, ProviderDescriptor, ProviderKind, RawContent,
    RecipeQuery, SearchFilters, compute_hash,
};
pub use orchestrator::{Orchestrator, Served, ServiceStats};
pub use rate_limit::{BudgetSnapshot, RateLimitConfig, Upstream};
pub use retry::CallPolicy;
pub use traits::{
    ChatMessage, CompletionClient, CompletionRequest, Fetcher, PageCleaner, RecipeProvider, Role,
};
