pub mod cleaner;
pub mod edamam;
pub mod fetcher;
mod http;
pub mod llm;
pub mod page;
pub mod provider;
pub mod spoonacular;

pub use cleaner::RecipePageCleaner;
pub use edamam::EdamamProvider;
pub use fetcher::ReqwestFetcher;
pub use llm::OpenAiCompletion;
pub use page::PageScraperProvider;
pub use provider::ConfiguredProvider;
pub use spoonacular::SpoonacularProvider;

use sous_core::{AppError, Orchestrator, ServiceConfig};

/// The orchestrator wired to real upstreams.
pub type LiveService = Orchestrator<ConfiguredProvider, OpenAiCompletion>;

/// Build the production service from configuration.
pub fn build_service(config: &ServiceConfig) -> Result<LiveService, AppError> {
    let provider = ConfiguredProvider::from_config(config)?;
    let completion = OpenAiCompletion::with_timeout(&config.openai, config.completion_timeout)?;
    Orchestrator::new(provider, completion, config)
}
