use sous_core::{
    AppError, ProviderDescriptor, ProviderKind, RawContent, RecipeProvider, RecipeQuery,
    ServiceConfig,
};

use crate::cleaner::RecipePageCleaner;
use crate::edamam::EdamamProvider;
use crate::fetcher::ReqwestFetcher;
use crate::page::PageScraperProvider;
use crate::spoonacular::SpoonacularProvider;

/// The active content provider, chosen once from `API_PROVIDER`.
#[derive(Clone)]
pub enum ConfiguredProvider {
    Edamam(EdamamProvider<ReqwestFetcher, RecipePageCleaner>),
    Spoonacular(SpoonacularProvider),
    PageScraper(PageScraperProvider<ReqwestFetcher, RecipePageCleaner>),
}

impl ConfiguredProvider {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, AppError> {
        let mut fetcher = ReqwestFetcher::with_timeout(config.upstream_timeout)?;
        if config.scraper.allow_private_urls {
            tracing::warn!("Private URL protection disabled (ALLOW_PRIVATE_URLS)");
            fetcher = fetcher.allow_private_urls();
        }
        let cleaner = RecipePageCleaner::new();

        match config.provider {
            ProviderKind::Edamam => {
                let edamam = config.edamam.clone().ok_or_else(|| {
                    AppError::ConfigError(
                        "EDAMAM_APP_ID and EDAMAM_API_KEY must be set for the edamam provider"
                            .into(),
                    )
                })?;
                let provider = EdamamProvider::new(edamam, config.upstream_timeout)?
                    .with_source_pages(fetcher, cleaner);
                Ok(Self::Edamam(provider))
            }
            ProviderKind::Spoonacular => {
                let spoonacular = config.spoonacular.clone().ok_or_else(|| {
                    AppError::ConfigError(
                        "SPOONACULAR_API_KEY must be set for the spoonacular provider".into(),
                    )
                })?;
                Ok(Self::Spoonacular(SpoonacularProvider::new(
                    spoonacular,
                    config.upstream_timeout,
                )?))
            }
            ProviderKind::Scraper => Ok(Self::PageScraper(PageScraperProvider::new(
                fetcher,
                cleaner,
                config.scraper.probe_url.clone(),
            ))),
        }
    }
}

impl RecipeProvider for ConfiguredProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        match self {
            Self::Edamam(p) => p.descriptor(),
            Self::Spoonacular(p) => p.descriptor(),
            Self::PageScraper(p) => p.descriptor(),
        }
    }

    async fn fetch(&self, query: &RecipeQuery) -> Result<RawContent, AppError> {
        match self {
            Self::Edamam(p) => p.fetch(query).await,
            Self::Spoonacular(p) => p.fetch(query).await,
            Self::PageScraper(p) => p.fetch(query).await,
        }
    }

    async fn probe(&self) -> Result<(), AppError> {
        match self {
            Self::Edamam(p) => p.probe().await,
            Self::Spoonacular(p) => p.probe().await,
            Self::PageScraper(p) => p.probe().await,
        }
    }
}
