use sous_core::{
    AppError, Capability, Fetcher, PageCleaner, ProviderDescriptor, ProviderKind, RawContent,
    RecipeProvider, RecipeQuery, Upstream,
};

const CAPABILITIES: &[Capability] = &[Capability::FetchByUrl];

/// Raw-page scraper: downloads a recipe page and cleans it for extraction.
#[derive(Clone)]
pub struct PageScraperProvider<F: Fetcher, C: PageCleaner> {
    fetcher: F,
    cleaner: C,
    probe_url: String,
}

impl<F: Fetcher, C: PageCleaner> PageScraperProvider<F, C> {
    pub fn new(fetcher: F, cleaner: C, probe_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            cleaner,
            probe_url: probe_url.into(),
        }
    }
}

impl<F: Fetcher, C: PageCleaner> RecipeProvider for PageScraperProvider<F, C> {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::Scraper,
            supports: CAPABILITIES,
            upstream: Upstream::Scraping,
        }
    }

    async fn fetch(&self, query: &RecipeQuery) -> Result<RawContent, AppError> {
        let RecipeQuery::Url { url } = query else {
            return Err(AppError::ConfigError(format!(
                "scraper only supports fetch-by-url queries, got {}",
                query.tag()
            )));
        };
        let url = url.trim();

        let html = self.fetcher.fetch(url).await?;
        let page = self.cleaner.clean(&html)?;
        tracing::info!(
            url,
            html_bytes = html.len(),
            text_bytes = page.text.len(),
            ingredients = page.ingredients.len(),
            "Page cleaned"
        );

        Ok(RawContent {
            provider: ProviderKind::Scraper,
            source: url.to_string(),
            title: page.title,
            body: page.text,
            ingredient_hints: page.ingredients,
        })
    }

    async fn probe(&self) -> Result<(), AppError> {
        self.fetcher.fetch(&self.probe_url).await.map(|_| ())
    }
}
