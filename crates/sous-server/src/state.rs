use std::sync::Arc;

use futures::future::BoxFuture;
use sous_core::{
    AppError, CompletionClient, Orchestrator, ProviderKind, RecipeProvider, RecipeQuery, Served,
    ServiceStats,
};

/// What the HTTP layer needs from the recipe pipeline.
///
/// Object-safe so handlers do not carry the provider and completion types.
pub trait RecipeBackend: Send + Sync + 'static {
    fn lookup(&self, query: RecipeQuery) -> BoxFuture<'_, Result<Served, AppError>>;

    fn probe<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<ProviderKind, AppError>>;

    fn stats(&self) -> ServiceStats;

    fn sweep_cache(&self) -> usize;
}

impl<P: RecipeProvider, C: CompletionClient> RecipeBackend for Orchestrator<P, C> {
    fn lookup(&self, query: RecipeQuery) -> BoxFuture<'_, Result<Served, AppError>> {
        Box::pin(Orchestrator::lookup(self, query))
    }

    fn probe<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<ProviderKind, AppError>> {
        Box::pin(Orchestrator::probe(self, name))
    }

    fn stats(&self) -> ServiceStats {
        Orchestrator::stats(self)
    }

    fn sweep_cache(&self) -> usize {
        Orchestrator::sweep_cache(self)
    }
}

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub service: Arc<dyn RecipeBackend>,
}

impl AppState {
    pub fn new(service: impl RecipeBackend) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
