use crate::error::AppError;
use crate::models::{ProviderDescriptor, RawContent, RecipeQuery};
use crate::retry::CallPolicy;
use crate::traits::RecipeProvider;

/// The single active content provider, fronted by capability checks and a
/// bounded call policy.
pub struct ProviderGateway<P: RecipeProvider> {
    provider: P,
    policy: CallPolicy,
}

impl<P: RecipeProvider> ProviderGateway<P> {
    pub fn new(provider: P, policy: CallPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn descriptor(&self) -> ProviderDescriptor {
        self.provider.descriptor()
    }

    /// Fail fast when the active provider cannot serve this kind of query.
    pub fn ensure_supported(&self, query: &RecipeQuery) -> Result<(), AppError> {
        let descriptor = self.descriptor();
        let capability = query.required_capability();
        if descriptor.supports(capability) {
            Ok(())
        } else {
            Err(AppError::ConfigError(format!(
                "provider '{}' does not support {capability} queries",
                descriptor.name()
            )))
        }
    }

    pub async fn fetch(&self, query: &RecipeQuery) -> Result<RawContent, AppError> {
        self.ensure_supported(query)?;
        let name = self.descriptor().name();
        tracing::info!(provider = name, %query, "Fetching from provider");
        let raw = self.policy.run(name, || self.provider.fetch(query)).await?;
        tracing::info!(
            provider = name,
            source = %raw.source,
            bytes = raw.body.len(),
            hints = raw.ingredient_hints.len(),
            "Provider content fetched"
        );
        Ok(raw)
    }

    pub async fn probe(&self) -> Result<(), AppError> {
        let name = self.descriptor().name();
        self.policy.run(name, || self.provider.probe()).await
    }
}
