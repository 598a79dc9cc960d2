use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{CleanedPage, ProviderDescriptor, RawContent, RecipeQuery};

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Reduces a recipe page to title, ingredient lines and instruction text.
pub trait PageCleaner: Send + Sync + Clone + 'static {
    fn clean(&self, html: &str) -> Result<CleanedPage, AppError>;
}

/// A content source: structured recipe API or page scraper.
///
/// Implementations are stateless with respect to requests and are shared by
/// every in-flight execution.
pub trait RecipeProvider: Send + Sync + 'static {
    /// Name, supported capabilities and the budget this provider charges.
    fn descriptor(&self) -> ProviderDescriptor;

    /// Fetch raw content for a query the provider supports.
    ///
    /// Errors: `NotFound`, `UpstreamUnavailable`, `UpstreamRejected`.
    fn fetch(
        &self,
        query: &RecipeQuery,
    ) -> impl Future<Output = Result<RawContent, AppError>> + Send;

    /// Cheap connectivity check against the upstream.
    fn probe(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-completion call constrained to a JSON schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub schema: serde_json::Value,
}

/// Chat-completion API returning the raw text of the first choice.
pub trait CompletionClient: Send + Sync + 'static {
    /// Errors: `UpstreamUnavailable` for timeouts, transport failures, 429 and
    /// 5xx; `UpstreamRejected` for other 4xx.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}
