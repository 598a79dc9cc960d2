//! Entry point for every recipe request.
//!
//! ```text
//! lookup(query)
//!   validate ─► cache hit? ─► capability check ─► attach to in-flight key
//!                                                   ├─ Ready   (cache re-checked under lock)
//!                                                   ├─ Follow  wait for the running execution
//!                                                   └─ Lead    spawn execution, then wait
//! execution: admit(provider, completion) ─► gateway.fetch ─► extract
//!            ─► settle: cache write, registry removal, release waiters
//! ```
//!
//! Executions run on their own task, so a caller that goes away does not cancel
//! work other callers are waiting on. An execution is dropped only once nobody
//! is waiting for it any more.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::error::AppError;
use crate::extract::InstructionExtractor;
use crate::flight::{Attach, Flight, FlightRegistry};
use crate::gateway::ProviderGateway;
use crate::models::{ExtractionResult, ProviderDescriptor, ProviderKind, RecipeQuery};
use crate::rate_limit::{BudgetSnapshot, RateLimiter, Upstream};
use crate::retry::CallPolicy;
use crate::traits::{CompletionClient, RecipeProvider};

type Outcome = Result<ExtractionResult, AppError>;

/// A result and whether it came straight from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub result: ExtractionResult,
    pub cached: bool,
}

/// Runtime counters for the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub provider: ProviderKind,
    pub cache_entries: u64,
    pub in_flight: usize,
    pub budgets: Vec<BudgetSnapshot>,
}

struct Inner<P: RecipeProvider, C: CompletionClient> {
    gateway: ProviderGateway<P>,
    extractor: InstructionExtractor<C>,
    cache: CacheStore,
    limiter: RateLimiter,
    flights: FlightRegistry<Outcome>,
}

/// Process-wide request orchestrator. Cheap to clone.
pub struct Orchestrator<P: RecipeProvider, C: CompletionClient> {
    inner: Arc<Inner<P, C>>,
}

impl<P: RecipeProvider, C: CompletionClient> Clone for Orchestrator<P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: RecipeProvider, C: CompletionClient> Orchestrator<P, C> {
    pub fn new(provider: P, completion: C, config: &ServiceConfig) -> Result<Self, AppError> {
        Self::with_clock(provider, completion, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: P,
        completion: C,
        config: &ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let extractor = InstructionExtractor::new(
            completion,
            CallPolicy::new(config.completion_timeout),
            Arc::clone(&clock),
        )?;
        let inner = Inner {
            gateway: ProviderGateway::new(provider, CallPolicy::new(config.upstream_timeout)),
            extractor,
            cache: CacheStore::new(config.cache, Arc::clone(&clock)),
            limiter: RateLimiter::new(config.rate_limits, clock),
            flights: FlightRegistry::new(),
        };
        tracing::info!(
            provider = inner.gateway.descriptor().name(),
            cache_ttl_secs = config.cache.ttl.as_secs(),
            scraping_per_minute = config.rate_limits.scraping_per_minute,
            completion_per_minute = config.rate_limits.completion_per_minute,
            "Orchestrator ready"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn descriptor(&self) -> ProviderDescriptor {
        self.inner.gateway.descriptor()
    }

    pub async fn handle(&self, query: RecipeQuery) -> Result<ExtractionResult, AppError> {
        self.lookup(query).await.map(|served| served.result)
    }

    /// Resolve a query through the cache or a (shared) execution.
    pub async fn lookup(&self, query: RecipeQuery) -> Result<Served, AppError> {
        query.validate()?;
        let key = query.cache_key();

        if let Some(result) = self.inner.cache.get_by_key(&key) {
            tracing::debug!(%key, "Cache hit");
            return Ok(Served {
                result,
                cached: true,
            });
        }

        self.inner.gateway.ensure_supported(&query)?;

        loop {
            let attached = self
                .inner
                .flights
                .attach(&key, || self.inner.cache.get_by_key(&key).map(Ok));

            let mut waiter = match attached {
                Attach::Ready(outcome) => {
                    return outcome.map(|result| Served {
                        result,
                        cached: true,
                    });
                }
                Attach::Lead { flight, waiter } => {
                    tracing::debug!(%key, "Cache miss, starting execution");
                    self.spawn_execution(flight, query.clone());
                    waiter
                }
                Attach::Follow(waiter) => waiter,
            };

            let settled = match waiter.wait_for(Option::is_some).await {
                Ok(value) => (*value).clone(),
                Err(_) => {
                    tracing::debug!(%key, "Execution ended without a result, re-entering lookup");
                    continue;
                }
            };
            if let Some(outcome) = settled {
                return outcome.map(|result| Served {
                    result,
                    cached: false,
                });
            }
        }
    }

    fn spawn_execution(&self, flight: Flight<Outcome>, query: RecipeQuery) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = flight.abandoned() => {
                    tracing::info!(key = flight.key(), "No callers left, abandoning execution");
                    return;
                }
                outcome = inner.execute(&query) => outcome,
            };

            if let Err(e) = &outcome {
                tracing::warn!(%query, error = %e, "Request failed");
            }

            let key = flight.key().to_string();
            flight.settle(outcome, |outcome| {
                if let Ok(result) = outcome {
                    inner.cache.put_by_key(key, result.clone());
                }
            });
        });
    }

    /// Check connectivity of the named provider. Only the active one exists.
    pub async fn probe(&self, name: &str) -> Result<ProviderKind, AppError> {
        let descriptor = self.descriptor();
        match name.parse::<ProviderKind>() {
            Ok(kind) if kind == descriptor.kind => {}
            _ => {
                return Err(AppError::NotFound(format!(
                    "provider '{name}' is not active (active: {})",
                    descriptor.name()
                )));
            }
        }
        self.inner.limiter.try_admit_all(&[descriptor.upstream])?;
        self.inner.gateway.probe().await?;
        tracing::info!(provider = descriptor.name(), "Provider probe succeeded");
        Ok(descriptor.kind)
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            provider: self.descriptor().kind,
            cache_entries: self.inner.cache.len(),
            in_flight: self.inner.flights.len(),
            budgets: self.inner.limiter.snapshot(),
        }
    }

    /// Remove expired cache entries. Returns how many were dropped.
    pub fn sweep_cache(&self) -> usize {
        self.inner.cache.sweep_expired()
    }
}

impl<P: RecipeProvider, C: CompletionClient> Inner<P, C> {
    async fn execute(&self, query: &RecipeQuery) -> Outcome {
        let descriptor = self.gateway.descriptor();
        self.limiter
            .try_admit_all(&[descriptor.upstream, Upstream::Completion])?;
        let raw = self.gateway.fetch(query).await?;
        self.extractor.extract(&raw).await
    }
}
