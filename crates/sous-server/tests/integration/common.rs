use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;

use sous_core::testutil::{MockCompletion, MockProvider, service_config};
use sous_core::{ManualClock, Orchestrator, ProviderKind, ServiceConfig};
use sous_server::routes;
use sous_server::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub provider: MockProvider,
    pub completion: MockCompletion,
    pub clock: ManualClock,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

/// App backed by a structured-API mock provider and a completion mock that
/// answers with the pasta recipe.
pub fn setup_test_app() -> TestApp {
    setup_test_app_with(
        MockProvider::new(ProviderKind::Edamam),
        MockCompletion::new(),
        service_config(),
    )
}

pub fn setup_test_app_with(
    provider: MockProvider,
    completion: MockCompletion,
    config: ServiceConfig,
) -> TestApp {
    let clock = ManualClock::new(Utc::now());
    let orchestrator = Orchestrator::with_clock(
        provider.clone(),
        completion.clone(),
        &config,
        Arc::new(clock.clone()),
    )
    .unwrap();

    TestApp {
        router: routes::router(Arc::new(AppState::new(orchestrator))),
        provider,
        completion,
        clock,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        TestResponse {
            status,
            headers,
            json,
        }
    }
}
