use std::time::Duration;

use axum::http::StatusCode;

use sous_core::testutil::{MockCompletion, MockProvider, raw_content, service_config};
use sous_core::{
    AppError, ProviderKind, RateLimitConfig, RecipeQuery, SearchFilters, ServiceConfig,
};

use crate::common::{setup_test_app, setup_test_app_with};

#[tokio::test]
async fn health_reports_provider_and_budgets() {
    let app = setup_test_app();

    let response = app.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["status"], "ok");
    assert_eq!(response.json["provider"], "edamam");
    assert_eq!(response.json["cache_entries"], 0);
    assert_eq!(response.json["in_flight"], 0);
    let budgets = response.json["budgets"].as_array().unwrap();
    assert_eq!(budgets.len(), 2);
    assert_eq!(budgets[0]["upstream"], "scraping");
    assert_eq!(budgets[0]["limit"], 100);
    assert_eq!(budgets[1]["upstream"], "completion");
    assert_eq!(budgets[1]["limit"], 20);
}

#[tokio::test]
async fn search_returns_instructions_then_serves_from_cache() {
    let app = setup_test_app();

    let first = app.get("/recipes/search?query=pasta&limit=1").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(
        first.json["steps"],
        serde_json::json!(["Boil water", "Add pasta", "Drain"])
    );
    assert_eq!(
        first.json["ingredients"],
        serde_json::json!(["pasta", "water", "salt"])
    );
    assert_eq!(first.json["source_provider"], "edamam");
    assert_eq!(first.json["cached"], false);

    let second = app.get("/recipes/search?query=Pasta&limit=1").await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.json["cached"], true);
    assert_eq!(second.json["steps"], first.json["steps"]);
    assert_eq!(second.json["extracted_at"], first.json["extracted_at"]);

    assert_eq!(app.provider.fetch_count(), 1);
    assert_eq!(app.completion.call_count(), 1);
    assert_eq!(app.get("/health").await.json["cache_entries"], 1);
}

#[tokio::test]
async fn cache_expires_after_ttl() {
    let app = setup_test_app();

    app.get("/recipes/search?query=pasta").await;
    app.clock.advance(Duration::from_secs(3601));
    let response = app.get("/recipes/search?query=pasta").await;

    assert_eq!(response.json["cached"], false);
    assert_eq!(app.provider.fetch_count(), 2);
}

#[tokio::test]
async fn search_without_query_is_invalid() {
    let app = setup_test_app();

    let response = app.get("/recipes/search").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json["error"], "invalid_query");
    assert_eq!(app.provider.fetch_count(), 0);
}

#[tokio::test]
async fn blank_search_and_bad_limit_are_invalid() {
    let app = setup_test_app();

    for uri in [
        "/recipes/search?query=%20%20",
        "/recipes/search?query=pasta&limit=0",
        "/recipes/search?query=pasta&limit=500",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(response.json["error"], "invalid_query");
    }
    assert_eq!(app.provider.fetch_count(), 0);
}

#[tokio::test]
async fn random_searches_tags_or_random() {
    let app = setup_test_app();

    assert_eq!(app.get("/recipes/random").await.status, StatusCode::OK);
    assert_eq!(
        app.get("/recipes/random?tags=vegan,dessert&limit=3")
            .await
            .status,
        StatusCode::OK
    );

    let random = SearchFilters {
        random: true,
        ..SearchFilters::default()
    };
    let queries = app.provider.queries.lock().unwrap().clone();
    assert_eq!(
        queries,
        vec![
            RecipeQuery::filtered_search("random", 5, random.clone()),
            RecipeQuery::filtered_search("vegan dessert", 3, random),
        ]
    );
}

#[tokio::test]
async fn search_filters_reach_the_provider_and_split_the_cache() {
    let app = setup_test_app();

    let plain = app.get("/recipes/search?query=pasta&limit=2").await;
    let filtered = app
        .get("/recipes/search?query=pasta&limit=2&cuisine=italian&intolerances=gluten,dairy")
        .await;
    assert_eq!(plain.status, StatusCode::OK);
    assert_eq!(filtered.status, StatusCode::OK);
    assert_eq!(filtered.json["cached"], false);

    let queries = app.provider.queries.lock().unwrap().clone();
    assert_eq!(
        queries[1],
        RecipeQuery::filtered_search(
            "pasta",
            2,
            SearchFilters {
                cuisine: Some("italian".into()),
                intolerances: vec!["gluten".into(), "dairy".into()],
                ..SearchFilters::default()
            },
        )
    );
    assert_eq!(app.provider.fetch_count(), 2);
}

#[tokio::test]
async fn ingredient_search_is_served_and_cached_regardless_of_order() {
    let app = setup_test_app();

    let first = app
        .get("/recipes/by-ingredients?ingredients=tomato,basil&limit=3")
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.json["cached"], false);

    let second = app
        .get("/recipes/by-ingredients?ingredients=Basil,%20tomato&limit=3")
        .await;
    assert_eq!(second.json["cached"], true);

    assert_eq!(
        app.provider.queries.lock().unwrap().as_slice(),
        [RecipeQuery::ingredients(["tomato", "basil"], 3)]
    );
}

#[tokio::test]
async fn empty_ingredient_list_is_invalid() {
    let app = setup_test_app();

    for uri in ["/recipes/by-ingredients?ingredients=%20,", "/recipes/by-ingredients"] {
        let response = app.get(uri).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(response.json["error"], "invalid_query");
    }
    assert_eq!(app.provider.fetch_count(), 0);
}

#[tokio::test]
async fn recipe_by_id_uses_provider_id_query() {
    let app = setup_test_app_with(
        MockProvider::new(ProviderKind::Edamam)
            .with_responses(vec![Ok(raw_content("Boil water, add pasta, drain."))]),
        MockCompletion::new(),
        service_config(),
    );

    let response = app.get("/recipes/abc123").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["source_url_or_id"], "recipe_abc");
    assert_eq!(
        app.provider.queries.lock().unwrap().as_slice(),
        [RecipeQuery::provider_id("abc123")]
    );
}

#[tokio::test]
async fn url_query_against_structured_provider_is_not_implemented() {
    let app = setup_test_app();

    let response = app
        .get("/recipes/by-url?url=https%3A%2F%2Frecipes.example%2Fcarbonara")
        .await;

    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(response.json["error"], "configuration_error");
    assert_eq!(app.provider.fetch_count(), 0);
    assert_eq!(app.get("/health").await.json["budgets"][0]["count"], 0);
}

#[tokio::test]
async fn url_query_against_scraper_provider() {
    let app = setup_test_app_with(
        MockProvider::new(ProviderKind::Scraper),
        MockCompletion::new(),
        ServiceConfig {
            provider: ProviderKind::Scraper,
            ..service_config()
        },
    );

    let response = app
        .get("/recipes/by-url?url=https%3A%2F%2Frecipes.example%2Fcarbonara")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["source_provider"], "scraper");

    let search = app.get("/recipes/search?query=pasta").await;
    assert_eq!(search.status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn provider_not_found_is_404() {
    let app = setup_test_app_with(
        MockProvider::new(ProviderKind::Edamam)
            .with_error(AppError::NotFound("no hits for 'xyzzy'".into())),
        MockCompletion::new(),
        service_config(),
    );

    let response = app.get("/recipes/search?query=xyzzy").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json["error"], "not_found");
    assert!(response.json.get("retry_after_secs").is_none());
    assert_eq!(app.completion.call_count(), 0);
}

#[tokio::test]
async fn exhausted_budget_is_429_with_retry_after() {
    let app = setup_test_app_with(
        MockProvider::new(ProviderKind::Edamam),
        MockCompletion::new(),
        ServiceConfig {
            rate_limits: RateLimitConfig {
                scraping_per_minute: 100,
                completion_per_minute: 1,
            },
            ..service_config()
        },
    );

    assert_eq!(
        app.get("/recipes/search?query=pasta").await.status,
        StatusCode::OK
    );
    app.clock.advance(Duration::from_secs(20));
    let response = app.get("/recipes/search?query=soup").await;

    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.json["error"], "rate_limited");
    assert_eq!(response.json["retry_after_secs"], 40);
    assert_eq!(response.headers["retry-after"], "40");
    assert_eq!(app.provider.fetch_count(), 1);

    // cached results are still served while the budget is exhausted
    let cached = app.get("/recipes/search?query=pasta").await;
    assert_eq!(cached.status, StatusCode::OK);
    assert_eq!(cached.json["cached"], true);
}

#[tokio::test]
async fn malformed_model_output_is_502_and_not_cached() {
    let app = setup_test_app_with(
        MockProvider::new(ProviderKind::Edamam),
        MockCompletion::with_replies(vec![
            Ok("I cannot help with that".into()),
            Ok(r#"{"steps": [], "ingredients": []}"#.into()),
        ]),
        service_config(),
    );

    let response = app.get("/recipes/search?query=pasta").await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.json["error"], "malformed_upstream_output");
    assert_eq!(app.get("/health").await.json["cache_entries"], 0);

    let retry = app.get("/recipes/search?query=pasta").await;
    assert_eq!(retry.status, StatusCode::OK);
    assert_eq!(app.provider.fetch_count(), 2);
}

#[tokio::test]
async fn upstream_failures_map_to_gateway_statuses() {
    let rejected = setup_test_app_with(
        MockProvider::new(ProviderKind::Edamam).with_error(AppError::UpstreamRejected {
            status: 401,
            message: "invalid app_key".into(),
        }),
        MockCompletion::new(),
        service_config(),
    );
    let response = rejected.get("/recipes/search?query=pasta").await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.json["error"], "upstream_rejected");

    let unavailable = setup_test_app_with(
        MockProvider::new(ProviderKind::Edamam).with_responses(vec![
            Err(AppError::UpstreamUnavailable("connection reset".into())),
            Err(AppError::UpstreamUnavailable("connection reset".into())),
        ]),
        MockCompletion::new(),
        service_config(),
    );
    let response = unavailable.get("/recipes/search?query=pasta").await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json["error"], "upstream_unavailable");
    assert_eq!(unavailable.provider.fetch_count(), 2);
}

#[tokio::test]
async fn probe_active_provider() {
    let app = setup_test_app();

    let response = app.get("/providers/edamam/probe").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["provider"], "edamam");
    assert_eq!(response.json["status"], "ok");
}

#[tokio::test]
async fn probe_inactive_provider_is_404() {
    let app = setup_test_app();

    let response = app.get("/providers/scraper/probe").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json["error"], "not_found");
}

#[tokio::test]
async fn probe_failure_is_reported() {
    let app = setup_test_app_with(
        MockProvider::new(ProviderKind::Edamam)
            .with_probe_result(Err(AppError::UpstreamUnavailable("timed out".into()))),
        MockCompletion::new(),
        service_config(),
    );

    let response = app.get("/providers/edamam/probe").await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let app = setup_test_app();

    let response = app.get("/api-docs/openapi.json").await;

    assert_eq!(response.status, StatusCode::OK);
    let paths = response.json["paths"].as_object().unwrap();
    for path in [
        "/recipes/search",
        "/recipes/random",
        "/recipes/by-ingredients",
        "/recipes/by-url",
        "/recipes/{id}",
        "/providers/{name}/probe",
        "/health",
    ] {
        assert!(paths.contains_key(path), "{path}");
    }
}
