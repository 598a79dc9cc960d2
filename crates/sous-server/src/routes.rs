use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use sous_core::RecipeQuery;

use crate::dto::{
    DEFAULT_RANDOM_LIMIT, DEFAULT_SEARCH_LIMIT, HealthResponse, IngredientsParams, ProbeResponse,
    RandomParams, RecipeResponse, SearchParams, UrlParams,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let recipes = Router::new()
        .route("/recipes/search", get(search_recipes))
        .route("/recipes/random", get(random_recipe))
        .route("/recipes/by-ingredients", get(recipes_by_ingredients))
        .route("/recipes/by-url", get(recipe_by_url))
        .route("/recipes/{id}", get(recipe_by_id))
        .route("/providers/{name}/probe", get(probe_provider));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(recipes).with_state(state)
}

async fn serve(state: &AppState, query: RecipeQuery) -> Result<axum::Json<RecipeResponse>, ApiError> {
    let served = state.service.lookup(query).await?;
    Ok(axum::Json(RecipeResponse::from(served)))
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/recipes/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Instructions for the top match", body = RecipeResponse),
        (status = 400, description = "Invalid query", body = crate::dto::ErrorResponse),
        (status = 404, description = "No recipe matched", body = crate::dto::ErrorResponse),
        (status = 429, description = "Upstream budget exhausted", body = crate::dto::ErrorResponse),
        (status = 501, description = "Active provider cannot search", body = crate::dto::ErrorResponse),
    ),
    tag = "recipes"
)]
pub async fn search_recipes(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let filters = params.filters();
    serve(&state, RecipeQuery::filtered_search(params.query, limit, filters)).await
}

#[utoipa::path(
    get,
    path = "/recipes/by-ingredients",
    params(IngredientsParams),
    responses(
        (status = 200, description = "Instructions for a recipe using the ingredients", body = RecipeResponse),
        (status = 400, description = "Empty ingredient list", body = crate::dto::ErrorResponse),
        (status = 404, description = "No recipe matched", body = crate::dto::ErrorResponse),
        (status = 429, description = "Upstream budget exhausted", body = crate::dto::ErrorResponse),
        (status = 501, description = "Active provider cannot search", body = crate::dto::ErrorResponse),
    ),
    tag = "recipes"
)]
pub async fn recipes_by_ingredients(
    State(state): State<Arc<AppState>>,
    params: Result<Query<IngredientsParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    serve(&state, RecipeQuery::ingredients(params.items(), limit)).await
}

#[utoipa::path(
    get,
    path = "/recipes/random",
    params(RandomParams),
    responses(
        (status = 200, description = "Instructions for a recipe matching the tags", body = RecipeResponse),
        (status = 404, description = "No recipe matched", body = crate::dto::ErrorResponse),
        (status = 429, description = "Upstream budget exhausted", body = crate::dto::ErrorResponse),
    ),
    tag = "recipes"
)]
pub async fn random_recipe(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RandomParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_RANDOM_LIMIT);
    let query = RecipeQuery::filtered_search(params.search_text(), limit, params.filters());
    serve(&state, query).await
}

#[utoipa::path(
    get,
    path = "/recipes/by-url",
    params(UrlParams),
    responses(
        (status = 200, description = "Instructions scraped from the page", body = RecipeResponse),
        (status = 400, description = "Invalid or blocked URL", body = crate::dto::ErrorResponse),
        (status = 404, description = "Page has no recipe", body = crate::dto::ErrorResponse),
        (status = 501, description = "Active provider cannot fetch URLs", body = crate::dto::ErrorResponse),
    ),
    tag = "recipes"
)]
pub async fn recipe_by_url(
    State(state): State<Arc<AppState>>,
    params: Result<Query<UrlParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    serve(&state, RecipeQuery::url(params.url)).await
}

#[utoipa::path(
    get,
    path = "/recipes/{id}",
    params(
        ("id" = String, Path, description = "Recipe identifier native to the active provider")
    ),
    responses(
        (status = 200, description = "Instructions for the recipe", body = RecipeResponse),
        (status = 404, description = "Unknown recipe", body = crate::dto::ErrorResponse),
        (status = 501, description = "Active provider cannot fetch by id", body = crate::dto::ErrorResponse),
    ),
    tag = "recipes"
)]
pub async fn recipe_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    serve(&state, RecipeQuery::provider_id(id)).await
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/providers/{name}/probe",
    params(
        ("name" = String, Path, description = "Provider name: `edamam`, `spoonacular` or `scraper`")
    ),
    responses(
        (status = 200, description = "Provider reachable", body = ProbeResponse),
        (status = 404, description = "Provider is not the active one", body = crate::dto::ErrorResponse),
        (status = 503, description = "Provider unreachable", body = crate::dto::ErrorResponse),
    ),
    tag = "providers"
)]
pub async fn probe_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = state.service.probe(&name).await?;
    Ok(axum::Json(ProbeResponse {
        provider: kind.to_string(),
        status: "ok",
    }))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(HealthResponse::from(state.service.stats()))
}
