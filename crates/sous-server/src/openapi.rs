use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sous API",
        version = "0.1.0",
        description = "Cooking instructions and ingredients extracted from recipe providers."
    ),
    paths(
        crate::routes::search_recipes,
        crate::routes::random_recipe,
        crate::routes::recipes_by_ingredients,
        crate::routes::recipe_by_url,
        crate::routes::recipe_by_id,
        crate::routes::probe_provider,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::RecipeResponse,
        crate::dto::ProbeResponse,
        crate::dto::BudgetResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "recipes", description = "Recipe instructions"),
        (name = "providers", description = "Content provider checks"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;
