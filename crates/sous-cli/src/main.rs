use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sous_client::LiveService;
use sous_core::{RecipeQuery, SearchFilters, ServiceConfig};

#[derive(Parser)]
#[command(name = "sous", version, about = "Cooking instructions from recipe providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the active provider and extract the top match
    Search {
        /// Ingredient or recipe name
        query: String,

        /// Number of provider hits to consider
        #[arg(short, long, default_value_t = 10)]
        limit: u32,

        /// Restrict to a cuisine, e.g. italian
        #[arg(long)]
        cuisine: Option<String>,

        /// Restrict to a diet, e.g. vegetarian
        #[arg(long)]
        diet: Option<String>,

        /// Exclude an intolerance; repeat or comma-separate
        #[arg(long = "intolerance", value_delimiter = ',')]
        intolerances: Vec<String>,

        /// Ask the provider for a random match
        #[arg(long)]
        random: bool,
    },

    /// Find a recipe that uses the given ingredients
    Ingredients {
        /// Ingredients, space or comma separated
        #[arg(required = true, value_delimiter = ',')]
        items: Vec<String>,

        /// Number of provider hits to consider
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Scrape a recipe page (scraper provider only)
    Url {
        /// Recipe page URL
        url: String,
    },

    /// Fetch a recipe by its provider identifier
    Id {
        /// Identifier native to the active provider
        id: String,
    },

    /// Check connectivity to a provider
    Probe {
        /// Provider name; defaults to the active one
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sous=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ServiceConfig::from_env().context("Invalid configuration")?;
    let service = sous_client::build_service(&config).context("Failed to build recipe service")?;

    match cli.command {
        Commands::Search {
            query,
            limit,
            cuisine,
            diet,
            intolerances,
            random,
        } => {
            let filters = SearchFilters {
                cuisine,
                diet,
                intolerances,
                random,
            };
            cmd_lookup(&service, RecipeQuery::filtered_search(query, limit, filters)).await?
        }
        Commands::Ingredients { items, limit } => {
            cmd_lookup(&service, RecipeQuery::ingredients(items, limit)).await?
        }
        Commands::Url { url } => cmd_lookup(&service, RecipeQuery::url(url)).await?,
        Commands::Id { id } => cmd_lookup(&service, RecipeQuery::provider_id(id)).await?,
        Commands::Probe { name } => {
            let name = name.unwrap_or_else(|| config.provider.to_string());
            cmd_probe(&service, &name).await?
        }
    }

    Ok(())
}

async fn cmd_lookup(service: &LiveService, query: RecipeQuery) -> Result<()> {
    tracing::info!(%query, "Looking up recipe");
    let result = service
        .handle(query)
        .await
        .context("Recipe lookup failed")?;

    eprintln!(
        "{} steps, {} ingredients",
        result.steps.len(),
        result.ingredients.len()
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_probe(service: &LiveService, name: &str) -> Result<()> {
    let kind = service
        .probe(name)
        .await
        .with_context(|| format!("Probe of provider '{name}' failed"))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "provider": kind.as_str(),
            "status": "ok",
        }))?
    );
    Ok(())
}
