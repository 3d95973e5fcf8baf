use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use recipe_search_core::providers::openai::DEFAULT_OPENAI_BASE_URL;
use recipe_search_core::{
    ChunkMetadata, EmbeddingService, EngineConfig, Goal, IndexingReport, NgramEmbeddingProvider,
    OpenAiEmbeddingProvider, PgRecipeStore, RecipeIndexer, RecipeRetriever, SearchFilters,
    TextChunker, UserPreferences, VectorSearchEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "recipe-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Postgres connection string (pgvector enabled).
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum pooled database connections.
    #[arg(long, default_value = "5")]
    max_connections: u32,

    /// JSON file overriding engine defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Embedding backend.
    #[arg(long, value_enum, default_value_t = ProviderKind::Openai)]
    provider: ProviderKind,

    /// API key for the OpenAI-compatible provider.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible provider.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    /// Embedding model name.
    #[arg(long, env = "EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Expected embedding dimension.
    #[arg(long, env = "EMBEDDING_DIMENSION")]
    embedding_dimension: Option<usize>,

    /// Provider request timeout in seconds.
    #[arg(long, default_value = "60")]
    request_timeout_secs: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    Openai,
    Ngram,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ChunkMode {
    Window,
    Paragraphs,
    Sentences,
}

#[derive(Subcommand)]
enum Command {
    /// Create the pgvector extension and recipe tables if missing.
    Setup,
    /// Index specific recipes in one batch.
    Index {
        #[arg(long = "id", required = true)]
        ids: Vec<i64>,
    },
    /// Re-embed all visible recipes.
    Reindex {
        /// Only embed recipes that have no embedding yet.
        #[arg(long, default_value_t = false)]
        missing_only: bool,
    },
    /// Clear one recipe's embedding.
    RemoveEmbedding {
        #[arg(long)]
        id: i64,
    },
    /// Search recipes by free text.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Pure semantic search instead of hybrid.
        #[arg(long, default_value_t = false)]
        semantic: bool,
        #[arg(long)]
        cuisine: Option<String>,
        #[arg(long)]
        difficulty: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        max_prep_time: Option<i32>,
    },
    /// Search with dietary preference, goal and time budget.
    Context {
        #[arg(long)]
        query: String,
        #[arg(long)]
        diet: Option<String>,
        /// weight_loss, muscle_gain or maintenance.
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        max_cook_time: Option<i32>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Find recipes that can be made from the given ingredients.
    Ingredients {
        #[arg(long = "item", required = true)]
        items: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "0.5")]
        min_match: f64,
    },
    /// Recommend recipes similar to a stored one.
    Similar {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Split a text file into chunks and print them.
    Chunk {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ChunkMode::Window)]
        mode: ChunkMode,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        model = %config.embedding.model,
        dimension = config.embedding.dimension,
        "recipe-search boot"
    );

    if let Command::Chunk { file, mode } = &cli.command {
        return run_chunk(&config, file, *mode).await;
    }

    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL is required for this command")?;
    let store = Arc::new(
        PgRecipeStore::connect(database_url, cli.max_connections, config.embedding.dimension)
            .await
            .context("failed to connect to the recipe database")?,
    );

    if let Command::Setup = cli.command {
        store.ensure_schema().await?;
        println!("schema ready (dimension {})", config.embedding.dimension);
        return Ok(());
    }

    let embeddings = Arc::new(embedding_service(&cli, &config)?);
    let engine = Arc::new(VectorSearchEngine::new(store.clone(), embeddings.clone()));
    let indexer = RecipeIndexer::new(store.clone(), embeddings, config.indexing);
    let retriever = RecipeRetriever::new(engine, store, config.search);
    let default_limit = config.search.default_limit;

    match cli.command {
        Command::Index { ids } => {
            let report = indexer.index_batch(&ids).await;
            print_report(&report);
        }
        Command::Reindex { missing_only } => {
            let report = if missing_only {
                indexer.index_missing().await?
            } else {
                indexer.reindex_all().await?
            };
            print_report(&report);
            if report.has_failures() {
                warn!(failed = report.failed, "indexing finished with failures");
            }
        }
        Command::RemoveEmbedding { id } => {
            if indexer.remove_embedding(id).await {
                println!("removed embedding for recipe {id}");
            } else {
                println!("recipe {id} not found");
            }
        }
        Command::Search {
            query,
            limit,
            semantic,
            cuisine,
            difficulty,
            category,
            max_prep_time,
        } => {
            let filters = SearchFilters {
                cuisine,
                difficulty,
                max_prep_time,
                category,
            };
            let matches = retriever
                .find_by_query(&query, limit.unwrap_or(default_limit), &filters, !semantic)
                .await;
            println!("query: {query}");
            for hit in matches {
                println!(
                    "[{}] score={:.4} {} ({})",
                    hit.recipe.id, hit.score, hit.recipe.title, hit.match_reason
                );
            }
        }
        Command::Context {
            query,
            diet,
            goal,
            max_cook_time,
            limit,
        } => {
            let preferences = UserPreferences {
                dietary_preference: diet,
                goal: goal.map(Goal::from),
                max_cook_time,
            };
            let matches = retriever
                .search_with_context(&query, &preferences, limit.unwrap_or(default_limit))
                .await;
            for hit in matches {
                println!(
                    "[{}] score={:.4} {} ({})",
                    hit.recipe.id, hit.score, hit.recipe.title, hit.match_reason
                );
            }
        }
        Command::Ingredients {
            items,
            limit,
            min_match,
        } => {
            let matches = retriever
                .find_by_ingredients(&items, limit.unwrap_or(default_limit), min_match)
                .await;
            for hit in matches {
                println!(
                    "[{}] match={:.0}% score={:.4} {}",
                    hit.recipe.id,
                    hit.ingredients.match_percentage * 100.0,
                    hit.score,
                    hit.recipe.title
                );
                if !hit.ingredients.missing.is_empty() {
                    let missing = hit.ingredients.missing.iter().cloned().collect::<Vec<_>>();
                    println!("  missing: {}", missing.join(", "));
                }
            }
        }
        Command::Similar { id, limit } => {
            let limit = limit.unwrap_or(retriever.config().recommendation_limit);
            for recipe in retriever.recommend(id, limit).await {
                println!("[{}] {}", recipe.id, recipe.title);
            }
        }
        Command::Setup | Command::Chunk { .. } => {}
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(model) = &cli.embedding_model {
        config.embedding.model = model.clone();
    }
    if let Some(dimension) = cli.embedding_dimension {
        config.embedding.dimension = dimension;
    }

    config.validate()?;
    Ok(config)
}

fn embedding_service(cli: &Cli, config: &EngineConfig) -> anyhow::Result<EmbeddingService> {
    let embedding = config.embedding.clone();
    match cli.provider {
        ProviderKind::Openai => {
            let api_key = cli
                .openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required for the openai provider")?;
            let provider = OpenAiEmbeddingProvider::new(
                api_key,
                &cli.openai_base_url,
                Some(embedding.dimension),
                Duration::from_secs(cli.request_timeout_secs),
            )?;
            Ok(EmbeddingService::new(provider, embedding))
        }
        ProviderKind::Ngram => Ok(EmbeddingService::new(
            NgramEmbeddingProvider::new(embedding.dimension),
            embedding,
        )),
    }
}

async fn run_chunk(config: &EngineConfig, file: &Path, mode: ChunkMode) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let chunker = TextChunker::new(config.chunking)?;

    let mut metadata = ChunkMetadata::new();
    metadata.insert("source".to_string(), file.display().to_string());

    let chunks = match mode {
        ChunkMode::Window => chunker.chunk_text(&text, &metadata),
        ChunkMode::Paragraphs => chunker.chunk_by_paragraphs(&text, &metadata),
        ChunkMode::Sentences => chunker.chunk_by_sentences(&text, &metadata),
    };

    info!(file = %file.display(), chunk_count = chunks.len(), "chunked file");
    for chunk in chunks {
        println!(
            "[{}] chars {}..{}\n{}",
            chunk.chunk_index, chunk.start_offset, chunk.end_offset, chunk.text
        );
    }
    Ok(())
}

fn print_report(report: &IndexingReport) {
    println!(
        "success={} failed={} skipped={} at {}",
        report.success,
        report.failed,
        report.skipped,
        Utc::now().to_rfc3339()
    );
}
