pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod indexer;
pub mod models;
pub mod projection;
pub mod providers;
pub mod retriever;
pub mod search;
pub mod stores;
pub mod traits;

pub use chunking::{normalize_whitespace, ChunkMetadata, ChunkingConfig, TextChunker};
pub use config::{EngineConfig, IndexingConfig, SearchConfig};
pub use embeddings::{
    cosine_similarity, EmbeddingConfig, EmbeddingService, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ChunkingError, ConfigError, DatastoreError, IndexingError, ProjectionError, ProviderError,
    SearchError,
};
pub use indexer::RecipeIndexer;
pub use models::{
    Goal, IndexingReport, IngredientMatch, IngredientRecipeMatch, Recipe, RecipeMatch,
    ScoredCandidate, SearchFilters, TextChunk, UserPreferences, VectorQuery,
};
pub use projection::RecipeTextProjector;
pub use providers::{NgramEmbeddingProvider, OpenAiEmbeddingProvider};
pub use retriever::RecipeRetriever;
pub use search::{HybridWeights, VectorSearchEngine};
pub use stores::{InMemoryRecipeStore, PgRecipeStore};
pub use traits::{EmbeddingProvider, RecipeStore};
