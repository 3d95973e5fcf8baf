use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("missing provider api key")]
    MissingApiKey,
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("recipe {recipe_id} has no title to project")]
    MissingTitle { recipe_id: i64 },
}

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("recipe {0} does not exist")]
    MissingRecipe(i64),

    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("datastore failed: {0}")]
    Datastore(#[from] DatastoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("datastore failed: {0}")]
    Datastore(#[from] DatastoreError),
}

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),

    #[error("regex error: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
