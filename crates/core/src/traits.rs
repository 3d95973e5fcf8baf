use crate::error::{DatastoreError, ProviderError};
use crate::models::{Recipe, ScoredCandidate, SearchFilters, VectorQuery};
use async_trait::async_trait;
use std::collections::HashMap;

/// External model that turns text into vectors. Implementations must return
/// one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed_one(&self, text: &str, model: &str) -> Result<Vec<f32>, ProviderError>;

    async fn embed_many(
        &self,
        texts: &[String],
        model: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// The recipe datastore. It owns recipes and their embeddings; search and
/// indexing only ever set or clear a single recipe's embedding.
///
/// Similarity scores are `1 - cosine_distance / 2`. Ordering among equal
/// scores follows the store's natural order and is not guaranteed stable.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>, DatastoreError>;

    /// Missing ids are silently absent from the result.
    async fn get_recipes(&self, recipe_ids: &[i64]) -> Result<Vec<Recipe>, DatastoreError>;

    async fn visible_recipe_ids(&self) -> Result<Vec<i64>, DatastoreError>;

    async fn unindexed_recipe_ids(&self) -> Result<Vec<i64>, DatastoreError>;

    /// Returns `false` when the recipe does not exist.
    async fn set_embedding(
        &self,
        recipe_id: i64,
        embedding: &[f32],
    ) -> Result<bool, DatastoreError>;

    /// Applies every update or none of them.
    async fn set_embeddings(&self, updates: &[(i64, Vec<f32>)]) -> Result<(), DatastoreError>;

    /// Returns `false` when the recipe does not exist.
    async fn clear_embedding(&self, recipe_id: i64) -> Result<bool, DatastoreError>;

    /// Visible, embedded recipes ordered by descending similarity.
    async fn nearest(&self, query: &VectorQuery) -> Result<Vec<ScoredCandidate>, DatastoreError>;

    /// Similarity for every visible, embedded recipe that passes `filters`.
    async fn semantic_scores(
        &self,
        query_vector: &[f32],
        filters: &SearchFilters,
    ) -> Result<HashMap<i64, f64>, DatastoreError>;

    /// Lexical relevance over title and description for every visible
    /// recipe that passes `filters`. Recipes without a match are absent.
    async fn keyword_scores(
        &self,
        query_text: &str,
        filters: &SearchFilters,
    ) -> Result<HashMap<i64, f64>, DatastoreError>;

    /// Every visible recipe id passing `filters`, in natural order.
    async fn eligible_recipe_ids(
        &self,
        filters: &SearchFilters,
    ) -> Result<Vec<i64>, DatastoreError>;

    async fn recipe_ingredients(&self, recipe_id: i64) -> Result<Vec<String>, DatastoreError>;
}
