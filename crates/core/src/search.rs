use crate::config::SearchConfig;
use crate::embeddings::{has_magnitude, EmbeddingService};
use crate::error::SearchError;
use crate::models::{ScoredCandidate, SearchFilters, VectorQuery};
use crate::traits::RecipeStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Linear weights for hybrid ranking. They are applied as given: the fused
/// score is only meaningful for ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub semantic: f64,
    pub keyword: f64,
}

impl From<&SearchConfig> for HybridWeights {
    fn from(config: &SearchConfig) -> Self {
        Self {
            semantic: config.semantic_weight,
            keyword: config.keyword_weight,
        }
    }
}

pub struct VectorSearchEngine<S> {
    store: Arc<S>,
    embeddings: Arc<EmbeddingService>,
}

impl<S> VectorSearchEngine<S>
where
    S: RecipeStore,
{
    pub fn new(store: Arc<S>, embeddings: Arc<EmbeddingService>) -> Self {
        Self { store, embeddings }
    }

    /// Visible, embedded recipes scoring at least `threshold`, best first.
    pub async fn search_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
        threshold: f64,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredCandidate>, SearchError> {
        if !threshold.is_finite() {
            return Err(SearchError::InvalidQuery(format!(
                "threshold {threshold} is not a number"
            )));
        }
        if limit == 0 || !has_magnitude(query_vector) {
            return Ok(Vec::new());
        }

        let hits = self
            .store
            .nearest(&VectorQuery {
                vector: query_vector.to_vec(),
                limit,
                threshold: Some(threshold),
                filters: filters.clone(),
                exclude_id: None,
            })
            .await?;

        debug!(limit, threshold, hits = hits.len(), "vector search");
        Ok(hits)
    }

    pub async fn search_by_text(
        &self,
        query_text: &str,
        limit: usize,
        threshold: f64,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredCandidate>, SearchError> {
        ensure_query(query_text)?;
        let query_vector = self.embeddings.embed(query_text).await?;
        self.search_by_vector(&query_vector, limit, threshold, filters)
            .await
    }

    pub async fn search_by_ingredients(
        &self,
        ingredients: &[String],
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredCandidate>, SearchError> {
        let query_text = ingredient_query(ingredients);
        self.search_by_text(&query_text, limit, threshold, &SearchFilters::default())
            .await
    }

    /// Nearest visible recipes to a stored recipe, without a threshold. A
    /// recipe that has never been indexed anchors nothing.
    pub async fn find_similar(
        &self,
        recipe_id: i64,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, SearchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let Some(embedding) = self
            .store
            .get_recipe(recipe_id)
            .await?
            .and_then(|recipe| recipe.embedding)
        else {
            debug!(recipe_id, "similarity anchor has no embedding");
            return Ok(Vec::new());
        };

        Ok(self
            .store
            .nearest(&VectorQuery {
                vector: embedding,
                limit,
                threshold: None,
                filters: SearchFilters::default(),
                exclude_id: Some(recipe_id),
            })
            .await?)
    }

    /// Ranks every eligible recipe by
    /// `weights.semantic * semantic + weights.keyword * keyword`, where a
    /// missing embedding or a lexical miss contributes zero.
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        limit: usize,
        weights: HybridWeights,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredCandidate>, SearchError> {
        ensure_query(query_text)?;
        if !weights.semantic.is_finite() || !weights.keyword.is_finite() {
            return Err(SearchError::InvalidQuery(
                "hybrid weights must be finite".to_string(),
            ));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embeddings.embed(query_text).await?;
        let (eligible, semantic, keyword) = tokio::try_join!(
            self.store.eligible_recipe_ids(filters),
            self.store.semantic_scores(&query_vector, filters),
            self.store.keyword_scores(query_text, filters)
        )?;

        let ranked = fuse_scores(&eligible, &semantic, &keyword, weights, limit);
        let ids = ranked.iter().map(|(id, _)| *id).collect::<Vec<_>>();
        let mut recipes = self
            .store
            .get_recipes(&ids)
            .await?
            .into_iter()
            .map(|recipe| (recipe.id, recipe))
            .collect::<HashMap<_, _>>();

        debug!(
            eligible = eligible.len(),
            semantic = semantic.len(),
            keyword = keyword.len(),
            returned = ranked.len(),
            "hybrid search"
        );

        Ok(ranked
            .into_iter()
            .filter_map(|(id, score)| {
                recipes
                    .remove(&id)
                    .map(|recipe| ScoredCandidate { recipe, score })
            })
            .collect())
    }
}

pub fn ingredient_query(ingredients: &[String]) -> String {
    format!("Recipe with ingredients: {}", ingredients.join(", "))
}

fn ensure_query(query_text: &str) -> Result<(), SearchError> {
    if query_text.trim().is_empty() {
        return Err(SearchError::InvalidQuery("query is empty".to_string()));
    }
    Ok(())
}

/// Fuses per-mode scores over `eligible` (in natural order) and keeps the
/// best `limit`. Equal scores keep natural order.
fn fuse_scores(
    eligible: &[i64],
    semantic: &HashMap<i64, f64>,
    keyword: &HashMap<i64, f64>,
    weights: HybridWeights,
    limit: usize,
) -> Vec<(i64, f64)> {
    let mut fused = eligible
        .iter()
        .map(|id| {
            let semantic_score = finite_score(semantic.get(id));
            let keyword_score = finite_score(keyword.get(id));
            (
                *id,
                weights.semantic * semantic_score + weights.keyword * keyword_score,
            )
        })
        .collect::<Vec<_>>();

    fused.sort_by(|left, right| right.1.total_cmp(&left.1));
    fused.truncate(limit);
    fused
}

// Missing and undefined (NaN, infinite) scores contribute nothing.
fn finite_score(score: Option<&f64>) -> f64 {
    score.copied().filter(|score| score.is_finite()).unwrap_or(0.0)
}
