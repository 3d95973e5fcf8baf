use crate::config::IndexingConfig;
use crate::embeddings::EmbeddingService;
use crate::error::{DatastoreError, IndexingError};
use crate::models::{IndexingReport, Recipe};
use crate::projection::RecipeTextProjector;
use crate::traits::RecipeStore;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Keeps stored embeddings in line with each recipe's projected text.
pub struct RecipeIndexer<S> {
    store: Arc<S>,
    embeddings: Arc<EmbeddingService>,
    projector: RecipeTextProjector,
    config: IndexingConfig,
}

impl<S> RecipeIndexer<S>
where
    S: RecipeStore,
{
    pub fn new(store: Arc<S>, embeddings: Arc<EmbeddingService>, config: IndexingConfig) -> Self {
        Self {
            store,
            embeddings,
            projector: RecipeTextProjector,
            config,
        }
    }

    /// Projects, embeds and stores one recipe. Failures are logged and
    /// reported as `false`; nothing is written unless every step succeeds.
    pub async fn index_one(&self, recipe: &Recipe) -> bool {
        match self.try_index_one(recipe).await {
            Ok(true) => {
                info!(recipe_id = recipe.id, title = %recipe.title, "indexed recipe");
                true
            }
            Ok(false) => {
                warn!(recipe_id = recipe.id, "recipe vanished before its embedding was stored");
                false
            }
            Err(error) => {
                error!(recipe_id = recipe.id, %error, "failed to index recipe");
                false
            }
        }
    }

    async fn try_index_one(&self, recipe: &Recipe) -> Result<bool, IndexingError> {
        let text = self.projector.project(recipe)?;
        let embedding = self.embeddings.embed(&text).await?;
        Ok(self.store.set_embedding(recipe.id, &embedding).await?)
    }

    /// Indexes `recipe_ids` with one embedding call. Unknown ids are skipped
    /// and projection failures only fail their own recipe; a provider or
    /// write failure fails every recipe that reached the provider.
    pub async fn index_batch(&self, recipe_ids: &[i64]) -> IndexingReport {
        let mut seen = HashSet::new();
        let ids = recipe_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect::<Vec<_>>();

        let mut report = IndexingReport::default();
        if ids.is_empty() {
            return report;
        }

        let recipes = match self.store.get_recipes(&ids).await {
            Ok(recipes) => recipes,
            Err(error) => {
                error!(requested = ids.len(), %error, "failed to load recipes for indexing");
                report.failed = ids.len();
                return report;
            }
        };

        report.skipped = ids.len().saturating_sub(recipes.len());
        if recipes.is_empty() {
            warn!(?ids, "no recipes found for indexing");
            return report;
        }

        let mut texts = Vec::with_capacity(recipes.len());
        let mut valid_ids = Vec::with_capacity(recipes.len());
        for recipe in &recipes {
            match self.projector.project(recipe) {
                Ok(text) => {
                    texts.push(text);
                    valid_ids.push(recipe.id);
                }
                Err(error) => {
                    error!(recipe_id = recipe.id, %error, "failed to project recipe");
                    report.failed += 1;
                }
            }
        }

        if texts.is_empty() {
            return report;
        }

        match self.embed_and_store(&valid_ids, &texts).await {
            Ok(()) => {
                report.success = valid_ids.len();
                info!(indexed = report.success, "indexed recipe batch");
            }
            Err(error) => {
                error!(recipes = valid_ids.len(), %error, "batch indexing failed");
                report.failed += valid_ids.len();
                report.success = 0;
            }
        }

        report
    }

    async fn embed_and_store(&self, ids: &[i64], texts: &[String]) -> Result<(), IndexingError> {
        let vectors = self.embeddings.embed_batch(texts).await?;
        let updates = ids.iter().copied().zip(vectors).collect::<Vec<_>>();
        self.store.set_embeddings(&updates).await?;
        Ok(())
    }

    /// Re-embeds every visible recipe, `reindex_batch_size` at a time.
    pub async fn reindex_all(&self) -> Result<IndexingReport, DatastoreError> {
        let ids = self.store.visible_recipe_ids().await?;
        Ok(self.run_batches("reindex", &ids).await)
    }

    /// Embeds visible recipes that have no embedding yet.
    pub async fn index_missing(&self) -> Result<IndexingReport, DatastoreError> {
        let ids = self.store.unindexed_recipe_ids().await?;
        Ok(self.run_batches("index_missing", &ids).await)
    }

    async fn run_batches(&self, operation: &'static str, ids: &[i64]) -> IndexingReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut total = IndexingReport::default();

        if ids.is_empty() {
            info!(%run_id, operation, "no recipes to index");
            return total;
        }

        let batch_size = self.config.reindex_batch_size.max(1);
        info!(%run_id, operation, recipes = ids.len(), batch_size, "indexing started");

        for (batch_index, batch) in ids.chunks(batch_size).enumerate() {
            let report = self.index_batch(batch).await;
            info!(
                %run_id,
                batch = batch_index + 1,
                success = report.success,
                failed = report.failed,
                skipped = report.skipped,
                "processed indexing batch"
            );
            total.merge(report);
        }

        let elapsed_ms = (Utc::now() - started_at).num_milliseconds();
        info!(
            %run_id,
            operation,
            success = total.success,
            failed = total.failed,
            skipped = total.skipped,
            elapsed_ms,
            "indexing complete"
        );
        total
    }

    /// Clears a recipe's embedding so it drops out of vector search until it
    /// is indexed again.
    pub async fn remove_embedding(&self, recipe_id: i64) -> bool {
        match self.store.clear_embedding(recipe_id).await {
            Ok(true) => {
                info!(recipe_id, "removed recipe embedding");
                true
            }
            Ok(false) => false,
            Err(error) => {
                error!(recipe_id, %error, "failed to remove recipe embedding");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingConfig;
    use crate::error::ProviderError;
    use crate::providers::NgramEmbeddingProvider;
    use crate::search::VectorSearchEngine;
    use crate::stores::InMemoryRecipeStore;
    use crate::traits::EmbeddingProvider;
    use async_trait::async_trait;

    const DIMENSION: usize = 32;

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed_one(&self, _text: &str, _model: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }

        async fn embed_many(
            &self,
            _texts: &[String],
            _model: &str,
        ) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    fn embedding_config() -> EmbeddingConfig {
        EmbeddingConfig {
            dimension: DIMENSION,
            batch_delay_ms: 0,
            ..Default::default()
        }
    }

    fn ngram_service() -> Arc<EmbeddingService> {
        Arc::new(EmbeddingService::new(
            NgramEmbeddingProvider::new(DIMENSION),
            embedding_config(),
        ))
    }

    fn indexer(
        store: Arc<InMemoryRecipeStore>,
        embeddings: Arc<EmbeddingService>,
    ) -> RecipeIndexer<InMemoryRecipeStore> {
        RecipeIndexer::new(
            store,
            embeddings,
            IndexingConfig {
                reindex_batch_size: 2,
            },
        )
    }

    async fn seeded_store(titles: &[(i64, &str)]) -> Arc<InMemoryRecipeStore> {
        let store = InMemoryRecipeStore::new();
        for (id, title) in titles {
            store.insert(Recipe::new(*id, *title)).await;
        }
        Arc::new(store)
    }

    async fn embedding_of(store: &InMemoryRecipeStore, recipe_id: i64) -> Option<Vec<f32>> {
        store.get_recipe(recipe_id).await.unwrap()?.embedding
    }

    #[tokio::test]
    async fn projection_failure_is_isolated() {
        let store = seeded_store(&[(1, "Pho"), (2, "   "), (3, "Bun Cha")]).await;
        let indexer = indexer(store.clone(), ngram_service());

        let report = indexer.index_batch(&[1, 2, 3, 99, 1]).await;

        assert_eq!(
            report,
            IndexingReport {
                success: 2,
                failed: 1,
                skipped: 1
            }
        );
        assert!(embedding_of(&store, 1).await.is_some());
        assert!(embedding_of(&store, 2).await.is_none());
        assert_eq!(embedding_of(&store, 3).await.map(|v| v.len()), Some(DIMENSION));
    }

    #[tokio::test]
    async fn provider_failure_fails_the_whole_batch() {
        let store = seeded_store(&[(1, "Pho"), (2, "   "), (3, "Bun Cha")]).await;
        let embeddings = Arc::new(EmbeddingService::new(FailingProvider, embedding_config()));
        let indexer = indexer(store.clone(), embeddings);

        let report = indexer.index_batch(&[1, 2, 3]).await;

        assert_eq!(report.success, 0);
        assert_eq!(report.failed, 3);
        assert_eq!(store.unindexed_recipe_ids().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn index_one_reports_failures_without_writing() {
        let store = seeded_store(&[(1, "Pho")]).await;
        let indexer = indexer(store.clone(), ngram_service());

        assert!(indexer.index_one(&Recipe::new(1, "Pho")).await);
        assert!(!indexer.index_one(&Recipe::new(1, "")).await);
        assert!(!indexer.index_one(&Recipe::new(7, "Unknown")).await);

        let failing = indexer_with_failing_provider(store.clone());
        store.clear_embedding(1).await.unwrap();
        assert!(!failing.index_one(&Recipe::new(1, "Pho")).await);
        assert!(embedding_of(&store, 1).await.is_none());
    }

    fn indexer_with_failing_provider(
        store: Arc<InMemoryRecipeStore>,
    ) -> RecipeIndexer<InMemoryRecipeStore> {
        indexer(
            store,
            Arc::new(EmbeddingService::new(FailingProvider, embedding_config())),
        )
    }

    #[tokio::test]
    async fn reindex_all_covers_visible_recipes_in_sub_batches() {
        let store = seeded_store(&[
            (1, "Pho"),
            (2, "Bun Cha"),
            (3, "Banh Mi"),
            (4, ""),
            (5, "Goi Cuon"),
        ])
        .await;
        let mut hidden = Recipe::new(6, "Private Stew");
        hidden.is_public = false;
        store.insert(hidden).await;

        let report = indexer(store.clone(), ngram_service())
            .reindex_all()
            .await
            .unwrap();

        assert_eq!(
            report,
            IndexingReport {
                success: 4,
                failed: 1,
                skipped: 0
            }
        );
        assert!(embedding_of(&store, 6).await.is_none());
    }

    #[tokio::test]
    async fn index_missing_leaves_existing_embeddings_alone() {
        let store = seeded_store(&[(2, "Bun Cha"), (3, "Banh Mi")]).await;
        let mut indexed = Recipe::new(1, "Pho");
        indexed.embedding = Some(vec![1.0; DIMENSION]);
        store.insert(indexed).await;

        let report = indexer(store.clone(), ngram_service())
            .index_missing()
            .await
            .unwrap();

        assert_eq!(report.success, 2);
        assert_eq!(embedding_of(&store, 1).await, Some(vec![1.0; DIMENSION]));
        assert!(store.unindexed_recipe_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removed_embedding_cannot_anchor_similarity() {
        let store = seeded_store(&[(1, "Pho"), (2, "Bun Cha"), (3, "Banh Mi")]).await;
        let embeddings = ngram_service();
        let indexer = indexer(store.clone(), embeddings.clone());
        let engine = VectorSearchEngine::new(store.clone(), embeddings);

        indexer.reindex_all().await.unwrap();
        assert_eq!(engine.find_similar(1, 5).await.unwrap().len(), 2);

        assert!(indexer.remove_embedding(1).await);
        assert!(!indexer.remove_embedding(404).await);
        assert!(engine.find_similar(1, 5).await.unwrap().is_empty());
    }
}
