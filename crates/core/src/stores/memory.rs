use crate::embeddings::{cosine_similarity, has_magnitude};
use crate::error::DatastoreError;
use crate::models::{Recipe, ScoredCandidate, SearchFilters, VectorQuery};
use crate::traits::RecipeStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

const STOP_WORDS: [&str; 14] = [
    "a", "an", "and", "at", "for", "from", "in", "of", "on", "or", "the", "to", "with", "by",
];

struct StoredRecipe {
    recipe: Recipe,
    ingredients: Vec<String>,
}

/// Process-local recipe store. Natural order is ascending recipe id.
#[derive(Default)]
pub struct InMemoryRecipeStore {
    recipes: RwLock<BTreeMap<i64, StoredRecipe>>,
}

impl InMemoryRecipeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, recipe: Recipe) {
        self.insert_with_ingredients(recipe, Vec::new()).await;
    }

    pub async fn insert_with_ingredients(&self, recipe: Recipe, ingredients: Vec<String>) {
        self.recipes.write().await.insert(
            recipe.id,
            StoredRecipe {
                recipe,
                ingredients,
            },
        );
    }
}

#[async_trait]
impl RecipeStore for InMemoryRecipeStore {
    async fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>, DatastoreError> {
        Ok(self
            .recipes
            .read()
            .await
            .get(&recipe_id)
            .map(|stored| stored.recipe.clone()))
    }

    async fn get_recipes(&self, recipe_ids: &[i64]) -> Result<Vec<Recipe>, DatastoreError> {
        let recipes = self.recipes.read().await;
        Ok(recipe_ids
            .iter()
            .filter_map(|id| recipes.get(id).map(|stored| stored.recipe.clone()))
            .collect())
    }

    async fn visible_recipe_ids(&self) -> Result<Vec<i64>, DatastoreError> {
        self.eligible_recipe_ids(&SearchFilters::default()).await
    }

    async fn unindexed_recipe_ids(&self) -> Result<Vec<i64>, DatastoreError> {
        Ok(self
            .recipes
            .read()
            .await
            .values()
            .filter(|stored| stored.recipe.is_public && !stored.recipe.is_indexed())
            .map(|stored| stored.recipe.id)
            .collect())
    }

    async fn set_embedding(
        &self,
        recipe_id: i64,
        embedding: &[f32],
    ) -> Result<bool, DatastoreError> {
        let mut recipes = self.recipes.write().await;
        match recipes.get_mut(&recipe_id) {
            Some(stored) => {
                stored.recipe.embedding = Some(embedding.to_vec());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_embeddings(&self, updates: &[(i64, Vec<f32>)]) -> Result<(), DatastoreError> {
        let mut recipes = self.recipes.write().await;
        if let Some((missing, _)) = updates.iter().find(|(id, _)| !recipes.contains_key(id)) {
            return Err(DatastoreError::MissingRecipe(*missing));
        }

        for (recipe_id, embedding) in updates {
            if let Some(stored) = recipes.get_mut(recipe_id) {
                stored.recipe.embedding = Some(embedding.clone());
            }
        }
        Ok(())
    }

    async fn clear_embedding(&self, recipe_id: i64) -> Result<bool, DatastoreError> {
        let mut recipes = self.recipes.write().await;
        match recipes.get_mut(&recipe_id) {
            Some(stored) => {
                stored.recipe.embedding = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn nearest(&self, query: &VectorQuery) -> Result<Vec<ScoredCandidate>, DatastoreError> {
        let recipes = self.recipes.read().await;
        let mut scored = recipes
            .values()
            .map(|stored| &stored.recipe)
            .filter(|recipe| recipe.is_public && query.filters.matches(recipe))
            .filter(|recipe| Some(recipe.id) != query.exclude_id)
            .filter_map(|recipe| {
                let embedding = recipe.embedding.as_deref()?;
                let score = vector_similarity(embedding, &query.vector)?;
                Some((recipe, score))
            })
            .filter(|(_, score)| query.threshold.map_or(true, |threshold| *score >= threshold))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        Ok(scored
            .into_iter()
            .take(query.limit)
            .map(|(recipe, score)| ScoredCandidate {
                recipe: recipe.clone(),
                score,
            })
            .collect())
    }

    async fn semantic_scores(
        &self,
        query_vector: &[f32],
        filters: &SearchFilters,
    ) -> Result<HashMap<i64, f64>, DatastoreError> {
        let recipes = self.recipes.read().await;
        Ok(recipes
            .values()
            .map(|stored| &stored.recipe)
            .filter(|recipe| recipe.is_public && filters.matches(recipe))
            .filter_map(|recipe| {
                let score = vector_similarity(recipe.embedding.as_deref()?, query_vector)?;
                Some((recipe.id, score))
            })
            .collect())
    }

    async fn keyword_scores(
        &self,
        query_text: &str,
        filters: &SearchFilters,
    ) -> Result<HashMap<i64, f64>, DatastoreError> {
        let terms = query_terms(query_text);
        if terms.is_empty() {
            return Ok(HashMap::new());
        }

        let recipes = self.recipes.read().await;
        Ok(recipes
            .values()
            .map(|stored| &stored.recipe)
            .filter(|recipe| recipe.is_public && filters.matches(recipe))
            .filter_map(|recipe| {
                let document = format!(
                    "{} {}",
                    recipe.title,
                    recipe.description.as_deref().unwrap_or_default()
                );
                let score = lexical_score(&terms, &document);
                (score > 0.0).then_some((recipe.id, score))
            })
            .collect())
    }

    async fn eligible_recipe_ids(
        &self,
        filters: &SearchFilters,
    ) -> Result<Vec<i64>, DatastoreError> {
        Ok(self
            .recipes
            .read()
            .await
            .values()
            .filter(|stored| stored.recipe.is_public && filters.matches(&stored.recipe))
            .map(|stored| stored.recipe.id)
            .collect())
    }

    async fn recipe_ingredients(&self, recipe_id: i64) -> Result<Vec<String>, DatastoreError> {
        Ok(self
            .recipes
            .read()
            .await
            .get(&recipe_id)
            .map(|stored| stored.ingredients.clone())
            .unwrap_or_default())
    }
}

/// `1 - cosine_distance / 2`, or `None` when the distance is undefined.
fn vector_similarity(stored: &[f32], query: &[f32]) -> Option<f64> {
    if stored.len() != query.len() || !has_magnitude(stored) || !has_magnitude(query) {
        return None;
    }
    let distance = 1.0 - cosine_similarity(stored, query);
    Some(1.0 - distance / 2.0)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| fold_plural(&token.to_lowercase()))
        .collect()
}

fn fold_plural(token: &str) -> String {
    if token.chars().count() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms = tokenize(query)
        .into_iter()
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect::<Vec<_>>();
    terms.sort_unstable();
    terms.dedup();
    terms
}

/// Mean over query terms of `tf / (tf + 1)`, so the score lies in [0, 1).
fn lexical_score(terms: &[String], document: &str) -> f64 {
    let tokens = tokenize(document);
    let total = terms
        .iter()
        .map(|term| {
            let frequency = tokens.iter().filter(|token| *token == term).count() as f64;
            frequency / (frequency + 1.0)
        })
        .sum::<f64>();
    total / terms.len() as f64
}
