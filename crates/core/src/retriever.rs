use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::models::{
    IngredientMatch, IngredientRecipeMatch, Recipe, RecipeMatch, SearchFilters, UserPreferences,
};
use crate::search::{HybridWeights, VectorSearchEngine};
use crate::traits::RecipeStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Read-only façade over the search engine. Search failures are logged and
/// returned as empty results, so callers cannot tell an outage from zero
/// matches.
pub struct RecipeRetriever<S> {
    engine: Arc<VectorSearchEngine<S>>,
    store: Arc<S>,
    config: SearchConfig,
}

impl<S> RecipeRetriever<S>
where
    S: RecipeStore,
{
    pub fn new(engine: Arc<VectorSearchEngine<S>>, store: Arc<S>, config: SearchConfig) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn find_by_query(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
        use_hybrid: bool,
    ) -> Vec<RecipeMatch> {
        let result = if use_hybrid {
            self.engine
                .hybrid_search(query, limit, HybridWeights::from(&self.config), filters)
                .await
        } else {
            self.engine
                .search_by_text(query, limit, self.config.semantic_threshold, filters)
                .await
        };

        degrade("find_by_query", result)
            .into_iter()
            .map(|candidate| RecipeMatch {
                match_reason: explain_match(query, &candidate.recipe, candidate.score),
                recipe: candidate.recipe,
                score: candidate.score,
            })
            .collect()
    }

    /// Candidates come from an ingredient-phrased semantic search; survivors
    /// of the `min_match_percentage` cut are ranked by match percentage.
    pub async fn find_by_ingredients(
        &self,
        ingredients: &[String],
        limit: usize,
        min_match_percentage: f64,
    ) -> Vec<IngredientRecipeMatch> {
        let wanted = ingredients
            .iter()
            .map(|name| normalize_ingredient(name))
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>();
        if wanted.is_empty() {
            return Vec::new();
        }

        degrade(
            "find_by_ingredients",
            self.try_find_by_ingredients(&wanted, limit, min_match_percentage)
                .await,
        )
    }

    async fn try_find_by_ingredients(
        &self,
        wanted: &[String],
        limit: usize,
        min_match_percentage: f64,
    ) -> Result<Vec<IngredientRecipeMatch>, SearchError> {
        let available = wanted.iter().cloned().collect::<BTreeSet<_>>();
        let candidates = self
            .engine
            .search_by_ingredients(wanted, limit, self.config.ingredient_threshold)
            .await?;

        let mut matches = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let recipe_ingredients = self.store.recipe_ingredients(candidate.recipe.id).await?;
            let ingredients = ingredient_match(&available, &recipe_ingredients);
            if ingredients.match_percentage >= min_match_percentage {
                matches.push(IngredientRecipeMatch {
                    recipe: candidate.recipe,
                    score: candidate.score,
                    ingredients,
                });
            }
        }

        matches.sort_by(|left, right| {
            right
                .ingredients
                .match_percentage
                .total_cmp(&left.ingredients.match_percentage)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// "More like this" for a stored recipe.
    pub async fn recommend(&self, recipe_id: i64, limit: usize) -> Vec<Recipe> {
        degrade("recommend", self.engine.find_similar(recipe_id, limit).await)
            .into_iter()
            .map(|candidate| candidate.recipe)
            .collect()
    }

    /// Hybrid search over the query expanded with preference terms.
    pub async fn search_with_context(
        &self,
        query: &str,
        preferences: &UserPreferences,
        limit: usize,
    ) -> Vec<RecipeMatch> {
        let expanded = expand_query(query, preferences);
        let filters = SearchFilters {
            max_prep_time: preferences.max_cook_time,
            ..Default::default()
        };
        self.find_by_query(&expanded, limit, &filters, true).await
    }
}

fn degrade<T>(operation: &'static str, result: Result<Vec<T>, SearchError>) -> Vec<T> {
    result.unwrap_or_else(|error| {
        warn!(operation, %error, "search degraded to an empty result");
        Vec::new()
    })
}

fn normalize_ingredient(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Share of the recipe's own ingredients found in `available`. A recipe with
/// no known ingredients matches nothing.
pub fn ingredient_match(
    available: &BTreeSet<String>,
    recipe_ingredients: &[String],
) -> IngredientMatch {
    let (have, missing): (BTreeSet<_>, BTreeSet<_>) = recipe_ingredients
        .iter()
        .map(|name| normalize_ingredient(name))
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .partition(|name| available.contains(name));

    let total = have.len() + missing.len();
    let match_percentage = if total == 0 {
        0.0
    } else {
        have.len() as f64 / total as f64
    };

    IngredientMatch {
        available: have,
        missing,
        match_percentage,
    }
}

/// Human-readable reasons for a hit. Never feeds back into ranking.
pub fn explain_match(query: &str, recipe: &Recipe, score: f64) -> String {
    let needle = query.to_lowercase();
    let mut reasons = Vec::new();

    if recipe.title.to_lowercase().contains(&needle) {
        reasons.push("matches recipe title".to_string());
    }
    if let Some(cuisine) = recipe
        .cuisine
        .as_deref()
        .filter(|cuisine| cuisine.to_lowercase().contains(&needle))
    {
        reasons.push(format!("is {cuisine} cuisine"));
    }
    if let Some(category) = recipe
        .category
        .as_deref()
        .filter(|category| category.to_lowercase().contains(&needle))
    {
        reasons.push(format!("is a {category} dish"));
    }

    if score > 0.9 {
        reasons.push("very high similarity".to_string());
    } else if score > 0.8 {
        reasons.push("high similarity".to_string());
    } else if score > 0.7 {
        reasons.push("good similarity".to_string());
    }

    if reasons.is_empty() {
        "semantic similarity".to_string()
    } else {
        reasons.join(", ")
    }
}

pub fn expand_query(query: &str, preferences: &UserPreferences) -> String {
    let mut terms = Vec::new();
    if let Some(dietary) = preferences.dietary_preference.as_deref() {
        terms.push(dietary);
    }
    if let Some(goal_terms) = preferences.goal.as_ref().and_then(|goal| goal.query_terms()) {
        terms.push(goal_terms);
    }

    if terms.is_empty() {
        query.to_string()
    } else {
        format!("{query} {}", terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingConfig, EmbeddingService};
    use crate::error::ProviderError;
    use crate::models::Goal;
    use crate::stores::InMemoryRecipeStore;
    use crate::traits::EmbeddingProvider;
    use async_trait::async_trait;

    /// Embeds every text as the same vector, or fails every call.
    struct FixedProvider {
        vector: Vec<f32>,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn embed_one(&self, _text: &str, _model: &str) -> Result<Vec<f32>, ProviderError> {
            if self.fail {
                return Err(ProviderError::Malformed("no data".to_string()));
            }
            Ok(self.vector.clone())
        }

        async fn embed_many(
            &self,
            texts: &[String],
            model: &str,
        ) -> Result<Vec<Vec<f32>>, ProviderError> {
            let mut vectors = Vec::new();
            for text in texts {
                vectors.push(self.embed_one(text, model).await?);
            }
            Ok(vectors)
        }
    }

    fn retriever(
        store: Arc<InMemoryRecipeStore>,
        fail: bool,
    ) -> RecipeRetriever<InMemoryRecipeStore> {
        let embeddings = Arc::new(EmbeddingService::new(
            FixedProvider {
                vector: vec![1.0, 0.0],
                fail,
            },
            EmbeddingConfig {
                dimension: 2,
                batch_delay_ms: 0,
                ..Default::default()
            },
        ));
        let engine = Arc::new(VectorSearchEngine::new(store.clone(), embeddings));
        RecipeRetriever::new(engine, store, SearchConfig::default())
    }

    fn recipe(id: i64, title: &str, embedding: Vec<f32>) -> Recipe {
        let mut recipe = Recipe::new(id, title);
        recipe.embedding = Some(embedding);
        recipe
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn explanations_combine_containment_and_score_bands() {
        let mut pho = Recipe::new(1, "Pho Bo");
        pho.cuisine = Some("Vietnamese".to_string());
        pho.category = Some("Soup".to_string());

        assert_eq!(
            explain_match("pho", &pho, 0.95),
            "matches recipe title, very high similarity"
        );
        assert_eq!(
            explain_match("vietnam", &pho, 0.85),
            "is Vietnamese cuisine, high similarity"
        );
        assert_eq!(explain_match("SOUP", &pho, 0.75), "is a Soup dish, good similarity");
        assert_eq!(explain_match("ramen", &pho, 0.7), "semantic similarity");
    }

    #[test]
    fn query_expansion_uses_known_preferences_only() {
        let preferences = UserPreferences {
            dietary_preference: Some("vegetarian".to_string()),
            goal: Some(Goal::WeightLoss),
            max_cook_time: None,
        };
        assert_eq!(
            expand_query("noodles", &preferences),
            "noodles vegetarian healthy low-calorie"
        );

        let unknown_goal = UserPreferences {
            goal: Some(Goal::from("bulking")),
            ..Default::default()
        };
        assert_eq!(expand_query("noodles", &unknown_goal), "noodles");
    }

    #[test]
    fn ingredient_match_is_relative_to_the_recipe() {
        let available = names(&["chicken", "tomato", "onion"]).into_iter().collect();
        let recipe = names(&["Chicken ", "garlic", "tomato", "onion"]);
        let matched = ingredient_match(&available, &recipe);
        assert_eq!(matched.match_percentage, 0.75);
        assert_eq!(matched.missing, names(&["garlic"]).into_iter().collect());

        let empty = ingredient_match(&available, &[]);
        assert_eq!(empty.match_percentage, 0.0);
        assert!(empty.available.is_empty());
    }

    #[tokio::test]
    async fn ingredient_results_rank_by_match_not_similarity() {
        let store = InMemoryRecipeStore::new();
        store
            .insert_with_ingredients(
                recipe(1, "Chicken Cacciatore", vec![1.0, 0.3]),
                names(&["chicken", "tomato", "onion", "garlic"]),
            )
            .await;
        store
            .insert_with_ingredients(
                recipe(2, "Chicken Rice", vec![1.0, 0.0]),
                names(&["chicken", "rice"]),
            )
            .await;
        store
            .insert_with_ingredients(
                recipe(3, "Beef Noodles", vec![1.0, 0.5]),
                names(&["beef", "noodles", "onion"]),
            )
            .await;
        store
            .insert_with_ingredients(
                recipe(4, "Tomato Chicken", vec![1.0, 1.0]),
                names(&["Chicken", "Tomato"]),
            )
            .await;
        let retriever = retriever(Arc::new(store), false);

        let matches = retriever
            .find_by_ingredients(&names(&[" Chicken", "tomato", "onion"]), 10, 0.5)
            .await;

        let ids: Vec<_> = matches.iter().map(|m| m.recipe.id).collect();
        assert_eq!(ids, vec![4, 1, 2]);
        assert_eq!(matches[0].ingredients.match_percentage, 1.0);
        assert!(matches[2].score > matches[0].score);

        assert!(retriever.find_by_ingredients(&names(&["  "]), 10, 0.5).await.is_empty());
    }

    #[tokio::test]
    async fn semantic_queries_carry_match_reasons() {
        let store = InMemoryRecipeStore::new();
        store.insert(recipe(1, "Pho Ga", vec![1.0, 0.0])).await;
        store.insert(recipe(2, "Apple Pie", vec![0.0, 1.0])).await;
        let retriever = retriever(Arc::new(store), false);

        let matches = retriever
            .find_by_query("pho", 10, &SearchFilters::default(), false)
            .await;

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].match_reason, "matches recipe title, very high similarity");
    }

    #[tokio::test]
    async fn context_search_bounds_preparation_time() {
        let store = InMemoryRecipeStore::new();
        let mut quick = recipe(1, "Quick noodle soup", vec![1.0, 0.0]);
        quick.prep_time = Some(15);
        let mut slow = recipe(2, "Slow noodle soup", vec![1.0, 0.0]);
        slow.prep_time = Some(90);
        store.insert(quick).await;
        store.insert(slow).await;
        let retriever = retriever(Arc::new(store), false);

        let preferences = UserPreferences {
            max_cook_time: Some(30),
            ..Default::default()
        };
        let matches = retriever
            .search_with_context("noodle soup", &preferences, 10)
            .await;

        let ids: Vec<_> = matches.iter().map(|m| m.recipe.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn recommendations_are_bare_recipes() {
        let store = InMemoryRecipeStore::new();
        store.insert(recipe(1, "Pho Ga", vec![1.0, 0.0])).await;
        store.insert(recipe(2, "Pho Bo", vec![0.9, 0.1])).await;
        store.insert(recipe(3, "Apple Pie", vec![0.0, 1.0])).await;
        let retriever = retriever(Arc::new(store), false);

        let recipes = retriever.recommend(1, 5).await;
        let ids: Vec<_> = recipes.iter().map(|recipe| recipe.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn provider_outage_degrades_to_empty_results() {
        let store = InMemoryRecipeStore::new();
        store.insert(recipe(1, "Pho Ga", vec![1.0, 0.0])).await;
        let retriever = retriever(Arc::new(store), true);

        assert!(retriever
            .find_by_query("pho", 10, &SearchFilters::default(), true)
            .await
            .is_empty());
        assert!(retriever
            .find_by_ingredients(&names(&["chicken"]), 10, 0.0)
            .await
            .is_empty());
    }
}
