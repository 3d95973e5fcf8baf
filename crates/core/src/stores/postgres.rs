use crate::embeddings::has_magnitude;
use crate::error::DatastoreError;
use crate::models::{Recipe, ScoredCandidate, SearchFilters, VectorQuery};
use crate::traits::RecipeStore;
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

const RECIPE_COLUMNS: &str = "id, title, description, cuisine, difficulty, category, prep_time, \
     cook_time, servings, tags, is_public, embedding";

const SEARCH_DOCUMENT: &str = "to_tsvector('english', title || ' ' || coalesce(description, ''))";

// `<=>` is undefined (NaN) against a zero vector, so those rows never score.
const SCORABLE: &str =
    "embedding IS NOT NULL AND vector_norm(embedding) > 0 AND is_public = true";

/// pgvector-backed store. `<=>` is cosine distance in [0, 2].
pub struct PgRecipeStore {
    pool: PgPool,
    dimension: usize,
}

impl PgRecipeStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        dimension: usize,
    ) -> Result<Self, DatastoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        Ok(Self::from_pool(pool, dimension))
    }

    pub fn from_pool(pool: PgPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }

    pub async fn ensure_schema(&self) -> Result<(), DatastoreError> {
        let statements = [
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id BIGSERIAL PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT,
                    cuisine TEXT,
                    difficulty TEXT,
                    category TEXT,
                    prep_time INTEGER,
                    cook_time INTEGER,
                    servings INTEGER,
                    tags TEXT,
                    is_public BOOLEAN NOT NULL DEFAULT TRUE,
                    embedding VECTOR({})
                )",
                self.dimension
            ),
            "CREATE TABLE IF NOT EXISTS ingredients (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            )"
            .to_string(),
            "CREATE TABLE IF NOT EXISTS recipe_ingredients (
                id BIGSERIAL PRIMARY KEY,
                recipe_id BIGINT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                ingredient_id BIGINT NOT NULL REFERENCES ingredients(id)
            )"
            .to_string(),
            format!(
                "CREATE INDEX IF NOT EXISTS recipes_search_document_idx \
                 ON recipes USING GIN ({SEARCH_DOCUMENT})"
            ),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!(dimension = self.dimension, "recipe schema ready");
        Ok(())
    }
}

#[async_trait]
impl RecipeStore for PgRecipeStore {
    async fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>, DatastoreError> {
        let row = sqlx::query(&format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1"))
            .bind(recipe_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(recipe_from_row).transpose()
    }

    async fn get_recipes(&self, recipe_ids: &[i64]) -> Result<Vec<Recipe>, DatastoreError> {
        if recipe_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(recipe_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(recipe_from_row).collect()
    }

    async fn visible_recipe_ids(&self) -> Result<Vec<i64>, DatastoreError> {
        Ok(
            sqlx::query_scalar("SELECT id FROM recipes WHERE is_public = true ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn unindexed_recipe_ids(&self) -> Result<Vec<i64>, DatastoreError> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM recipes WHERE is_public = true AND embedding IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_embedding(
        &self,
        recipe_id: i64,
        embedding: &[f32],
    ) -> Result<bool, DatastoreError> {
        let result = sqlx::query("UPDATE recipes SET embedding = $1 WHERE id = $2")
            .bind(Vector::from(embedding.to_vec()))
            .bind(recipe_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_embeddings(&self, updates: &[(i64, Vec<f32>)]) -> Result<(), DatastoreError> {
        let mut tx = self.pool.begin().await?;

        for (recipe_id, embedding) in updates {
            let result = sqlx::query("UPDATE recipes SET embedding = $1 WHERE id = $2")
                .bind(Vector::from(embedding.clone()))
                .bind(*recipe_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(DatastoreError::MissingRecipe(*recipe_id));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear_embedding(&self, recipe_id: i64) -> Result<bool, DatastoreError> {
        let result = sqlx::query("UPDATE recipes SET embedding = NULL WHERE id = $1")
            .bind(recipe_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn nearest(&self, query: &VectorQuery) -> Result<Vec<ScoredCandidate>, DatastoreError> {
        if !has_magnitude(&query.vector) {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {RECIPE_COLUMNS}, "));
        push_similarity(&mut builder, &query.vector);
        builder.push(format!(" AS similarity FROM recipes WHERE {SCORABLE}"));

        if let Some(exclude_id) = query.exclude_id {
            builder.push(" AND id <> ").push_bind(exclude_id);
        }
        if let Some(threshold) = query.threshold {
            builder.push(" AND ");
            push_similarity(&mut builder, &query.vector);
            builder.push(" >= ").push_bind(threshold);
        }
        push_filters(&mut builder, &query.filters);
        builder
            .push(" ORDER BY similarity DESC LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<ScoredCandidate, DatastoreError> {
                Ok(ScoredCandidate {
                    recipe: recipe_from_row(row)?,
                    score: row.try_get("similarity")?,
                })
            })
            .collect()
    }

    async fn semantic_scores(
        &self,
        query_vector: &[f32],
        filters: &SearchFilters,
    ) -> Result<HashMap<i64, f64>, DatastoreError> {
        if !has_magnitude(query_vector) {
            return Ok(HashMap::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new("SELECT id, ");
        push_similarity(&mut builder, query_vector);
        builder.push(format!(" AS score FROM recipes WHERE {SCORABLE}"));
        push_filters(&mut builder, filters);

        let rows = builder.build().fetch_all(&self.pool).await?;
        score_map(&rows)
    }

    async fn keyword_scores(
        &self,
        query_text: &str,
        filters: &SearchFilters,
    ) -> Result<HashMap<i64, f64>, DatastoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT id, ts_rank({SEARCH_DOCUMENT}, plainto_tsquery('english', "
        ));
        builder.push_bind(query_text.to_string());
        builder.push("))::float8 AS score FROM recipes WHERE is_public = true AND ");
        builder.push(format!("{SEARCH_DOCUMENT} @@ plainto_tsquery('english', "));
        builder.push_bind(query_text.to_string());
        builder.push(")");
        push_filters(&mut builder, filters);

        let rows = builder.build().fetch_all(&self.pool).await?;
        score_map(&rows)
    }

    async fn eligible_recipe_ids(
        &self,
        filters: &SearchFilters,
    ) -> Result<Vec<i64>, DatastoreError> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT id FROM recipes WHERE is_public = true");
        push_filters(&mut builder, filters);
        builder.push(" ORDER BY id");
        Ok(builder
            .build_query_scalar::<i64>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn recipe_ingredients(&self, recipe_id: i64) -> Result<Vec<String>, DatastoreError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT i.name
            FROM recipe_ingredients ri
            JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE ri.recipe_id = $1
            ORDER BY ri.id
            "#,
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

fn push_similarity(builder: &mut QueryBuilder<'_, Postgres>, query_vector: &[f32]) {
    builder
        .push("1 - (embedding <=> ")
        .push_bind(Vector::from(query_vector.to_vec()))
        .push(") / 2");
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &SearchFilters) {
    if let Some(cuisine) = &filters.cuisine {
        builder.push(" AND cuisine = ").push_bind(cuisine.clone());
    }
    if let Some(difficulty) = &filters.difficulty {
        builder.push(" AND difficulty = ").push_bind(difficulty.clone());
    }
    if let Some(max_prep_time) = filters.max_prep_time {
        builder.push(" AND prep_time <= ").push_bind(max_prep_time);
    }
    if let Some(category) = &filters.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
}

fn score_map(rows: &[PgRow]) -> Result<HashMap<i64, f64>, DatastoreError> {
    rows.iter()
        .map(|row| -> Result<(i64, f64), DatastoreError> {
            Ok((row.try_get("id")?, row.try_get("score")?))
        })
        .collect()
}

fn recipe_from_row(row: &PgRow) -> Result<Recipe, DatastoreError> {
    Ok(Recipe {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        cuisine: row.try_get("cuisine")?,
        difficulty: row.try_get("difficulty")?,
        category: row.try_get("category")?,
        prep_time: row.try_get("prep_time")?,
        cook_time: row.try_get("cook_time")?,
        servings: row.try_get("servings")?,
        tags: parse_tags(row.try_get("tags")?),
        is_public: row.try_get("is_public")?,
        embedding: row
            .try_get::<Option<Vector>, _>("embedding")?
            .map(|vector| vector.to_vec()),
    })
}

/// Tags are stored either as a JSON array or as a comma separated list.
fn parse_tags(raw: Option<String>) -> Vec<String> {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return Vec::new();
    };

    serde_json::from_str::<Vec<String>>(&raw).unwrap_or_else(|_| {
        raw.split(',')
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_store() -> PgRecipeStore {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://recipes@127.0.0.1:1/recipes")
            .unwrap();
        PgRecipeStore::from_pool(pool, 3)
    }

    #[tokio::test]
    async fn zero_query_vectors_score_nothing_without_querying() {
        let store = offline_store();
        let query = VectorQuery {
            vector: vec![0.0; 3],
            limit: 5,
            threshold: Some(0.7),
            filters: SearchFilters::default(),
            exclude_id: None,
        };

        assert!(store.nearest(&query).await.unwrap().is_empty());
        assert!(store
            .semantic_scores(&[0.0; 3], &SearchFilters::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn tags_accept_json_and_comma_lists() {
        assert_eq!(
            parse_tags(Some(r#"["soup", "noodles"]"#.to_string())),
            vec!["soup".to_string(), "noodles".to_string()]
        );
        assert_eq!(
            parse_tags(Some("soup, noodles,".to_string())),
            vec!["soup".to_string(), "noodles".to_string()]
        );
        assert!(parse_tags(None).is_empty());
    }
}
