use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A recipe as owned by the datastore. `embedding` is only present once the
/// recipe has been indexed from its current projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub cuisine: Option<String>,
    pub difficulty: Option<String>,
    pub category: Option<String>,
    pub prep_time: Option<i32>,
    pub cook_time: Option<i32>,
    pub servings: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Recipe {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            cuisine: None,
            difficulty: None,
            category: None,
            prep_time: None,
            cook_time: None,
            servings: None,
            tags: Vec::new(),
            is_public: true,
            embedding: None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.embedding.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
    /// Character offsets into the source text, end exclusive.
    pub start_offset: usize,
    pub end_offset: usize,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub recipe: Recipe,
    pub score: f64,
}

/// Equality and range filters accepted by the search paths. Unset fields do
/// not constrain the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct SearchFilters {
    pub cuisine: Option<String>,
    pub difficulty: Option<String>,
    pub max_prep_time: Option<i32>,
    pub category: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.cuisine.is_none()
            && self.difficulty.is_none()
            && self.max_prep_time.is_none()
            && self.category.is_none()
    }

    /// A recipe without a prep time never satisfies `max_prep_time`.
    pub fn matches(&self, recipe: &Recipe) -> bool {
        fn equal(wanted: &Option<String>, actual: &Option<String>) -> bool {
            match wanted {
                Some(wanted) => actual.as_deref() == Some(wanted.as_str()),
                None => true,
            }
        }

        let prep_ok = match self.max_prep_time {
            Some(max) => recipe.prep_time.is_some_and(|prep| prep <= max),
            None => true,
        };

        equal(&self.cuisine, &recipe.cuisine)
            && equal(&self.difficulty, &recipe.difficulty)
            && equal(&self.category, &recipe.category)
            && prep_ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub threshold: Option<f64>,
    pub filters: SearchFilters,
    pub exclude_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IngredientMatch {
    pub available: BTreeSet<String>,
    pub missing: BTreeSet<String>,
    pub match_percentage: f64,
}

/// Counters for one indexing run. Nothing here outlives the run's report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndexingReport {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl IndexingReport {
    pub fn merge(&mut self, other: IndexingReport) {
        self.success += other.success;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> usize {
        self.success + self.failed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeMatch {
    pub recipe: Recipe,
    pub score: f64,
    pub match_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientRecipeMatch {
    pub recipe: Recipe,
    pub score: f64,
    pub ingredients: IngredientMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Goal {
    WeightLoss,
    MuscleGain,
    Maintenance,
    Other(String),
}

impl Goal {
    pub fn query_terms(&self) -> Option<&'static str> {
        match self {
            Goal::WeightLoss => Some("healthy low-calorie"),
            Goal::MuscleGain => Some("high-protein"),
            Goal::Maintenance => Some("balanced"),
            Goal::Other(_) => None,
        }
    }
}

impl From<&str> for Goal {
    fn from(value: &str) -> Self {
        match value {
            "weight_loss" => Goal::WeightLoss,
            "muscle_gain" => Goal::MuscleGain,
            "maintenance" => Goal::Maintenance,
            other => Goal::Other(other.to_string()),
        }
    }
}

impl From<String> for Goal {
    fn from(value: String) -> Self {
        Goal::from(value.as_str())
    }
}

impl From<Goal> for String {
    fn from(value: Goal) -> Self {
        match value {
            Goal::WeightLoss => "weight_loss".to_string(),
            Goal::MuscleGain => "muscle_gain".to_string(),
            Goal::Maintenance => "maintenance".to_string(),
            Goal::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserPreferences {
    pub dietary_preference: Option<String>,
    pub goal: Option<Goal>,
    /// Applied as a `max_prep_time` filter.
    pub max_cook_time: Option<i32>,
}
