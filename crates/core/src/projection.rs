use crate::error::ProjectionError;
use crate::models::Recipe;

const SEPARATOR: &str = " | ";

/// Renders a recipe into the canonical text that gets embedded. Indexing and
/// any query-side expansion must go through the same projector.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipeTextProjector;

impl RecipeTextProjector {
    pub fn project(&self, recipe: &Recipe) -> Result<String, ProjectionError> {
        let title = recipe.title.trim();
        if title.is_empty() {
            return Err(ProjectionError::MissingTitle {
                recipe_id: recipe.id,
            });
        }

        let mut parts = vec![format!("Title: {title}")];

        push_text(&mut parts, "Description", recipe.description.as_deref());
        push_text(&mut parts, "Cuisine", recipe.cuisine.as_deref());
        push_text(&mut parts, "Category", recipe.category.as_deref());
        push_text(&mut parts, "Difficulty", recipe.difficulty.as_deref());
        push_minutes(&mut parts, "Preparation time", recipe.prep_time);
        push_minutes(&mut parts, "Cooking time", recipe.cook_time);

        if let Some(servings) = recipe.servings.filter(|servings| *servings > 0) {
            parts.push(format!("Servings: {servings}"));
        }

        let tags = recipe
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .collect::<Vec<_>>();
        if !tags.is_empty() {
            parts.push(format!("Tags: {}", tags.join(", ")));
        }

        Ok(parts.join(SEPARATOR))
    }
}

fn push_text(parts: &mut Vec<String>, label: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
        parts.push(format!("{label}: {value}"));
    }
}

// Zero minutes reads as "not recorded".
fn push_minutes(parts: &mut Vec<String>, label: &str, value: Option<i32>) {
    if let Some(minutes) = value.filter(|minutes| *minutes > 0) {
        parts.push(format!("{label}: {minutes} minutes"));
    }
}
