use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recipe document as stored in the collection and returned over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Recipe {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub done: bool,
}

impl Recipe {
    /// A fresh recipe with a new id, no ingredients and `done` unset.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            ingredients: Vec::new(),
            done: false,
        }
    }

    pub fn ingredient_mut(&mut self, ingredient_id: &str) -> Option<&mut Ingredient> {
        self.ingredients.iter_mut().find(|i| i.id == ingredient_id)
    }

    /// Re-derive `done` from the ingredient flags.
    ///
    /// With no ingredients there is nothing to derive from, so the previous
    /// value is kept.
    pub fn refresh_done(&mut self) {
        if let Some(done) = all_added(&self.ingredients) {
            self.done = done;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub added: bool,
}

// --- Request payloads ---

/// Body of `POST /recipes` and `PUT /recipes/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewRecipe {
    #[serde(alias = "name")]
    pub name: String,
}

/// One element of the `POST /recipes/{id}/ingredients` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewIngredient {
    #[serde(alias = "name")]
    pub name: String,
    #[serde(alias = "quantity")]
    pub quantity: u32,
    #[serde(default, alias = "unit")]
    pub unit: Option<String>,
}

/// Body of `PATCH /recipes/{recipeId}/ingredients/{ingredientId}`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngredientUpdate {
    #[serde(alias = "added")]
    pub added: bool,
}

pub const UNITS_OF_MEASURE: &[&str] = &[
    "g",
    "kg",
    "ml",
    "dl",
    "teaspoon",
    "tablespoon",
    "container",
    "ea",
];

/// Match a unit case-insensitively against [`UNITS_OF_MEASURE`], returning
/// its canonical spelling.
pub fn validate_unit(unit: &str) -> Result<String> {
    let lower = unit.trim().to_lowercase();
    if UNITS_OF_MEASURE.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid unit '{unit}'. Must be one of: {}",
            UNITS_OF_MEASURE.join(", ")
        )
    }
}

pub fn validate_recipe_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Recipe name must not be empty");
    }
    Ok(name.to_string())
}

pub fn validate_ingredient_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Ingredient name must not be empty");
    }
    Ok(name.to_string())
}

/// `Some(true)` when every ingredient has been added, `None` for an empty list.
#[must_use]
pub fn all_added(ingredients: &[Ingredient]) -> Option<bool> {
    if ingredients.is_empty() {
        None
    } else {
        Some(ingredients.iter().all(|i| i.added))
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Merge a batch of incoming ingredients into an existing list.
///
/// An incoming name that matches an existing one (case-insensitively) adds
/// to that entry's quantity; anything else is appended with a fresh id and
/// `added = false`. The batch is applied in order, so duplicates within it
/// collapse as well. Any invalid item fails the whole batch and `existing`
/// is left untouched.
pub fn merge_ingredients(
    existing: &[Ingredient],
    incoming: &[NewIngredient],
) -> Result<Vec<Ingredient>> {
    let mut merged = existing.to_vec();
    for item in incoming {
        let name = validate_ingredient_name(&item.name)?;
        let unit = match item.unit.as_deref().map(str::trim) {
            None | Some("") => String::new(),
            Some(unit) => validate_unit(unit)?,
        };

        if let Some(found) = merged.iter_mut().find(|i| same_name(&i.name, &name)) {
            found.quantity = found.quantity.checked_add(item.quantity).ok_or_else(|| {
                anyhow!("Quantity of '{}' would exceed {}", found.name, u32::MAX)
            })?;
        } else {
            merged.push(Ingredient {
                id: Uuid::new_v4().to_string(),
                name,
                quantity: item.quantity,
                unit,
                added: false,
            });
        }
    }
    Ok(merged)
}
