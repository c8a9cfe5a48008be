use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::CookbookError;
use crate::models::{
    IngredientUpdate, NewIngredient, NewRecipe, Recipe, merge_ingredients, validate_recipe_name,
};
use crate::store::RecipeStore;

/// Request-handling core shared by the HTTP server and the CLI.
///
/// Each operation is an independent read-modify-write against the store.
/// Nothing is locked across calls, so two concurrent writers to the same
/// recipe can race and the later replace wins.
pub struct CookbookService {
    store: Box<dyn RecipeStore>,
}

impl CookbookService {
    pub fn new(store: impl RecipeStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    pub fn open(db_path: &Path, collection: &str) -> Result<Self> {
        let db = Database::open(db_path, collection)?;
        Ok(Self::new(db))
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::new(db))
    }

    // --- Recipes ---

    pub fn list_recipes(&self) -> Result<Vec<Recipe>, CookbookError> {
        info!("Fetching all recipes");
        Ok(self.store.find_all()?)
    }

    pub fn get_recipe(&self, id: &str) -> Result<Recipe, CookbookError> {
        info!(recipe_id = id, "Fetching specific recipe");
        self.find(id)
    }

    pub fn create_recipe(&self, req: &NewRecipe) -> Result<Recipe, CookbookError> {
        info!("Creating recipe");
        let name = validate_recipe_name(&req.name).map_err(validation)?;
        let recipe = self.store.insert(&Recipe::new(name))?;
        Ok(recipe)
    }

    pub fn update_recipe(&self, id: &str, req: &NewRecipe) -> Result<Recipe, CookbookError> {
        self.update_recipe_with(id, || Ok(req.clone()))
    }

    /// Rename a recipe, producing the payload only once the recipe is known
    /// to exist. An error from `payload` is returned unchanged.
    pub fn update_recipe_with(
        &self,
        id: &str,
        payload: impl FnOnce() -> Result<NewRecipe, CookbookError>,
    ) -> Result<Recipe, CookbookError> {
        info!(recipe_id = id, "Updating recipe");
        let mut recipe = self.find(id)?;
        let req = payload()?;
        recipe.name = validate_recipe_name(&req.name).map_err(validation)?;
        self.write(&recipe)?;
        Ok(recipe)
    }

    pub fn delete_recipe(&self, id: &str) -> Result<(), CookbookError> {
        info!(recipe_id = id, "Deleting recipe");
        if self.store.delete(id)?.is_applied() {
            Ok(())
        } else {
            warn!(recipe_id = id, "recipe not found");
            Err(CookbookError::not_found(format!("Recipe {id} not found")))
        }
    }

    // --- Ingredients ---

    /// Merge a batch of ingredients into a recipe and reset its `done` flag.
    ///
    /// An invalid item rejects the whole batch before anything is written.
    pub fn add_ingredients(
        &self,
        id: &str,
        items: &[NewIngredient],
    ) -> Result<Recipe, CookbookError> {
        self.add_ingredients_with(id, || Ok(items.to_vec()))
    }

    pub fn add_ingredients_with(
        &self,
        id: &str,
        payload: impl FnOnce() -> Result<Vec<NewIngredient>, CookbookError>,
    ) -> Result<Recipe, CookbookError> {
        info!(recipe_id = id, "Adding ingredients");
        let mut recipe = self.find(id)?;
        let items = payload()?;
        debug!(recipe_id = id, count = items.len(), "merging ingredient batch");
        recipe.ingredients = merge_ingredients(&recipe.ingredients, &items).map_err(validation)?;
        recipe.done = false;
        self.write(&recipe)?;
        Ok(recipe)
    }

    /// Set an ingredient's `added` flag and re-derive the recipe's `done`.
    pub fn edit_ingredient(
        &self,
        recipe_id: &str,
        ingredient_id: &str,
        update: IngredientUpdate,
    ) -> Result<Recipe, CookbookError> {
        self.edit_ingredient_with(recipe_id, ingredient_id, || Ok(update))
    }

    /// Both the recipe and the ingredient are looked up before `payload`
    /// runs, so a missing target wins over a bad payload.
    pub fn edit_ingredient_with(
        &self,
        recipe_id: &str,
        ingredient_id: &str,
        payload: impl FnOnce() -> Result<IngredientUpdate, CookbookError>,
    ) -> Result<Recipe, CookbookError> {
        info!(recipe_id, ingredient_id, "Editing ingredient");
        let mut recipe = self.find(recipe_id)?;
        let Some(ingredient) = recipe.ingredient_mut(ingredient_id) else {
            warn!(recipe_id, ingredient_id, "ingredient not found");
            return Err(CookbookError::not_found(format!(
                "Ingredient {ingredient_id} not found in recipe {recipe_id}"
            )));
        };
        ingredient.added = payload()?.added;
        recipe.refresh_done();
        self.write(&recipe)?;
        Ok(recipe)
    }

    // --- Store helpers ---

    fn find(&self, id: &str) -> Result<Recipe, CookbookError> {
        self.store.find_by_id(id)?.ok_or_else(|| {
            warn!(recipe_id = id, "recipe not found");
            CookbookError::not_found(format!("Recipe {id} not found"))
        })
    }

    fn write(&self, recipe: &Recipe) -> Result<(), CookbookError> {
        let res = self.store.replace(&recipe.id, recipe)?;
        if res.is_applied() {
            Ok(())
        } else {
            warn!(
                recipe_id = %recipe.id,
                acknowledged = res.acknowledged,
                modified = res.modified_count,
                "replace did not modify the recipe"
            );
            Err(CookbookError::write_failed(format!(
                "Recipe {} was not updated",
                recipe.id
            )))
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn validation(err: anyhow::Error) -> CookbookError {
    CookbookError::validation(format!("{err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ingredient;
    use crate::store::{DeleteResult, ReplaceResult};

    fn new_recipe(name: &str) -> NewRecipe {
        NewRecipe {
            name: name.to_string(),
        }
    }

    fn item(name: &str, quantity: u32, unit: &str) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            quantity,
            unit: Some(unit.to_string()),
        }
    }

    /// Delegates reads to a real store but never acknowledges writes.
    struct UnacknowledgedStore(Database);

    impl RecipeStore for UnacknowledgedStore {
        fn find_all(&self) -> Result<Vec<Recipe>> {
            self.0.find_all()
        }
        fn find_by_id(&self, id: &str) -> Result<Option<Recipe>> {
            self.0.find_by_id(id)
        }
        fn insert(&self, recipe: &Recipe) -> Result<Recipe> {
            self.0.insert(recipe)
        }
        fn replace(&self, _id: &str, _recipe: &Recipe) -> Result<ReplaceResult> {
            Ok(ReplaceResult {
                acknowledged: false,
                modified_count: 0,
            })
        }
        fn delete(&self, _id: &str) -> Result<DeleteResult> {
            Ok(DeleteResult {
                acknowledged: false,
                deleted_count: 0,
            })
        }
    }

    /// Every call fails, as if the database were unreachable.
    struct OfflineStore;

    impl RecipeStore for OfflineStore {
        fn find_all(&self) -> Result<Vec<Recipe>> {
            anyhow::bail!("connection refused")
        }
        fn find_by_id(&self, _id: &str) -> Result<Option<Recipe>> {
            anyhow::bail!("connection refused")
        }
        fn insert(&self, _recipe: &Recipe) -> Result<Recipe> {
            anyhow::bail!("connection refused")
        }
        fn replace(&self, _id: &str, _recipe: &Recipe) -> Result<ReplaceResult> {
            anyhow::bail!("connection refused")
        }
        fn delete(&self, _id: &str) -> Result<DeleteResult> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_create_recipe() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Soup")).unwrap();
        assert_eq!(recipe.name, "Soup");
        assert!(recipe.ingredients.is_empty());
        assert!(!recipe.done);
        assert!(!recipe.id.is_empty());

        let other = svc.create_recipe(&new_recipe("Soup")).unwrap();
        assert_ne!(recipe.id, other.id);
    }

    #[test]
    fn test_create_recipe_blank_name() {
        let svc = CookbookService::new_in_memory().unwrap();
        let err = svc.create_recipe(&new_recipe("  ")).unwrap_err();
        assert!(matches!(err, CookbookError::Validation(_)));
    }

    #[test]
    fn test_get_recipe() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Soup")).unwrap();
        assert_eq!(svc.get_recipe(&recipe.id).unwrap(), recipe);

        let err = svc.get_recipe("nope").unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(_)));
    }

    #[test]
    fn test_list_recipes() {
        let svc = CookbookService::new_in_memory().unwrap();
        assert!(svc.list_recipes().unwrap().is_empty());
        svc.create_recipe(&new_recipe("A")).unwrap();
        svc.create_recipe(&new_recipe("B")).unwrap();
        assert_eq!(svc.list_recipes().unwrap().len(), 2);
    }

    #[test]
    fn test_update_recipe_name_only() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Soup")).unwrap();
        svc.add_ingredients(&recipe.id, &[item("Salt", 5, "g")])
            .unwrap();

        let updated = svc
            .update_recipe(&recipe.id, &new_recipe("Tomato Soup"))
            .unwrap();
        assert_eq!(updated.name, "Tomato Soup");
        assert_eq!(updated.ingredients.len(), 1);
        assert_eq!(svc.get_recipe(&recipe.id).unwrap().name, "Tomato Soup");
    }

    #[test]
    fn test_update_recipe_same_name_succeeds() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Soup")).unwrap();
        assert!(svc.update_recipe(&recipe.id, &new_recipe("Soup")).is_ok());
    }

    #[test]
    fn test_update_missing_recipe_is_not_found_before_validation() {
        let svc = CookbookService::new_in_memory().unwrap();
        let err = svc.update_recipe("nope", &new_recipe("")).unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(_)));
    }

    #[test]
    fn test_delete_recipe() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Soup")).unwrap();
        svc.delete_recipe(&recipe.id).unwrap();
        assert!(matches!(
            svc.get_recipe(&recipe.id).unwrap_err(),
            CookbookError::NotFound(_)
        ));
        assert!(matches!(
            svc.delete_recipe(&recipe.id).unwrap_err(),
            CookbookError::NotFound(_)
        ));
    }

    #[test]
    fn test_add_ingredients_merges_and_resets_done() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Bread")).unwrap();

        let recipe = svc
            .add_ingredients(&recipe.id, &[item("Flour", 200, "g")])
            .unwrap();
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.ingredients[0].quantity, 200);

        let flour_id = recipe.ingredients[0].id.clone();
        let recipe = svc
            .edit_ingredient(&recipe.id, &flour_id, IngredientUpdate { added: true })
            .unwrap();
        assert!(recipe.done);

        let recipe = svc
            .add_ingredients(&recipe.id, &[item("flour", 100, "g")])
            .unwrap();
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.ingredients[0].quantity, 300);
        assert!(!recipe.done);

        let stored = svc.get_recipe(&recipe.id).unwrap();
        assert_eq!(stored, recipe);
    }

    #[test]
    fn test_add_ingredients_invalid_unit_leaves_recipe_unchanged() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Bread")).unwrap();
        svc.add_ingredients(&recipe.id, &[item("Flour", 200, "g")])
            .unwrap();

        let err = svc
            .add_ingredients(&recipe.id, &[item("Yeast", 1, "ea"), item("Butter", 1, "lbs")])
            .unwrap_err();
        match err {
            CookbookError::Validation(msg) => assert!(msg.contains("Must be one of")),
            other => panic!("expected validation error, got {other:?}"),
        }

        let stored = svc.get_recipe(&recipe.id).unwrap();
        assert_eq!(stored.ingredients.len(), 1);
        assert_eq!(stored.ingredients[0].quantity, 200);
    }

    #[test]
    fn test_add_ingredients_missing_recipe() {
        let svc = CookbookService::new_in_memory().unwrap();
        let err = svc
            .add_ingredients("nope", &[item("Flour", 1, "g")])
            .unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(_)));
    }

    #[test]
    fn test_add_empty_batch_still_resets_done() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Tea")).unwrap();
        let recipe = svc
            .add_ingredients(&recipe.id, &[item("Leaves", 1, "teaspoon")])
            .unwrap();
        let leaves = recipe.ingredients[0].id.clone();
        svc.edit_ingredient(&recipe.id, &leaves, IngredientUpdate { added: true })
            .unwrap();

        let recipe = svc.add_ingredients(&recipe.id, &[]).unwrap();
        assert!(!recipe.done);
    }

    #[test]
    fn test_edit_ingredient_derives_done() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Salad")).unwrap();
        let recipe = svc
            .add_ingredients(
                &recipe.id,
                &[item("Lettuce", 1, "ea"), item("Oil", 2, "tablespoon")],
            )
            .unwrap();
        let lettuce = recipe.ingredients[0].id.clone();
        let oil = recipe.ingredients[1].id.clone();

        let recipe = svc
            .edit_ingredient(&recipe.id, &lettuce, IngredientUpdate { added: true })
            .unwrap();
        assert!(!recipe.done);

        let recipe = svc
            .edit_ingredient(&recipe.id, &oil, IngredientUpdate { added: true })
            .unwrap();
        assert!(recipe.done);

        let recipe = svc
            .edit_ingredient(&recipe.id, &oil, IngredientUpdate { added: false })
            .unwrap();
        assert!(!recipe.done);
        assert!(recipe.ingredients[0].added);
    }

    #[test]
    fn test_edit_ingredient_not_found() {
        let svc = CookbookService::new_in_memory().unwrap();
        let recipe = svc.create_recipe(&new_recipe("Salad")).unwrap();

        let err = svc
            .edit_ingredient(&recipe.id, "nope", IngredientUpdate { added: true })
            .unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(ref m) if m.contains("Ingredient")));

        let err = svc
            .edit_ingredient("nope", "nope", IngredientUpdate { added: true })
            .unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(ref m) if m.contains("Recipe")));
    }

    #[test]
    fn test_unacknowledged_write_is_write_failure() {
        let db = Database::open_in_memory().unwrap();
        let mut soup = Recipe::new("Broth");
        soup.ingredients.push(Ingredient {
            id: "salt".to_string(),
            name: "Salt".to_string(),
            quantity: 1,
            unit: "g".to_string(),
            added: false,
        });
        let seeded = db.insert(&soup).unwrap().id;
        let salt = "salt".to_string();

        let svc = CookbookService::new(UnacknowledgedStore(db));
        let recipe = svc.create_recipe(&new_recipe("Soup")).unwrap();

        let err = svc
            .update_recipe(&recipe.id, &new_recipe("Stew"))
            .unwrap_err();
        assert!(matches!(err, CookbookError::WriteFailed(_)));

        let err = svc
            .add_ingredients(&recipe.id, &[item("Salt", 1, "g")])
            .unwrap_err();
        assert!(matches!(err, CookbookError::WriteFailed(_)));

        let err = svc
            .edit_ingredient(&seeded, &salt, IngredientUpdate { added: true })
            .unwrap_err();
        assert!(matches!(err, CookbookError::WriteFailed(_)));

        // Unacknowledged delete reads as "nothing deleted"
        let err = svc.delete_recipe(&recipe.id).unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(_)));
    }

    #[test]
    fn test_payload_runs_only_after_lookup() {
        let svc = CookbookService::new_in_memory().unwrap();
        let bad = || -> Result<NewRecipe, CookbookError> {
            Err(CookbookError::validation("Malformed request body"))
        };
        let err = svc.update_recipe_with("nope", bad).unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(_)));

        let err = svc
            .add_ingredients_with("nope", || Err(CookbookError::validation("bad")))
            .unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(_)));

        let recipe = svc.create_recipe(&new_recipe("Salad")).unwrap();
        let err = svc
            .edit_ingredient_with(&recipe.id, "nope", || Err(CookbookError::validation("bad")))
            .unwrap_err();
        assert!(matches!(err, CookbookError::NotFound(ref m) if m.contains("Ingredient")));

        let err = svc.update_recipe_with(&recipe.id, bad).unwrap_err();
        assert!(matches!(err, CookbookError::Validation(_)));
        assert_eq!(svc.get_recipe(&recipe.id).unwrap().name, "Salad");
    }

    #[test]
    fn test_store_failure_surfaces_as_store_error() {
        let svc = CookbookService::new(OfflineStore);
        assert!(matches!(
            svc.list_recipes().unwrap_err(),
            CookbookError::Store(_)
        ));
        assert!(matches!(
            svc.create_recipe(&new_recipe("Soup")).unwrap_err(),
            CookbookError::Store(_)
        ));
        assert!(matches!(
            svc.get_recipe("x").unwrap_err(),
            CookbookError::Store(_)
        ));
    }
}
