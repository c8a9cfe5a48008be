use anyhow::Result;
use std::process;

use cookbook_core::models::{IngredientUpdate, NewIngredient, NewRecipe, UNITS_OF_MEASURE};
use cookbook_core::service::CookbookService;

use super::helpers::{format_quantity, print_ingredient_table, print_recipe_table};
use super::or_exit_not_found;

pub(crate) fn cmd_recipe_list(service: &CookbookService, json: bool) -> Result<()> {
    let recipes = service.list_recipes()?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else {
        print_recipe_table(&recipes);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(service: &CookbookService, id: &str, json: bool) -> Result<()> {
    let recipe = or_exit_not_found(service.get_recipe(id), json)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    let name = &recipe.name;
    let status = if recipe.done { "done" } else { "in progress" };
    println!("=== {name} ===");
    println!("  ID: {}  |  Status: {status}\n", recipe.id);

    if recipe.ingredients.is_empty() {
        println!("  No ingredients yet");
        println!("Add some with: cookbook recipe add-ingredient {} <name> <quantity> <unit>", recipe.id);
    } else {
        print_ingredient_table(&recipe);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_create(service: &CookbookService, name: &str, json: bool) -> Result<()> {
    let recipe = service.create_recipe(&NewRecipe {
        name: name.to_string(),
    })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = &recipe.id;
        println!("Created recipe: {} (id: {id})", recipe.name);
        println!("Add ingredients with: cookbook recipe add-ingredient {id} <name> <quantity> <unit>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_rename(
    service: &CookbookService,
    id: &str,
    name: &str,
    json: bool,
) -> Result<()> {
    let recipe = or_exit_not_found(
        service.update_recipe(
            id,
            &NewRecipe {
                name: name.to_string(),
            },
        ),
        json,
    )?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!("Renamed recipe {id} to {}", recipe.name);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(service: &CookbookService, id: &str, json: bool) -> Result<()> {
    or_exit_not_found(service.delete_recipe(id), json)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted recipe {id}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_add_ingredient(
    service: &CookbookService,
    id: &str,
    name: &str,
    quantity: u32,
    unit: Option<String>,
    json: bool,
) -> Result<()> {
    let item = NewIngredient {
        name: name.to_string(),
        quantity,
        unit,
    };
    let recipe = or_exit_not_found(service.add_ingredients(id, std::slice::from_ref(&item)), json)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else if let Some(ingredient) = recipe
        .ingredients
        .iter()
        .find(|i| i.name.to_lowercase() == name.trim().to_lowercase())
    {
        let total = format_quantity(ingredient.quantity, &ingredient.unit);
        println!(
            "Added {quantity} of {} to {} (now {total})",
            ingredient.name, recipe.name
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_mark(
    service: &CookbookService,
    id: &str,
    ingredient_id: &str,
    undo: bool,
    json: bool,
) -> Result<()> {
    let recipe = or_exit_not_found(
        service.edit_ingredient(id, ingredient_id, IngredientUpdate { added: !undo }),
        json,
    )?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let state = if undo { "not added" } else { "added" };
        println!("Marked ingredient {ingredient_id} as {state}");
        if recipe.done {
            println!("All ingredients added: {} is done", recipe.name);
        }
    }
    Ok(())
}

pub(crate) fn cmd_units(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(UNITS_OF_MEASURE)?);
    } else {
        for unit in UNITS_OF_MEASURE {
            println!("{unit}");
        }
    }
    Ok(())
}
