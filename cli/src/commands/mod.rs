mod helpers;
mod recipe;

use std::process;

use anyhow::Result;

use cookbook_core::error::CookbookError;

use helpers::json_error;

pub(crate) use recipe::{
    cmd_recipe_add_ingredient, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_list,
    cmd_recipe_mark, cmd_recipe_rename, cmd_recipe_show, cmd_units,
};

/// Unwrap a service result, exiting with status 2 when the recipe or
/// ingredient does not exist. Every other failure is returned to `main`.
pub(super) fn or_exit_not_found<T>(result: Result<T, CookbookError>, json: bool) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(CookbookError::NotFound(message)) => {
            if json {
                println!("{}", json_error(&message));
            } else {
                eprintln!("{message}");
            }
            process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
