mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_recipe_add_ingredient, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_list,
    cmd_recipe_mark, cmd_recipe_rename, cmd_recipe_show, cmd_units,
};
use crate::config::Config;
use cookbook_core::service::CookbookService;

#[derive(Parser)]
#[command(
    name = "cookbook",
    version,
    about = "A recipe and shopping-checklist API",
    long_about = "Serve and manage a cookbook of recipes. Each recipe holds a list of \
ingredients; a recipe is done once every ingredient has been added."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7071")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// List the accepted units of measure
    Units {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe and its ingredients
    Show {
        /// Recipe ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new, empty recipe
    Create {
        /// Recipe name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a recipe
    Rename {
        /// Recipe ID
        id: String,
        /// New recipe name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient, merging with an existing one of the same name
    AddIngredient {
        /// Recipe ID
        id: String,
        /// Ingredient name
        name: String,
        /// Quantity to add
        quantity: u32,
        /// Unit: g, kg, ml, dl, teaspoon, tablespoon, container, ea
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an ingredient as added to the recipe
    Mark {
        /// Recipe ID
        id: String,
        /// Ingredient ID
        ingredient_id: String,
        /// Mark the ingredient as not added instead
        #[arg(long)]
        undo: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(&cli))),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// The server logs every request; one-shot commands stay quiet unless
/// `RUST_LOG` asks otherwise.
fn default_filter(cli: &Cli) -> &'static str {
    match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Units { json } = cli.command {
        return cmd_units(json);
    }

    let config = Config::load()?;
    let service = CookbookService::open(&config.db_path, &config.collection)?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _) = config.load_or_create_api_key()?;
                Some(key)
            };
            server::start_server(service, port, &bind, &config.route_prefix, api_key).await
        }
        Commands::Recipe { command } => match command {
            RecipeCommands::List { json } => cmd_recipe_list(&service, json),
            RecipeCommands::Show { id, json } => cmd_recipe_show(&service, &id, json),
            RecipeCommands::Create { name, json } => cmd_recipe_create(&service, &name, json),
            RecipeCommands::Rename { id, name, json } => {
                cmd_recipe_rename(&service, &id, &name, json)
            }
            RecipeCommands::Delete { id, json } => cmd_recipe_delete(&service, &id, json),
            RecipeCommands::AddIngredient {
                id,
                name,
                quantity,
                unit,
                json,
            } => cmd_recipe_add_ingredient(&service, &id, &name, quantity, unit, json),
            RecipeCommands::Mark {
                id,
                ingredient_id,
                undo,
                json,
            } => cmd_recipe_mark(&service, &id, &ingredient_id, undo, json),
        },
        Commands::Units { json } => cmd_units(json),
    }
}
