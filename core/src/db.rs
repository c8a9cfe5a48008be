use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::models::Recipe;
use crate::store::{DeleteResult, RecipeStore, ReplaceResult};

pub const DEFAULT_COLLECTION: &str = "Recipes";

const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed document store. Each recipe is one JSON document in a
/// single collection table keyed by its id.
pub struct Database {
    conn: Connection,
    collection: String,
}

impl Database {
    pub fn open(path: &Path, collection: &str) -> Result<Self> {
        validate_collection_name(collection)?;
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database {
            conn,
            collection: collection.to_string(),
        };
        db.migrate()?;
        debug!(path = %path.display(), collection, "opened recipe collection");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(DEFAULT_COLLECTION)
    }

    pub fn open_in_memory_with(collection: &str) -> Result<Self> {
        validate_collection_name(collection)?;
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn,
            collection: collection.to_string(),
        };
        db.migrate()?;
        Ok(db)
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version > SCHEMA_VERSION {
            bail!(
                "Database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            );
        }

        // Collections are created lazily, so several can share one file.
        let table = &self.collection;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );"
        ))?;

        if version < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn recipe_from_document(id: &str, document: &str) -> Result<Recipe> {
        serde_json::from_str(document)
            .with_context(|| format!("Stored document for recipe {id} is corrupt"))
    }
}

impl RecipeStore for Database {
    fn find_all(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, document FROM \"{}\" ORDER BY rowid",
            self.collection
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|(id, document)| Self::recipe_from_document(id, document))
            .collect()
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Recipe>> {
        let document: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT document FROM \"{}\" WHERE id = ?1",
                    self.collection
                ),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        document
            .map(|document| Self::recipe_from_document(id, &document))
            .transpose()
    }

    fn insert(&self, recipe: &Recipe) -> Result<Recipe> {
        let mut stored = recipe.clone();
        if stored.id.is_empty() {
            stored.id = Uuid::new_v4().to_string();
        }
        let document = serde_json::to_string(&stored)?;
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                &format!(
                    "INSERT INTO \"{}\" (id, document, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                    self.collection
                ),
                params![stored.id, document, now],
            )
            .with_context(|| format!("Failed to insert recipe {}", stored.id))?;
        Ok(stored)
    }

    fn replace(&self, id: &str, recipe: &Recipe) -> Result<ReplaceResult> {
        if recipe.id != id {
            bail!("Cannot replace recipe {id} with a document whose id is '{}'", recipe.id);
        }
        let document = serde_json::to_string(recipe)?;
        let now = Local::now().to_rfc3339();
        let rows = self
            .conn
            .execute(
                &format!(
                    "UPDATE \"{}\" SET document = ?1, updated_at = ?2 WHERE id = ?3",
                    self.collection
                ),
                params![document, now, id],
            )
            .with_context(|| format!("Failed to replace recipe {id}"))?;
        Ok(ReplaceResult {
            acknowledged: true,
            modified_count: rows as u64,
        })
    }

    fn delete(&self, id: &str) -> Result<DeleteResult> {
        let rows = self
            .conn
            .execute(
                &format!("DELETE FROM \"{}\" WHERE id = ?1", self.collection),
                params![id],
            )
            .with_context(|| format!("Failed to delete recipe {id}"))?;
        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: rows as u64,
        })
    }
}

/// Collection names end up in SQL as table names, so only plain identifiers
/// are accepted.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("Invalid collection name '{name}'. Use letters, digits and underscores only");
    }
    Ok(())
}
