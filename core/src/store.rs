use anyhow::Result;

use crate::models::Recipe;

/// Outcome of a whole-document replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceResult {
    pub acknowledged: bool,
    pub modified_count: u64,
}

impl ReplaceResult {
    /// True when the store confirmed the write and it touched a document.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.acknowledged && self.modified_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

impl DeleteResult {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.acknowledged && self.deleted_count > 0
    }
}

/// Gateway to the recipe collection.
///
/// Every mutation replaces a whole document; there are no partial updates
/// and no transactions spanning more than one call.
pub trait RecipeStore: Send {
    /// All documents, in no particular order.
    fn find_all(&self) -> Result<Vec<Recipe>>;
    fn find_by_id(&self, id: &str) -> Result<Option<Recipe>>;
    /// Store a new document. An empty id is replaced with a generated one;
    /// the stored document is returned.
    fn insert(&self, recipe: &Recipe) -> Result<Recipe>;
    fn replace(&self, id: &str, recipe: &Recipe) -> Result<ReplaceResult>;
    fn delete(&self, id: &str) -> Result<DeleteResult>;
}
