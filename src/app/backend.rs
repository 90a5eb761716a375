use serde::{Deserialize, Serialize};

use crate::contacts::{Contact, ContactCreate, ContactUpdate, SearchQuery, Sheet};

use super::errors::AppError;

pub trait AppBackend: Send + Sync {
    /// Add a contact, routing it to the repeating sheet when its number is
    /// already present in the primary one.
    fn add(&self, contact_create: ContactCreate) -> Result<AddOutcome, AppError>;

    fn get(&self, sheet: Sheet, id: u64) -> Result<Contact, AppError>;

    fn find_by_number(&self, number: &str) -> Result<Option<Contact>, AppError>;

    fn update(&self, id: u64, contact_update: ContactUpdate) -> Result<Contact, AppError>;

    fn delete(&self, sheet: Sheet, id: u64) -> Result<(), AppError>;

    fn search(&self, sheet: Sheet, query: SearchQuery) -> Result<Vec<Contact>, AppError>;

    /// Every contact of a sheet ordered by name.
    fn list_sorted(&self, sheet: Sheet) -> Result<Vec<Contact>, AppError>;

    fn search_update(
        &self,
        sheet: Sheet,
        query: SearchQuery,
        contact_update: ContactUpdate,
    ) -> Result<usize, AppError>;

    fn search_delete(&self, sheet: Sheet, query: SearchQuery) -> Result<usize, AppError>;

    fn total(&self, sheet: Sheet) -> Result<usize, AppError>;

    /// Write a CSV copy of a sheet to `dest`, returns the number of rows.
    fn export(&self, sheet: Sheet, dest: &str) -> Result<usize, AppError>;

    fn semantic_search(
        &self,
        text: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredContact>, AppError>;

    /// Push every contact of both sheets to the vector index.
    fn reindex(&self, show_progress: bool) -> Result<usize, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddOutcome {
    pub contact: Contact,
    pub sheet: Sheet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredContact {
    pub contact: Contact,
    pub sheet: Sheet,
    pub score: f32,
}
