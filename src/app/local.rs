use crate::{
    contacts::{self, normalize_number, Contact, ContactCreate, ContactManager, ContactUpdate, SearchQuery, Sheet},
    semantic::{SemanticSearchError, SemanticSearchService},
};

use anyhow::anyhow;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{backend::*, errors::AppError};

pub struct AppLocal {
    pub primary: Arc<dyn ContactManager>,
    pub repeating: Arc<dyn ContactManager>,
    semantic: Arc<SemanticSearchService>,

    /// Held from a primary number check to the write that depends on it
    /// (add, update, search_update), so a number lands in primary only once.
    number_lock: Mutex<()>,
}

impl AppLocal {
    pub fn new(
        primary_path: &str,
        repeating_path: &str,
        semantic: Arc<SemanticSearchService>,
    ) -> anyhow::Result<Self> {
        let primary = Arc::new(contacts::BackendCsv::load(primary_path)?);
        let repeating = Arc::new(contacts::BackendCsv::load(repeating_path)?);

        Ok(Self::new_with(primary, repeating, semantic))
    }

    pub fn new_with(
        primary: Arc<dyn ContactManager>,
        repeating: Arc<dyn ContactManager>,
        semantic: Arc<SemanticSearchService>,
    ) -> Self {
        Self {
            primary,
            repeating,
            semantic,
            number_lock: Mutex::new(()),
        }
    }

    pub fn sheet(&self, sheet: Sheet) -> &Arc<dyn ContactManager> {
        match sheet {
            Sheet::Primary => &self.primary,
            Sheet::Repeating => &self.repeating,
        }
    }

    pub fn semantic_enabled(&self) -> bool {
        self.semantic.is_enabled()
    }

    /// Keep the vector index in step with a table change. The tables are the
    /// source of truth, so index failures are only logged; `reindex` repairs them.
    fn sync_vector(&self, sheet: Sheet, contact: &Contact) {
        if !self.semantic.is_enabled() {
            return;
        }
        if let Err(err) = self.semantic.index_contact(sheet, contact) {
            log::warn!("failed to index {sheet} contact {}: {err}", contact.id);
        }
    }

    fn drop_vector(&self, sheet: Sheet, id: u64) {
        if !self.semantic.is_enabled() {
            return;
        }
        if let Err(err) = self.semantic.remove_contact(sheet, id) {
            log::warn!("failed to remove {sheet} contact {id} from index: {err}");
        }
    }

    fn lock_numbers(&self) -> Result<MutexGuard<'_, ()>, AppError> {
        Ok(self
            .number_lock
            .lock()
            .map_err(|_| anyhow!("number lock poisoned"))?)
    }

    /// Fail with `AlreadyExists` if `number` belongs to a primary contact other than `id`.
    fn ensure_number_free(&self, number: &str, id: u64) -> Result<(), AppError> {
        let wanted = normalize_number(number);
        if let Some(other) = self
            .primary
            .search(SearchQuery::default())?
            .into_iter()
            .find(|c| c.id != id && normalize_number(&c.number) == wanted)
        {
            return Err(AppError::AlreadyExists(other.id));
        }
        Ok(())
    }

    fn clean_query(query: SearchQuery) -> SearchQuery {
        let mut query = query;
        let blank = |value: &Option<String>| value.as_deref().map(str::trim) == Some("");

        if blank(&query.name) {
            query.name = None;
        }
        if blank(&query.number) {
            query.number = None;
        }
        if blank(&query.keyword) {
            query.keyword = None;
        }

        query
    }

    fn validate_update(contact_update: &ContactUpdate) -> Result<(), AppError> {
        if contact_update.name.as_deref().map(str::trim) == Some("") {
            return Err(AppError::InvalidInput("Name cannot be empty.".to_string()));
        }
        if let Some(number) = &contact_update.number {
            if normalize_number(number).is_empty() {
                return Err(AppError::InvalidInput("Number cannot be empty.".to_string()));
            }
        }
        Ok(())
    }
}

impl AppBackend for AppLocal {
    fn add(&self, contact_create: ContactCreate) -> Result<AddOutcome, AppError> {
        if contact_create.name.trim().is_empty() || normalize_number(&contact_create.number).is_empty() {
            return Err(AppError::InvalidInput(
                "Please enter both name and number.".to_string(),
            ));
        }

        let guard = self.lock_numbers()?;

        let sheet = match self.primary.find_by_number(&contact_create.number)? {
            Some(existing) => {
                log::info!(
                    "number {} already belongs to contact {}, adding to repeating sheet",
                    contact_create.number,
                    existing.id
                );
                Sheet::Repeating
            }
            None => Sheet::Primary,
        };

        let contact = self.sheet(sheet).create(contact_create)?;
        drop(guard);

        self.sync_vector(sheet, &contact);

        Ok(AddOutcome { contact, sheet })
    }

    fn get(&self, sheet: Sheet, id: u64) -> Result<Contact, AppError> {
        self.sheet(sheet)
            .search(SearchQuery {
                id: Some(id),
                ..Default::default()
            })?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)
    }

    fn find_by_number(&self, number: &str) -> Result<Option<Contact>, AppError> {
        Ok(self.primary.find_by_number(number)?)
    }

    fn update(&self, id: u64, contact_update: ContactUpdate) -> Result<Contact, AppError> {
        Self::validate_update(&contact_update)?;

        let guard = self.lock_numbers()?;

        if let Some(number) = &contact_update.number {
            self.ensure_number_free(number, id)?;
        }

        let contact = self
            .primary
            .update(id, contact_update)?
            .ok_or(AppError::NotFound)?;
        drop(guard);

        self.sync_vector(Sheet::Primary, &contact);

        Ok(contact)
    }

    fn delete(&self, sheet: Sheet, id: u64) -> Result<(), AppError> {
        self.sheet(sheet).delete(id)?.ok_or(AppError::NotFound)?;

        self.drop_vector(sheet, id);

        Ok(())
    }

    fn search(&self, sheet: Sheet, query: SearchQuery) -> Result<Vec<Contact>, AppError> {
        Ok(self.sheet(sheet).search(Self::clean_query(query))?)
    }

    fn list_sorted(&self, sheet: Sheet) -> Result<Vec<Contact>, AppError> {
        let mut contacts = self.sheet(sheet).search(SearchQuery::default())?;
        contacts.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        Ok(contacts)
    }

    fn search_update(
        &self,
        sheet: Sheet,
        query: SearchQuery,
        contact_update: ContactUpdate,
    ) -> Result<usize, AppError> {
        Self::validate_update(&contact_update)?;

        let query = Self::clean_query(query);

        // repeating rows never take part in duplicate routing
        let guard = match sheet {
            Sheet::Primary => Some(self.lock_numbers()?),
            Sheet::Repeating => None,
        };

        let matched = self.sheet(sheet).search(query.clone())?;

        if let Some(number) = &contact_update.number {
            if matched.len() > 1 {
                return Err(AppError::InvalidInput(format!(
                    "refusing to give {} contacts the same number",
                    matched.len()
                )));
            }
            if let (Sheet::Primary, Some(contact)) = (sheet, matched.first()) {
                self.ensure_number_free(number, contact.id)?;
            }
        }

        let count = self.sheet(sheet).search_update(query, contact_update)?;
        drop(guard);

        for contact in matched {
            if let Ok(updated) = self.get(sheet, contact.id) {
                self.sync_vector(sheet, &updated);
            }
        }

        Ok(count)
    }

    fn search_delete(&self, sheet: Sheet, query: SearchQuery) -> Result<usize, AppError> {
        let query = Self::clean_query(query);
        let matched = self.sheet(sheet).search(query.clone())?;

        let count = self.sheet(sheet).search_delete(query)?;

        for contact in matched {
            self.drop_vector(sheet, contact.id);
        }

        Ok(count)
    }

    fn total(&self, sheet: Sheet) -> Result<usize, AppError> {
        Ok(self.sheet(sheet).total()?)
    }

    fn export(&self, sheet: Sheet, dest: &str) -> Result<usize, AppError> {
        if dest == self.sheet(sheet).path() {
            return Err(AppError::InvalidInput(
                "refusing to export a sheet onto itself".to_string(),
            ));
        }
        Ok(self.sheet(sheet).export(dest)?)
    }

    fn semantic_search(
        &self,
        text: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<ScoredContact>, AppError> {
        let matches = self.semantic.search(text, threshold, limit)?;

        let results = matches
            .into_iter()
            .filter_map(|m| match self.get(m.sheet, m.id) {
                Ok(contact) => Some(ScoredContact {
                    contact,
                    sheet: m.sheet,
                    score: m.score,
                }),
                Err(_) => {
                    log::debug!("index points at missing {} contact {}", m.sheet, m.id);
                    None
                }
            })
            .collect();

        Ok(results)
    }

    fn reindex(&self, show_progress: bool) -> Result<usize, AppError> {
        if !self.semantic.is_enabled() {
            return Err(SemanticSearchError::Disabled.into());
        }

        let mut all = vec![];
        for sheet in [Sheet::Primary, Sheet::Repeating] {
            all.extend(
                self.sheet(sheet)
                    .search(SearchQuery::default())?
                    .into_iter()
                    .map(|c| (sheet, c)),
            );
        }

        let progress = if show_progress {
            let bar = ProgressBar::new(all.len() as u64);
            if let Ok(style) =
                ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} contacts")
            {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let count = self.semantic.index_contacts(&all, &progress)?;
        progress.finish_and_clear();

        log::info!("indexed {count} contacts");

        Ok(count)
    }
}
