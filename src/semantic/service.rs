//! Semantic search service for contact lookup.
//!
//! - Lazily builds the API clients on first use
//! - Keeps the vector index in step with the contact tables
//! - Resolves index matches back to (sheet, id) pairs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::ProgressBar;

use crate::config::SemanticSearchConfig;
use crate::contacts::{Contact, Sheet};
use crate::semantic::embeddings::{EmbeddingError, Embedder, HttpEmbedder};
use crate::semantic::index::{HttpVectorIndex, IndexError, VectorIndexClient, VectorMetadata, VectorRecord};
use crate::semantic::preprocess::{contact_document, parse_vector_id, vector_id};
use crate::semantic::EMBED_BATCH_SIZE;

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Semantic search is disabled")]
    Disabled,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Internal error: {0}")]
    Internal(String),
}

struct SemanticState {
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndexClient>,
}

/// A contact reference returned by the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub sheet: Sheet,
    pub id: u64,
    pub score: f32,
}

pub struct SemanticSearchService {
    config: SemanticSearchConfig,
    /// Lazily-initialized clients. The lock is only held while initializing,
    /// never across a network call.
    state: Mutex<Option<Arc<SemanticState>>>,
}

impl SemanticSearchService {
    /// The clients are created on first use, so a disabled or misconfigured
    /// service costs nothing until somebody asks for it.
    pub fn new(config: SemanticSearchConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    /// Build a ready service around existing clients.
    pub fn with_clients(
        config: SemanticSearchConfig,
        embedder: Box<dyn Embedder>,
        index: Box<dyn VectorIndexClient>,
    ) -> Self {
        Self {
            config,
            state: Mutex::new(Some(Arc::new(SemanticState { embedder, index }))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Embed and upsert a single contact.
    pub fn index_contact(&self, sheet: Sheet, contact: &Contact) -> Result<(), SemanticSearchError> {
        self.index_contacts(&[(sheet, contact.clone())], &ProgressBar::hidden())
            .map(|_| ())
    }

    /// Embed and upsert contacts in batches. Contacts without any text are skipped.
    pub fn index_contacts(
        &self,
        contacts: &[(Sheet, Contact)],
        progress: &ProgressBar,
    ) -> Result<usize, SemanticSearchError> {
        let state = self.state()?;

        let documents = contacts
            .iter()
            .filter_map(|(sheet, contact)| {
                contact_document(&contact.name, &contact.number)
                    .map(|doc| (*sheet, contact, doc))
            })
            .collect::<Vec<_>>();

        let mut upserted = 0;
        for batch in documents.chunks(EMBED_BATCH_SIZE) {
            let texts = batch
                .iter()
                .map(|(_, _, doc)| doc.clone())
                .collect::<Vec<_>>();
            let embeddings = state.embedder.embed_batch(&texts)?;

            let records = batch
                .iter()
                .zip(embeddings)
                .map(|((sheet, contact, _), values)| VectorRecord {
                    id: vector_id(*sheet, contact.id),
                    values,
                    metadata: VectorMetadata {
                        name: contact.name.clone(),
                        number: contact.number.clone(),
                        sheet: sheet.to_string(),
                    },
                })
                .collect::<Vec<_>>();

            state.index.upsert(&records)?;
            upserted += records.len();
            progress.inc(batch.len() as u64);
        }

        Ok(upserted)
    }

    pub fn remove_contact(&self, sheet: Sheet, id: u64) -> Result<(), SemanticSearchError> {
        let state = self.state()?;
        state.index.delete(&[vector_id(sheet, id)])?;
        Ok(())
    }

    /// Returns matches sorted by score (highest first).
    pub fn search(
        &self,
        text: &str,
        threshold: Option<f32>,
        limit: Option<usize>,
    ) -> Result<Vec<SemanticMatch>, SemanticSearchError> {
        let state = self.state()?;

        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }

        let threshold = threshold.unwrap_or(self.config.default_threshold);
        let top_k = limit.unwrap_or(self.config.top_k).max(1);

        let vector = state.embedder.embed(text)?;
        let matches = state.index.query(&vector, top_k)?;

        let mut results = matches
            .into_iter()
            .filter(|m| m.score >= threshold)
            .filter_map(|m| match parse_vector_id(&m.id) {
                Some((sheet, id)) => Some(SemanticMatch {
                    sheet,
                    id,
                    score: m.score,
                }),
                None => {
                    log::debug!("ignoring foreign vector id {:?}", m.id);
                    None
                }
            })
            .collect::<Vec<_>>();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        Ok(results)
    }

    fn state(&self) -> Result<Arc<SemanticState>, SemanticSearchError> {
        if !self.config.enabled {
            return Err(SemanticSearchError::Disabled);
        }

        let mut guard = self
            .state
            .lock()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;

        if let Some(state) = guard.as_ref() {
            return Ok(state.clone());
        }

        let state = Arc::new(self.do_init()?);
        *guard = Some(state.clone());
        Ok(state)
    }

    fn do_init(&self) -> Result<SemanticState, SemanticSearchError> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        let embedder = HttpEmbedder::new(
            &self.config.embedding_url,
            &self.config.embedding_model,
            read_key(&self.config.embedding_api_key_env),
            timeout,
        )?;

        let index = HttpVectorIndex::new(
            &self.config.index_url,
            &self.config.index_namespace,
            read_key(&self.config.index_api_key_env),
            timeout,
        )?;

        log::info!(
            "semantic search ready, model '{}' against {}",
            embedder.model(),
            self.config.index_url
        );

        Ok(SemanticState {
            embedder: Box::new(embedder),
            index: Box::new(index),
        })
    }
}

fn read_key(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Some(key.trim().to_string()),
        _ => {
            log::warn!("{var} is not set, sending requests without credentials");
            None
        }
    }
}
