// File-backed storage for the evaluation document.
//
// One JSON file holds the live document; a second file holds the canonical
// empty-state template; a third holds the default-values seed loaded once at
// startup. Every write replaces the document in full (no field-level merge)
// and goes through a temp-file-then-rename sequence so a concurrent fetch
// never observes a truncated file.
//
// Concurrent writers are NOT serialized: two overlapping replace calls race
// and the last rename wins. The service is a single-operator tool.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::config::StorageConfig;
use crate::model::{
    Cell, CellMetadata, Criterion, CriterionMetadata, DefaultValuesFixture,
    EvaluationDocument, ModifiedBy, TableData,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read evaluation document at {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to write evaluation document at {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("failed to read template at {path}: {message}")]
    Template { path: PathBuf, message: String },

    #[error("failed to load default-values fixture at {path}: {message}")]
    Fixture { path: PathBuf, message: String },
}

// ---------------------------------------------------------------------------
// EvaluationStore
// ---------------------------------------------------------------------------

/// Durable single-document storage for one evaluation session.
pub struct EvaluationStore {
    data_file: PathBuf,
    template_file: PathBuf,
    defaults: DefaultValuesFixture,
}

impl EvaluationStore {
    /// Open the store described by the storage config. The default-values
    /// fixture is read and validated here so a broken fixture fails startup
    /// instead of the first reset call.
    pub fn open(storage: &StorageConfig) -> Result<Self, StoreError> {
        let fixture_path = PathBuf::from(&storage.default_values_file);
        let text = fs::read_to_string(&fixture_path).map_err(|e| StoreError::Fixture {
            path: fixture_path.clone(),
            message: e.to_string(),
        })?;
        let defaults: DefaultValuesFixture =
            serde_json::from_str(&text).map_err(|e| StoreError::Fixture {
                path: fixture_path,
                message: e.to_string(),
            })?;

        Ok(Self {
            data_file: PathBuf::from(&storage.data_file),
            template_file: PathBuf::from(&storage.template_file),
            defaults,
        })
    }

    /// Read and parse the live document.
    pub fn fetch(&self) -> Result<EvaluationDocument, StoreError> {
        let text = fs::read_to_string(&self.data_file).map_err(|e| StoreError::Read {
            path: self.data_file.clone(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| StoreError::Read {
            path: self.data_file.clone(),
            message: e.to_string(),
        })
    }

    /// Overwrite the live document in full, stamping `updated_at`. Returns
    /// the stamped document (what actually landed on disk).
    pub fn replace(
        &self,
        mut doc: EvaluationDocument,
    ) -> Result<EvaluationDocument, StoreError> {
        doc.updated_at = Utc::now();
        self.write_document(&doc)?;
        Ok(doc)
    }

    /// Replace the live document with the template, stamping `created_at`
    /// and `updated_at` from one instant so the two compare equal.
    pub fn reset_to_template(&self) -> Result<(), StoreError> {
        let text =
            fs::read_to_string(&self.template_file).map_err(|e| StoreError::Template {
                path: self.template_file.clone(),
                message: e.to_string(),
            })?;
        let mut template: EvaluationDocument =
            serde_json::from_str(&text).map_err(|e| StoreError::Template {
                path: self.template_file.clone(),
                message: e.to_string(),
            })?;

        let now = Utc::now();
        template.created_at = now;
        template.updated_at = now;

        self.write_document(&template)
    }

    /// Replace the live document with one built from the default-values
    /// fixture. Identity fields, bookmarks, the chat transcript, and
    /// `created_at` carry forward from the current document when one can be
    /// read; a missing or unparsable file yields empty defaults.
    pub fn reset_to_default_values(&self) -> Result<(), StoreError> {
        let current = match self.fetch() {
            Ok(doc) => Some(doc),
            Err(e) => {
                debug!("no current document to preserve: {e}");
                None
            }
        };

        let doc = build_default_document(&self.defaults, current.as_ref());
        self.write_document(&doc)
    }

    /// Path of the live document file (exposed for integration tests).
    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    // Serialize and atomically swap the data file: write a sibling temp
    // file, then rename it over the target.
    fn write_document(&self, doc: &EvaluationDocument) -> Result<(), StoreError> {
        let write_err = |message: String| StoreError::Write {
            path: self.data_file.clone(),
            message,
        };

        let json = serde_json::to_string_pretty(doc).map_err(|e| write_err(e.to_string()))?;

        let parent = match self.data_file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| write_err(e.to_string()))?;

        // Each writer gets its own randomly named temp file, so overlapping
        // writes never touch the same inode; the final rename is atomic.
        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| write_err(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| write_err(e.to_string()))?;
        tmp.persist(&self.data_file)
            .map_err(|e| write_err(e.to_string()))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Default-document construction
// ---------------------------------------------------------------------------

/// Build the default-values document from the fixture, carrying identity
/// and history fields forward from `current` when present.
///
/// Every cell is stamped `modified_by: AI` with its own `modified_at`
/// captured at stamp time, matching the original behavior (cells within one
/// reset may differ by microseconds; callers must not assume equality).
pub fn build_default_document(
    fixture: &DefaultValuesFixture,
    current: Option<&EvaluationDocument>,
) -> EvaluationDocument {
    let criterias = fixture
        .criterias
        .iter()
        .map(|(criterion_id, seed)| {
            let tables = seed
                .tables
                .iter()
                .map(|(table_id, table)| {
                    let cells = table
                        .cells
                        .iter()
                        .map(|(cell_id, cell)| {
                            (
                                cell_id.clone(),
                                Cell {
                                    value: cell.value.clone(),
                                    page_number: cell.page_number,
                                    metadata: CellMetadata {
                                        modified_by: ModifiedBy::Ai,
                                        modified_at: Utc::now(),
                                    },
                                },
                            )
                        })
                        .collect();
                    (table_id.clone(), TableData { cells })
                })
                .collect();
            (
                criterion_id.clone(),
                Criterion {
                    metadata: CriterionMetadata { tables },
                },
            )
        })
        .collect();

    EvaluationDocument {
        bid_id: current.map(|c| c.bid_id.clone()).unwrap_or_default(),
        tender_id: current.map(|c| c.tender_id.clone()).unwrap_or_default(),
        current_selected_criteria: fixture.current_selected_criteria.clone(),
        current_selected_bidder: fixture.current_selected_bidder.clone(),
        current_pdf_page: fixture.current_pdf_page,
        criterias,
        bookmarked_pages: current
            .map(|c| c.bookmarked_pages.clone())
            .unwrap_or_default(),
        chat_messages: current.map(|c| c.chat_messages.clone()).unwrap_or_default(),
        created_at: current.map(|c| c.created_at).unwrap_or_else(Utc::now),
        updated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
