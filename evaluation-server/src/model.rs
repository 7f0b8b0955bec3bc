// Evaluation document model (the JSON payload stored on disk and served
// over /api/bid-evaluation) plus the default-values fixture shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Cell provenance
// ---------------------------------------------------------------------------

/// Who last wrote a table cell: automated extraction or a human edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifiedBy {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "human")]
    Human,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellMetadata {
    pub modified_by: ModifiedBy,
    pub modified_at: DateTime<Utc>,
}

impl Default for CellMetadata {
    fn default() -> Self {
        Self {
            modified_by: ModifiedBy::Ai,
            modified_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Criteria tables
// ---------------------------------------------------------------------------

/// A single table cell: the extracted value, the PDF page it came from, and
/// its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cell {
    pub value: String,
    pub page_number: u32,
    pub metadata: CellMetadata,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            value: String::new(),
            page_number: 1,
            metadata: CellMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableData {
    pub cells: BTreeMap<String, Cell>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CriterionMetadata {
    pub tables: BTreeMap<String, TableData>,
}

/// A named evaluation dimension (e.g. financial strength) holding one or
/// more per-bidder comparison tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Criterion {
    pub metadata: CriterionMetadata,
}

// ---------------------------------------------------------------------------
// EvaluationDocument
// ---------------------------------------------------------------------------

/// One in-progress bid evaluation: criteria tables with per-cell provenance,
/// UI cursor state, bookmarks, and the chat transcript.
///
/// Field names match the wire format consumed by the UI (`criterias` is the
/// original spelling and is kept). Bookmarks and chat turns are opaque JSON:
/// the store never interprets them, it only carries them forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationDocument {
    pub bid_id: String,
    pub tender_id: String,
    pub current_selected_criteria: String,
    pub current_selected_bidder: String,
    pub current_pdf_page: u32,
    pub criterias: BTreeMap<String, Criterion>,
    pub bookmarked_pages: Vec<Value>,
    pub chat_messages: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for EvaluationDocument {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            bid_id: String::new(),
            tender_id: String::new(),
            current_selected_criteria: String::new(),
            current_selected_bidder: String::new(),
            current_pdf_page: 1,
            criterias: BTreeMap::new(),
            bookmarked_pages: Vec::new(),
            chat_messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Default-values fixture
// ---------------------------------------------------------------------------

/// Seed for one cell in the default-values fixture. Provenance is not part
/// of the fixture; `modified_by`/`modified_at` are stamped at reset time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedCell {
    pub value: String,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SeedTable {
    pub cells: BTreeMap<String, SeedCell>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SeedCriterion {
    pub tables: BTreeMap<String, SeedTable>,
}

/// The externally-stored "default correct values" document seed
/// (`defaults/default-values.json`): cursor state plus per-criterion table
/// values keyed the same way as [`EvaluationDocument::criterias`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DefaultValuesFixture {
    pub current_selected_criteria: String,
    pub current_selected_bidder: String,
    pub current_pdf_page: u32,
    pub criterias: BTreeMap<String, SeedCriterion>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
