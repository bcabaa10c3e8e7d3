//! Planning document model
//!
//! The planning document is a list of month sections, each holding exactly
//! four week entries. It is always persisted as a whole: a
//! [`DocumentSnapshot`] replaces the previous one, nothing is merged.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Identity of the user owning a planning document
pub type OwnerId = Uuid;

/// Number of week entries in every month section
pub const WEEKS_PER_MONTH: usize = 4;

/// Errors that can occur while editing a planning document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Month {0} does not exist")]
    MonthOutOfRange(usize),

    #[error("Week {0} does not exist (expected 1-4)")]
    WeekOutOfRange(usize),

    #[error("Unknown week field '{0}' (expected theme, posts or notes)")]
    UnknownField(String),
}

/// One week of a month section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekEntry {
    /// Theme or campaign for the week
    #[serde(default)]
    pub theme: String,
    /// Planned posts
    #[serde(default)]
    pub posts: String,
    /// Free-form notes
    #[serde(default)]
    pub notes: String,
}

/// Editable fields of a [`WeekEntry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekField {
    Theme,
    Posts,
    Notes,
}

impl std::str::FromStr for WeekField {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "theme" => Ok(WeekField::Theme),
            "posts" => Ok(WeekField::Posts),
            "notes" => Ok(WeekField::Notes),
            other => Err(DocumentError::UnknownField(other.to_string())),
        }
    }
}

impl WeekEntry {
    /// Set a single field
    pub fn set(&mut self, field: WeekField, value: impl Into<String>) {
        let value = value.into();
        match field {
            WeekField::Theme => self.theme = value,
            WeekField::Posts => self.posts = value,
            WeekField::Notes => self.notes = value,
        }
    }

    /// Check whether every field is blank
    pub fn is_blank(&self) -> bool {
        self.theme.trim().is_empty() && self.posts.trim().is_empty() && self.notes.trim().is_empty()
    }
}

/// A month section of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSection {
    /// Stable identifier
    pub id: Uuid,
    /// Display title, e.g. "March"
    pub title: String,
    /// Goal for the month
    #[serde(default)]
    pub goal: String,
    /// Exactly four weeks
    pub weeks: [WeekEntry; WEEKS_PER_MONTH],
}

impl MonthSection {
    /// Create a month with blank weeks
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            goal: String::new(),
            weeks: Default::default(),
        }
    }
}

/// Layout of the planning document, version 1
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanV1 {
    pub months: Vec<MonthSection>,
}

/// The planning document payload
///
/// Versioned so that a layout change is a new variant rather than a
/// silently different map shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version", content = "plan")]
pub enum PlanDocument {
    #[serde(rename = "1")]
    V1(PlanV1),
}

impl Default for PlanDocument {
    fn default() -> Self {
        PlanDocument::V1(PlanV1::default())
    }
}

impl PlanDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Month sections in display order
    pub fn months(&self) -> &[MonthSection] {
        match self {
            PlanDocument::V1(plan) => &plan.months,
        }
    }

    fn months_mut(&mut self) -> &mut Vec<MonthSection> {
        match self {
            PlanDocument::V1(plan) => &mut plan.months,
        }
    }

    /// Append a month section, returning its index
    pub fn add_month(&mut self, month: MonthSection) -> usize {
        let months = self.months_mut();
        months.push(month);
        months.len() - 1
    }

    /// Remove a month section by index
    pub fn remove_month(&mut self, index: usize) -> Result<MonthSection, DocumentError> {
        let months = self.months_mut();
        if index >= months.len() {
            return Err(DocumentError::MonthOutOfRange(index + 1));
        }
        Ok(months.remove(index))
    }

    /// Get a month section mutably
    pub fn month_mut(&mut self, index: usize) -> Result<&mut MonthSection, DocumentError> {
        self.months_mut()
            .get_mut(index)
            .ok_or(DocumentError::MonthOutOfRange(index + 1))
    }

    /// Set a field on one week of a month (both indexes are 0-based)
    pub fn set_week_field(
        &mut self,
        month: usize,
        week: usize,
        field: WeekField,
        value: impl Into<String>,
    ) -> Result<(), DocumentError> {
        if week >= WEEKS_PER_MONTH {
            return Err(DocumentError::WeekOutOfRange(week + 1));
        }
        self.month_mut(month)?.weeks[week].set(field, value);
        Ok(())
    }

    /// SHA-256 over the canonical JSON encoding
    pub fn content_hash(&self) -> ContentHash {
        // Serializing plain structs and strings cannot fail
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        ContentHash(Sha256::digest(&bytes).into())
    }
}

/// Content hash of a planning document
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for display
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}..)", self.short())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The full planning document at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Owner of the document
    pub owner: OwnerId,
    /// When the snapshot was taken
    pub updated_at: DateTime<Utc>,
    /// The payload
    pub document: PlanDocument,
}

impl DocumentSnapshot {
    /// Snapshot a document now
    pub fn new(owner: OwnerId, document: PlanDocument) -> Self {
        Self {
            owner,
            updated_at: Utc::now(),
            document,
        }
    }

    /// Content hash of the payload; the timestamp is not included
    pub fn content_hash(&self) -> ContentHash {
        self.document.content_hash()
    }
}
