//! Categorical vocabulary: the frozen mapping from field values to one-hot
//! positions.
//!
//! Vector position encodes a specific value, so the ordering policy has to
//! be fixed and recorded: fields appear in configured order, values within a
//! field in first-seen order over the fusion input. The vocabulary is
//! persisted as JSON next to the index so later query encoding matches the
//! stored collection exactly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use cardex_core::types::CardRecord;
use cardex_core::{Error, Result};

/// Distinct values of one categorical field, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldVocabulary {
    pub name: String,
    pub values: Vec<String>,
}

impl FieldVocabulary {
    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// The complete encoding schema of one fusion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Width of the semantic embedding block (leading block of every
    /// fused vector).
    pub semantic_width: usize,
    /// Categorical blocks, concatenated after the semantic block in this
    /// exact order.
    pub fields: Vec<FieldVocabulary>,
}

impl Vocabulary {
    /// Scan all records and freeze the value sets. Runs to completion
    /// before any vector is finalized: the categorical width is global.
    pub fn scan(records: &[CardRecord], field_names: &[String], semantic_width: usize) -> Self {
        let mut fields = Vec::with_capacity(field_names.len());
        for name in field_names {
            let mut values: Vec<String> = Vec::new();
            for record in records {
                if let Some(v) = record.category(name) {
                    if !values.iter().any(|seen| seen == v) {
                        values.push(v.to_string());
                    }
                }
            }
            fields.push(FieldVocabulary {
                name: name.clone(),
                values,
            });
        }
        Self {
            semantic_width,
            fields,
        }
    }

    pub fn categorical_width(&self) -> usize {
        self.fields.iter().map(FieldVocabulary::width).sum()
    }

    /// Full fused-vector width: semantic block + all categorical blocks.
    pub fn total_width(&self) -> usize {
        self.semantic_width + self.categorical_width()
    }

    /// One-hot encode a record's categorical fields. Each field contributes
    /// a sub-vector with exactly one `1.0` at its value's position, or all
    /// zeros when the record lacks the field (or carries a value unseen at
    /// scan time).
    pub fn encode_categorical(&self, record: &CardRecord) -> Vec<f32> {
        let mut block = Vec::with_capacity(self.categorical_width());
        for field in &self.fields {
            let value = record.category(&field.name);
            for candidate in &field.values {
                let hit = value == Some(candidate.as_str());
                block.push(if hit { 1.0 } else { 0.0 });
            }
        }
        block
    }

    /// The categorical block used for free-text queries: all zeros, since a
    /// query string carries no categorical identity.
    pub fn zero_categorical(&self) -> Vec<f32> {
        vec![0.0; self.categorical_width()]
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(Error::other)?;
        std::fs::write(path, json).map_err(Error::other)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::NotFound(format!("vocabulary at {}: {e}", path.display())))?;
        serde_json::from_str(&raw).map_err(Error::other)
    }
}
