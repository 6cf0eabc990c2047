//! Data produced by a conversion: validated records and run statistics.

use serde::Serialize;
use serde_json::{Map, Value};

/// One fact extracted from the document.
///
/// `key` is always non-empty. `value` and `comments` are empty strings when
/// the model omitted them. Any further fields the model attached to the
/// object are kept in `extra`, in emission order, already rendered to
/// string cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRecord {
    pub key: String,
    pub value: String,
    pub comments: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtractionRecord {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        comments: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            comments: comments.into(),
            extra: Map::new(),
        }
    }

    /// String cell for an extra field, if the record has it.
    pub fn extra_cell(&self, field: &str) -> Option<&str> {
        self.extra.get(field).and_then(Value::as_str)
    }
}

/// The ordered, non-empty list of records recovered from one model response.
///
/// Order is the order the model emitted. Records with the same key are kept
/// as separate entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    records: Vec<ExtractionRecord>,
    dropped: usize,
}

impl ExtractionResult {
    /// Returns `None` when `records` is empty.
    pub fn new(records: Vec<ExtractionRecord>, dropped: usize) -> Option<Self> {
        if records.is_empty() {
            None
        } else {
            Some(Self { records, dropped })
        }
    }

    pub fn records(&self) -> &[ExtractionRecord] {
        &self.records
    }

    /// Number of records (always ≥ 1).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// How many array elements validation rejected.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_records(self) -> Vec<ExtractionRecord> {
        self.records
    }
}

/// Statistics for one conversion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    /// Pages in the document.
    pub pages: usize,
    /// Characters of extracted document text.
    pub text_chars: usize,
    /// Rows written to the spreadsheet.
    pub records: usize,
    /// Array elements dropped by validation.
    pub dropped_records: usize,
    /// Prompt tokens reported by the provider (0 if unknown).
    pub input_tokens: u64,
    /// Completion tokens reported by the provider (0 if unknown).
    pub output_tokens: u64,
    /// Model retries before the successful attempt.
    pub retries: u32,
    pub extract_duration_ms: u64,
    pub model_duration_ms: u64,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_is_rejected() {
        assert!(ExtractionResult::new(vec![], 3).is_none());
    }

    #[test]
    fn result_keeps_duplicate_keys_in_order() {
        let result = ExtractionResult::new(
            vec![
                ExtractionRecord::new("Total", "10", "line 1"),
                ExtractionRecord::new("Total", "12", "line 9"),
            ],
            0,
        )
        .unwrap();
        assert_eq!(result.len(), 2);
        assert!(!result.is_empty());
        assert_eq!(result.records()[0].value, "10");
        assert_eq!(result.records()[1].value, "12");
    }

    #[test]
    fn record_serialises_extra_fields_inline() {
        let mut record = ExtractionRecord::new("Name", "Jane", "");
        record
            .extra
            .insert("page".to_string(), Value::String("1".into()));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"key":"Name","value":"Jane","comments":"","page":"1"}"#
        );
        assert_eq!(record.extra_cell("page"), Some("1"));
        assert_eq!(record.extra_cell("missing"), None);
    }
}
