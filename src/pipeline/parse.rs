//! Response recovery: turn untrusted model text into validated records.
//!
//! The model is asked for a bare JSON array but regularly wraps it in prose
//! or markdown fences. Recovery is therefore a bracket-span match (first `[`
//! through last `]`) followed by a strict JSON parse of that span. Individual
//! elements that fail validation are dropped and counted; the request only
//! fails if nothing usable is left.
//!
//! Everything here is a pure function of the input text.

use crate::error::{Pdf2XlsxError, RecordRejection};
use crate::output::{ExtractionRecord, ExtractionResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// First `[` through the last `]`, across newlines.
static ARRAY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").unwrap());

/// The candidate JSON array inside `raw`, if there is one.
pub fn locate_array(raw: &str) -> Option<&str> {
    ARRAY_SPAN.find(raw).map(|m| m.as_str())
}

/// Recover and validate the record list from a raw model response.
pub fn parse_response(raw: &str) -> Result<ExtractionResult, Pdf2XlsxError> {
    let span = locate_array(raw).ok_or_else(|| {
        Pdf2XlsxError::malformed("model did not return a recognizable JSON array")
    })?;

    let elements: Vec<Value> = serde_json::from_str(span)
        .map_err(|e| Pdf2XlsxError::malformed(format!("invalid JSON array in model response: {e}")))?;

    if elements.is_empty() {
        return Err(Pdf2XlsxError::EmptyResult { dropped: 0 });
    }

    let mut records = Vec::with_capacity(elements.len());
    let mut dropped = 0;
    for (index, element) in elements.into_iter().enumerate() {
        match validate_record(index, element) {
            Ok(record) => records.push(record),
            Err(rejection) => {
                warn!("Dropping {}", rejection);
                dropped += 1;
            }
        }
    }

    debug!("Parsed {} record(s), dropped {}", records.len(), dropped);
    ExtractionResult::new(records, dropped).ok_or(Pdf2XlsxError::EmptyResult { dropped })
}

/// Validate one array element.
///
/// `key` must be present and non-empty; a number or boolean key is accepted
/// in its JSON spelling. Whitespace is kept as the model wrote it. `value` and `comments` default to empty strings.
/// Extra fields are kept, rendered to strings.
pub fn validate_record(index: usize, element: Value) -> Result<ExtractionRecord, RecordRejection> {
    let object = match element {
        Value::Object(object) => object,
        other => {
            return Err(RecordRejection::NotAnObject {
                index,
                found: json_type(&other),
            })
        }
    };

    // One pass in emission order: removing from an order-preserving map
    // would shuffle the fields that follow.
    let mut key = None;
    let mut value = String::new();
    let mut comments = String::new();
    let mut extra = Map::new();
    for (field, v) in object {
        match field.as_str() {
            "key" => key = Some(v),
            "value" => value = cell_text(v),
            "comments" => comments = cell_text(v),
            _ => {
                extra.insert(field, Value::String(cell_text(v)));
            }
        }
    }

    let key = match key {
        None | Some(Value::Null) => return Err(RecordRejection::MissingKey { index }),
        Some(Value::String(s)) => s,
        Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
        Some(other) => {
            return Err(RecordRejection::InvalidKey {
                index,
                found: json_type(&other),
            })
        }
    };
    if key.is_empty() {
        return Err(RecordRejection::EmptyKey { index });
    }

    Ok(ExtractionRecord {
        key,
        value,
        comments,
        extra,
    })
}

/// Render a JSON value as spreadsheet cell text.
fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
