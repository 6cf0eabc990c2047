//! Extraction prompt for the key/value decomposition call.
//!
//! The prompt is the only lever on what the model returns, so it lives in
//! one place and is a pure function of the document text: the same text
//! always yields the same prompt byte for byte. Unit tests inspect it
//! directly without calling a model.
//!
//! The output rules here and the tolerances in
//! [`crate::pipeline::parse`] are two halves of one contract: the prompt asks
//! for a bare JSON array, the parser copes when the model wraps it anyway.

/// Rules placed before the document text.
pub const EXTRACTION_RULES: &str = r#"Extract ALL information from the following text.

Rules:
- Do NOT summarize.
- Capture 100% of the information.
- Detect every key:value relationship present in the text.
- For each key, add a "comments" field containing the surrounding context from the text that supports the key/value pair.
- Output ONLY a valid JSON array of objects, in this exact format:
  [
    {"key": "...", "value": "...", "comments": "..."},
    ...
  ]
- Do NOT wrap the JSON in markdown code fences.
- Do NOT add any explanation or text before or after the JSON array."#;

/// Build the full extraction instruction for `document_text`.
///
/// The text is appended verbatim after a `Text:` marker; callers must have
/// already rejected empty or whitespace-only text.
pub fn build_extraction_prompt(document_text: &str) -> String {
    format!("{EXTRACTION_RULES}\n\nText:\n{document_text}\n")
}
