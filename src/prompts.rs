//! Prompts sent to the chat model.
//!
//! Every prompt lives here so that unit tests can inspect them directly and
//! a wording change touches exactly one place. Callers override the system
//! prompt via [`crate::config::ExtractionOptions::system_prompt`] and the
//! extraction instruction via [`crate::extract::ExtractionSchema::with_instruction`].

/// Default system prompt for every extraction request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant that extracts data from documents and returns them as structured JSON objects. Do not return as a code block.";

/// Instruction used by the direct strategy; `{schema}` is replaced with the
/// serialised template.
pub const DIRECT_EXTRACTION_PROMPT: &str =
    "Extract the data from this document. If a value is not present, provide null. Use the following JSON schema: {schema}";

/// Instruction used by the markdown and vision strategies when the schema
/// carries no caller-supplied instruction.
pub const DEFAULT_PAGES_PROMPT: &str = "Extract all the data from the pages. If a value is not present, provide null. Do not make up values if they do not exist. Use the following JSON schema: {schema}";

/// Substitute the serialised schema into an instruction template.
///
/// Templates without a `{schema}` placeholder get the schema appended, so a
/// custom instruction never silently drops the target shape.
pub fn render_instruction(template: &str, schema_json: &str) -> String {
    if template.contains("{schema}") {
        template.replace("{schema}", schema_json)
    } else if schema_json.is_empty() {
        template.to_string()
    } else {
        format!("{template}\n\n{schema_json}")
    }
}
