//! Result types accumulated by workflows and activities.

use super::log::ReplaySafeLog;
use crate::invoice::{InvoiceValidation, ValidationStatus};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use tracing::Level;

/// Validity plus messages. Any error makes it invalid for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub messages: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            messages: Vec::new(),
        }
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.messages.push(message.into());
    }

    /// AND validity, append messages.
    pub fn merge(&mut self, other: &ValidationResult) {
        self.is_valid &= other.is_valid;
        self.messages.extend(other.messages.iter().cloned());
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages.join("; "))
    }
}

/// A node in the batch result tree.
///
/// A parent is valid only if its own checks and every child are valid;
/// status flags OR upwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkflowResult {
    pub name: String,
    pub is_valid: bool,
    pub status: ValidationStatus,
    pub messages: Vec<String>,
    #[serde(default, rename = "ActivityResults")]
    pub children: Vec<WorkflowResult>,
}

impl WorkflowResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_valid: true,
            status: ValidationStatus::NONE,
            messages: Vec::new(),
            children: Vec::new(),
        }
    }

    fn format(&self, action: &str, message: &str) -> String {
        format!("{}::{} - {}", self.name, action, message)
    }

    /// Record progress; logged at info.
    pub fn add_message(&mut self, action: &str, message: &str, log: &ReplaySafeLog) {
        let line = self.format(action, message);
        log.log(Level::INFO, format_args!("{}", line));
        self.messages.push(line);
    }

    /// Record a failure attributed to `action`; logged at `level`.
    pub fn add_error(&mut self, action: &str, message: &str, log: &ReplaySafeLog, level: Level) {
        let line = self.format(action, message);
        log.log(level, format_args!("{}", line));
        self.is_valid = false;
        self.messages.push(line);
    }

    /// Fold in a request validation.
    pub fn merge(&mut self, other: &ValidationResult) {
        self.is_valid &= other.is_valid;
        self.messages.extend(other.messages.iter().cloned());
    }

    /// Fold in an invoice validation outcome.
    pub fn merge_validation(&mut self, outcome: &InvoiceValidation) {
        self.is_valid &= outcome.is_valid;
        self.status |= outcome.status;
        self.messages.extend(outcome.messages.iter().cloned());
    }

    /// Attach a child result.
    pub fn add_child(
        &mut self,
        action: &str,
        message: &str,
        child: WorkflowResult,
        log: &ReplaySafeLog,
    ) {
        log.log(
            Level::INFO,
            format_args!("{}", self.format(action, &format!("{} ({})", message, child.name))),
        );
        self.is_valid &= child.is_valid;
        self.status |= child.status;
        self.children.push(child);
    }

    /// Children that failed, in order.
    pub fn failed_children(&self) -> impl Iterator<Item = &WorkflowResult> {
        self.children.iter().filter(|c| !c.is_valid)
    }

    /// Indented, human-readable rendering of the tree.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        let mark = if self.is_valid { "ok" } else { "FAILED" };
        let _ = writeln!(out, "{pad}{} [{}] {}", self.name, mark, self.status);
        for m in &self.messages {
            let _ = writeln!(out, "{pad}  - {m}");
        }
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

impl fmt::Display for WorkflowResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> ReplaySafeLog {
        ReplaySafeLog::live("test")
    }

    #[test]
    fn messages_use_name_action_format() {
        let mut r = WorkflowResult::new("march/a.pdf");
        r.add_message("Validate", "input is valid.", &log());
        assert_eq!(r.messages, vec!["march/a.pdf::Validate - input is valid."]);
        assert!(r.is_valid);
    }

    #[test]
    fn error_invalidates() {
        let mut r = WorkflowResult::new("n");
        r.add_error("ExtractInvoiceData", "boom", &log(), Level::ERROR);
        assert!(!r.is_valid);
    }

    #[test]
    fn child_validity_ands_and_flags_or() {
        let mut root = WorkflowResult::new("root");
        let mut ok = WorkflowResult::new("a");
        ok.status = ValidationStatus::SUCCESS;
        let mut bad = WorkflowResult::new("b");
        bad.is_valid = false;
        bad.status = ValidationStatus::CUSTOMER_NAME_MISSING;

        root.add_child("Process", "done", ok, &log());
        assert!(root.is_valid);
        root.add_child("Process", "done", bad, &log());
        assert!(!root.is_valid);
        assert!(root
            .status
            .contains(ValidationStatus::SUCCESS | ValidationStatus::CUSTOMER_NAME_MISSING));
        assert_eq!(root.failed_children().map(|c| c.name.as_str()).collect::<Vec<_>>(), ["b"]);
    }

    #[test]
    fn merge_ands_validity() {
        let mut r = WorkflowResult::new("n");
        let mut v = ValidationResult::new();
        v.add_error("Container is required.");
        r.merge(&v);
        assert!(!r.is_valid);
        assert_eq!(r.messages, vec!["Container is required."]);

        let mut ok = ValidationResult::new();
        ok.add_message("fine");
        r.merge(&ok);
        assert!(!r.is_valid, "validity never comes back");
    }

    #[test]
    fn tree_renders_children_indented() {
        let mut root = WorkflowResult::new("root");
        root.add_child("P", "done", WorkflowResult::new("doc"), &log());
        let text = root.render_tree();
        assert!(text.starts_with("root [ok] None\n"));
        assert!(text.contains("\n  doc [ok] None\n"));
    }
}
