//! Post-processing: deterministic cleanup of model and service output.
//!
//! Even with "Do not return as a code block" in the system prompt, chat
//! models regularly wrap JSON in ```` ```json ```` fences, prepend a BOM or
//! sprinkle zero-width spaces. These rules fix such quirks without touching
//! content so the JSON parser sees exactly what the model meant.
//!
//! ## Rule Order
//!
//! Invisible characters go first so a leading BOM cannot hide a fence, and
//! line endings are normalised before fence detection because the fence
//! regex is LF-only.

use once_cell::sync::Lazy;
use regex::Regex;

/// Prepare a raw chat answer for JSON parsing.
///
/// 1. Strip invisible Unicode (BOM, zero-width spaces, soft hyphens)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip a single outer code fence (```` ```json ```` or bare ```` ``` ````)
/// 4. Trim surrounding whitespace
pub fn clean_json_response(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_code_fence(&s);
    s.trim().to_string()
}

/// Tidy Markdown returned by the layout service before it is stored.
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule: Strip outer code fence ─────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```\s*$")
        .expect("fence regex is valid")
});

fn strip_code_fence(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCE.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule: Normalise line endings ─────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule: Trim trailing whitespace per line ──────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule: Collapse excessive blank lines ─────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("blank-line regex is valid"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule: Remove invisible Unicode characters ────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule: Ensure file ends with single newline ───────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}
