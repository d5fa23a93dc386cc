//! Pipeline stages shared by the extraction strategies.
//!
//! Each submodule implements exactly one transformation step so it can be
//! tested on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ tiling ──▶ encode ──▶ llm ──▶ postprocess
//! (URI)     (pdfium)   (≤10 tiles) (JPEG)    (chat)   (cleanup)
//!
//! input ──▶ markdown ──▶ llm ──▶ postprocess
//! (URI)     (layout service)
//! ```
//!
//! 1. [`input`]    — fetch the bytes behind an `http(s)://`, `file://` or path URI
//! 2. [`render`]   — rasterise pages; runs in `spawn_blocking` because pdfium
//!    is CPU-bound
//! 3. [`tiling`]   — pack `N` pages into at most `K` stitched composites
//! 4. [`encode`]   — JPEG-encode and base64-wrap each composite
//! 5. [`markdown`] — layout-service conversion to Markdown
//! 6. [`llm`]      — chat completion seam; the only stage talking to a model
//! 7. [`postprocess`] — deterministic cleanup (code fences, invisible chars)

pub mod encode;
pub mod input;
pub mod llm;
pub mod markdown;
pub mod postprocess;
pub mod render;
pub mod tiling;
