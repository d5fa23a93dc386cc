//! Page rasterisation: document bytes → ordered page bitmaps.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. `tokio::task::spawn_blocking` moves the work onto
//! the blocking pool so the runtime's worker threads never stall while a
//! long scan is rendered.
//!
//! ## Why cap pixels, not DPI?
//!
//! Scanned invoices arrive at anything from 72 to 600 DPI. Capping the
//! longest edge (`max_rendered_pixels`) keeps memory bounded regardless of
//! physical size, and the tiler stacks pages vertically anyway.

use crate::config::TilingOptions;
use crate::error::PipelineError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Env var naming an explicit pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Renders a document into an ordered list of page bitmaps.
///
/// The vision extractor only depends on this trait, so tests can feed
/// synthetic pages without a pdfium library on the machine.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, bytes: Vec<u8>) -> Result<Vec<DynamicImage>, PipelineError>;
}

/// Production renderer: pdfium for PDFs, the `image` decoder for scans.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    max_pixels: u32,
    password: Option<String>,
}

impl PdfiumRenderer {
    pub fn new(options: &TilingOptions) -> Self {
        Self {
            max_pixels: options.max_rendered_pixels,
            password: options.password.clone(),
        }
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render(&self, bytes: Vec<u8>) -> Result<Vec<DynamicImage>, PipelineError> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let max_pixels = self.max_pixels;
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || {
            if is_pdf(&bytes) {
                render_pdf_blocking(&bytes, max_pixels, password.as_deref())
            } else {
                decode_raster(&bytes, max_pixels).map(|page| vec![page])
            }
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// `true` if the buffer starts with the PDF magic bytes.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the system library.
fn bind_pdfium() -> Result<Pdfium, PipelineError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => Pdfium::bind_to_library(&path)
            .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{path}: {e:?}")))?,
        _ => Pdfium::bind_to_system_library()
            .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of PDF rendering.
fn render_pdf_blocking(
    bytes: &[u8],
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, PipelineError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| PipelineError::CorruptDocument {
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PipelineError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push(image);
    }

    Ok(results)
}

/// Decode a single-page raster scan (PNG, JPEG, TIFF), downscaling it to the
/// same longest-edge cap used for PDF pages.
fn decode_raster(bytes: &[u8], max_pixels: u32) -> Result<DynamicImage, PipelineError> {
    let image = image::load_from_memory(bytes).map_err(|e| PipelineError::CorruptDocument {
        detail: e.to_string(),
    })?;

    let longest = image.width().max(image.height());
    if longest > max_pixels {
        debug!("Downscaling {}px scan to {}px", longest, max_pixels);
        Ok(image.resize(max_pixels, max_pixels, image::imageops::FilterType::Triangle))
    } else {
        Ok(image)
    }
}
