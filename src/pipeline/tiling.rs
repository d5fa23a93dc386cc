//! Page tiling: pack `N` rendered pages into at most `K` composite images.
//!
//! Multimodal chat endpoints cap the number of images per request. Instead
//! of dropping pages, consecutive pages are stacked vertically:
//!
//! ```text
//! S = ceil(N / K)                 pages per composite
//! group i = pages [i·S, min((i+1)·S, N))
//! ```
//!
//! Groups partition the page sequence in order, so concatenating them
//! reproduces the document. `N ≤ K` gives `S = 1` and pages pass through
//! untouched; `N = 0` gives no groups at all.

use image::{imageops, DynamicImage, Rgb, RgbImage};
use std::ops::Range;
use tracing::debug;

/// Pages per composite for `page_count` pages and at most `max_tiles` tiles.
pub fn group_size(page_count: usize, max_tiles: usize) -> usize {
    if page_count == 0 || max_tiles == 0 {
        return 0;
    }
    page_count.div_ceil(max_tiles)
}

/// Contiguous page ranges, one per composite, in document order.
pub fn plan_groups(page_count: usize, max_tiles: usize) -> Vec<Range<usize>> {
    let step = group_size(page_count, max_tiles);
    if step == 0 {
        return Vec::new();
    }
    (0..page_count)
        .step_by(step)
        .map(|start| start..(start + step).min(page_count))
        .collect()
}

/// Stack `pages` top-to-bottom on a white canvas.
///
/// Width is the widest page, height the sum of all heights; narrower pages
/// are left-aligned.
pub fn stitch(pages: &[DynamicImage]) -> DynamicImage {
    let width = pages.iter().map(|p| p.width()).max().unwrap_or(0);
    let height: u32 = pages.iter().map(|p| p.height()).sum();

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut y: i64 = 0;
    for page in pages {
        imageops::overlay(&mut canvas, &page.to_rgb8(), 0, y);
        y += i64::from(page.height());
    }
    DynamicImage::ImageRgb8(canvas)
}

/// Pack rendered pages into at most `max_tiles` composites, in order.
///
/// Single-page groups are passed through without re-drawing.
pub fn tile_pages(pages: Vec<DynamicImage>, max_tiles: usize) -> Vec<DynamicImage> {
    let groups = plan_groups(pages.len(), max_tiles);
    if groups.is_empty() {
        return Vec::new();
    }

    debug!(
        "Tiling {} pages into {} composites ({} pages each)",
        pages.len(),
        groups.len(),
        groups[0].len()
    );

    if groups.len() == pages.len() {
        return pages;
    }

    groups
        .into_iter()
        .map(|range| match &pages[range.clone()] {
            [single] => single.clone(),
            group => stitch(group),
        })
        .collect()
}
