//! OCR fallback for scanned documents.
//!
//! Rendering and recognition run in sidecar processes (`pdftoppm` and
//! `tesseract`) behind the [`OcrEngine`] trait, so the sidecar can be
//! swapped without touching any extraction invariant. Pages are rendered at
//! 300 DPI, optionally enhanced for recognition, and processed with a
//! bounded number of pages in flight.

use async_trait::async_trait;
use futures_util::future::join_all;
use image::DynamicImage;
use ragserve_core::ExtractionError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Render resolution for page rasterization.
const OCR_DPI: u32 = 300;

/// Maximum pages recognized concurrently.
const MAX_PARALLEL_PAGES: usize = 5;

/// Minimum raster height before enhancement upscales.
const TARGET_HEIGHT: u32 = 2000;

/// Union language pack: English plus the supported Indic scripts.
const OCR_LANGUAGES: &str = "eng+hin+ben+ori+tam+tel+kan+mal";

/// Tesseract page-segmentation mode: assume a single uniform block of text.
const OCR_PSM: &str = "6";

/// Hard cap when probing an unknown page count.
const PROBE_PAGE_CAP: u32 = 1000;

/// Result of an OCR pass over a document.
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    /// Post-processed text, pages joined with `\n\n`
    pub text: String,
    /// Pages that produced output
    pub pages: u32,
}

/// Trait for the OCR sidecar.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine version string, if discoverable.
    async fn version(&self) -> Option<String>;

    /// Recognize a whole PDF.
    ///
    /// When `page_count` is unknown the engine probes pages until the
    /// renderer reports no more.
    async fn recognize_pdf(
        &self,
        path: &Path,
        page_count: Option<u32>,
    ) -> Result<OcrOutcome, ExtractionError>;
}

/// Tesseract-backed OCR engine using `pdftoppm` for rasterization.
pub struct TesseractOcr {
    languages: String,
    enhance: bool,
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self {
            languages: OCR_LANGUAGES.to_string(),
            enhance: true,
        }
    }

    /// Disable the image-enhancement pass (faster, lower accuracy).
    pub fn without_enhancement(mut self) -> Self {
        self.enhance = false;
        self
    }

    /// Render one page to a PNG under `work_dir`, returning the image path.
    async fn render_page(
        &self,
        pdf: &Path,
        page: u32,
        work_dir: &Path,
    ) -> Result<PathBuf, ExtractionError> {
        let prefix = work_dir.join(format!("page-{page}"));
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(OCR_DPI.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(pdf)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| ExtractionError::Ocr(format!("pdftoppm spawn failed: {e}")))?;

        if !output.status.success() {
            return Err(ExtractionError::Ocr(format!(
                "pdftoppm failed on page {page}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let image_path = PathBuf::from(format!("{}.png", prefix.display()));
        if !image_path.exists() {
            return Err(ExtractionError::Ocr(format!(
                "no raster produced for page {page}"
            )));
        }
        Ok(image_path)
    }

    /// Run tesseract on one page image.
    async fn recognize_image(&self, image_path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("--psm")
            .arg(OCR_PSM)
            .output()
            .await
            .map_err(|e| ExtractionError::Ocr(format!("tesseract spawn failed: {e}")))?;

        if !output.status.success() {
            return Err(ExtractionError::Ocr(format!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| ExtractionError::Ocr(format!("tesseract produced invalid utf-8: {e}")))
    }

    /// Render, enhance, and recognize one page.
    async fn process_page(
        &self,
        pdf: &Path,
        page: u32,
        work_dir: &Path,
    ) -> Result<String, ExtractionError> {
        let image_path = self.render_page(pdf, page, work_dir).await?;

        let ocr_input = if self.enhance {
            let enhanced_path = work_dir.join(format!("page-{page}-enhanced.png"));
            let source = image_path.clone();
            let target = enhanced_path.clone();
            let result = tokio::task::spawn_blocking(move || -> Result<(), String> {
                let img = image::open(&source).map_err(|e| e.to_string())?;
                enhance_image(img).save(&target).map_err(|e| e.to_string())
            })
            .await;

            match result {
                Ok(Ok(())) => enhanced_path,
                Ok(Err(e)) => {
                    warn!(page, error = %e, "enhancement failed, using raw raster");
                    image_path
                }
                Err(e) => {
                    warn!(page, error = %e, "enhancement task failed, using raw raster");
                    image_path
                }
            }
        } else {
            image_path
        };

        let raw = self.recognize_image(&ocr_input).await?;
        Ok(post_process_ocr(&raw))
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn version(&self) -> Option<String> {
        let output = Command::new("tesseract").arg("--version").output().await.ok()?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.lines().next().map(|line| line.trim().to_string())
    }

    async fn recognize_pdf(
        &self,
        path: &Path,
        page_count: Option<u32>,
    ) -> Result<OcrOutcome, ExtractionError> {
        let work_dir =
            std::env::temp_dir().join(format!("ragserve-ocr-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await?;

        let outcome = match page_count {
            Some(count) => self.recognize_known(path, count, &work_dir).await,
            None => self.recognize_probing(path, &work_dir).await,
        };

        // Best-effort cleanup of page rasters.
        let _ = tokio::fs::remove_dir_all(&work_dir).await;

        outcome
    }
}

impl TesseractOcr {
    /// Recognize pages 1..=count with a bounded number in flight.
    async fn recognize_known(
        &self,
        pdf: &Path,
        count: u32,
        work_dir: &Path,
    ) -> Result<OcrOutcome, ExtractionError> {
        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_PAGES));

        let tasks = (1..=count).map(|page| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| ExtractionError::Ocr(format!("semaphore error: {e}")))?;
                self.process_page(pdf, page, work_dir).await
            }
        });

        let results: Vec<Result<String, ExtractionError>> = join_all(tasks).await;

        let mut pages = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (page, result) in results.into_iter().enumerate() {
            match result {
                Ok(text) if !text.is_empty() => pages.push(text),
                Ok(_) => {}
                Err(e) => {
                    warn!(page = page + 1, error = %e, "ocr failed for page");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if pages.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        debug!(pages = pages.len(), total = count, "ocr pass complete");
        Ok(OcrOutcome {
            pages: pages.len() as u32,
            text: pages.join("\n\n"),
        })
    }

    /// Recognize pages sequentially until the renderer signals no more.
    async fn recognize_probing(
        &self,
        pdf: &Path,
        work_dir: &Path,
    ) -> Result<OcrOutcome, ExtractionError> {
        let mut pages = Vec::new();
        for page in 1..=PROBE_PAGE_CAP {
            match self.process_page(pdf, page, work_dir).await {
                Ok(text) => {
                    if !text.is_empty() {
                        pages.push(text);
                    }
                }
                Err(e) => {
                    debug!(page, error = %e, "probe stopped");
                    break;
                }
            }
        }

        Ok(OcrOutcome {
            pages: pages.len() as u32,
            text: pages.join("\n\n"),
        })
    }
}

/// Prepare a page raster for recognition.
///
/// Upscales to at least 2000 px height with Lanczos3, applies a mild gamma
/// lift, brightness and contrast adjustment, then an unsharp mask.
pub fn enhance_image(img: DynamicImage) -> DynamicImage {
    let img = if img.height() < TARGET_HEIGHT {
        let scale = TARGET_HEIGHT as f32 / img.height() as f32;
        let width = (img.width() as f32 * scale).round() as u32;
        img.resize_exact(
            width.max(1),
            TARGET_HEIGHT,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img
    };

    let img = apply_gamma(img, 1.1);
    let img = img.brighten(8);
    let img = img.adjust_contrast(12.0);
    img.unsharpen(1.2, 3)
}

/// Per-channel gamma lift.
fn apply_gamma(img: DynamicImage, gamma: f32) -> DynamicImage {
    let exponent = 1.0 / gamma;
    let mut rgb = img.to_rgb8();
    for pixel in rgb.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let normalized = f32::from(*channel) / 255.0;
            *channel = (normalized.powf(exponent) * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// Clean raw tesseract output.
///
/// Strips pipe and underscore runs, normalizes long dot runs to an ellipsis,
/// fixes space-before-punctuation, collapses whitespace, drops empty lines.
pub fn post_process_ocr(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let line = strip_runs(line, '|', 2);
        let line = strip_runs(&line, '_', 3);
        let line = normalize_ellipses(&line);
        let line = fix_punctuation_spacing(&line);
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

/// Replace runs of `c` at least `min_len` long with a single space.
fn strip_runs(line: &str, c: char, min_len: usize) -> String {
    let mut out = String::with_capacity(line.len());
    let mut run = String::new();
    for ch in line.chars() {
        if ch == c {
            run.push(ch);
        } else {
            if !run.is_empty() {
                if run.chars().count() >= min_len {
                    out.push(' ');
                } else {
                    out.push_str(&run);
                }
                run.clear();
            }
            out.push(ch);
        }
    }
    if !run.is_empty() {
        if run.chars().count() >= min_len {
            out.push(' ');
        } else {
            out.push_str(&run);
        }
    }
    out
}

/// Collapse runs of four or more dots to a three-dot ellipsis.
fn normalize_ellipses(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut dots = 0usize;
    for ch in line.chars() {
        if ch == '.' {
            dots += 1;
        } else {
            let segment = if dots >= 4 { "...".to_string() } else { ".".repeat(dots) };
            out.push_str(&segment);
            dots = 0;
            out.push(ch);
        }
    }
    let segment = if dots >= 4 { "...".to_string() } else { ".".repeat(dots) };
    out.push_str(&segment);
    out
}

/// Remove stray spaces before closing punctuation.
fn fix_punctuation_spacing(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for ch in line.chars() {
        if matches!(ch, '.' | ',' | ';' | ':' | '!' | '?') {
            while out.ends_with(' ') {
                out.pop();
            }
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_process_strips_pipe_runs() {
        assert_eq!(post_process_ocr("a ||| b"), "a b");
        assert_eq!(post_process_ocr("a | b"), "a | b");
    }

    #[test]
    fn test_post_process_strips_underscore_rules() {
        assert_eq!(post_process_ocr("signed ____ here"), "signed here");
        assert_eq!(post_process_ocr("snake_case stays"), "snake_case stays");
    }

    #[test]
    fn test_post_process_normalizes_ellipses() {
        assert_eq!(post_process_ocr("wait......."), "wait...");
        assert_eq!(post_process_ocr("end."), "end.");
        assert_eq!(post_process_ocr("three... stays"), "three... stays");
    }

    #[test]
    fn test_post_process_fixes_punctuation_spacing() {
        assert_eq!(post_process_ocr("Hello , world ."), "Hello, world.");
        assert_eq!(post_process_ocr("what ?"), "what?");
    }

    #[test]
    fn test_post_process_collapses_whitespace_and_drops_empty_lines() {
        assert_eq!(
            post_process_ocr("one    two\n\n\n   \nthree"),
            "one two\nthree"
        );
    }

    #[test]
    fn test_strip_runs_at_line_end() {
        assert_eq!(strip_runs("tail||||", '|', 2), "tail ");
    }

    #[test]
    fn test_enhance_upscales_small_images() {
        let small = DynamicImage::new_rgb8(100, 150);
        let enhanced = enhance_image(small);
        assert_eq!(enhanced.height(), TARGET_HEIGHT);
        // Aspect ratio preserved within rounding.
        let expected_width = (100.0 * (TARGET_HEIGHT as f32 / 150.0)).round() as u32;
        assert_eq!(enhanced.width(), expected_width);
    }

    #[test]
    fn test_enhance_keeps_large_images_at_size() {
        let large = DynamicImage::new_rgb8(1800, 2400);
        let enhanced = enhance_image(large);
        assert_eq!(enhanced.width(), 1800);
        assert_eq!(enhanced.height(), 2400);
    }

    #[test]
    fn test_apply_gamma_brightens_midtones() {
        let mut img = image::RgbImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgb([128, 128, 128]));
        let out = apply_gamma(DynamicImage::ImageRgb8(img), 1.1).to_rgb8();
        let pixel = out.get_pixel(0, 0);
        assert!(pixel.0[0] > 128);
    }

    #[test]
    fn test_apply_gamma_preserves_extremes() {
        let mut img = image::RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([0, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([255, 255, 255]));
        let out = apply_gamma(DynamicImage::ImageRgb8(img), 1.1).to_rgb8();
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(1, 0).0, [255, 255, 255]);
    }
}
