use image::DynamicImage;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::OcrError;

/// Turns PDF bytes into one image per page, in page order.
#[allow(async_fn_in_trait)]
pub trait Rasterizer {
    async fn rasterize(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError>;
}

/// Rasterizer backed by poppler's `pdftoppm`.
pub struct PdftoppmRasterizer {
    binary: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Check that `pdftoppm` can be launched
    pub async fn is_available(&self) -> bool {
        let available = Command::new(&self.binary)
            .arg("-v")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);

        if !available {
            warn!("pdftoppm not found. Install with: apt install poppler-utils");
        }
        available
    }

    async fn load_pages(&self, dir: &Path) -> Result<Vec<DynamicImage>, OcrError> {
        let mut numbered = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("png") {
                continue;
            }
            if let Some(number) = page_number(&path) {
                numbered.push((number, path));
            }
        }

        // page-2.png must come before page-10.png
        numbered.sort_by_key(|(number, _)| *number);

        let mut images = Vec::with_capacity(numbered.len());
        for (number, path) in numbered {
            let image = image::open(&path)
                .map_err(|e| OcrError::Rasterize(format!("cannot decode page {}: {}", number, e)))?;
            images.push(image);
        }
        Ok(images)
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let expected_pages = preflight_page_count(pdf_bytes);

        let temp_dir = tempfile::tempdir()?;
        let pdf_path = temp_dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, pdf_bytes).await?;
        let prefix = temp_dir.path().join("page");

        debug!("Running pdftoppm at {} DPI", dpi);
        let output = Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(&pdf_path)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| OcrError::ToolUnavailable {
                tool: "pdftoppm".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(OcrError::Rasterize(format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let images = self.load_pages(temp_dir.path()).await?;
        if images.is_empty() {
            return Err(OcrError::Rasterize("no images generated from PDF".to_string()));
        }
        if let Some(expected) = expected_pages.filter(|n| *n != images.len()) {
            warn!("PDF declares {} pages but {} were rendered", expected, images.len());
        }

        info!("Rasterized {} pages", images.len());
        Ok(images)
    }
}

/// Parse and count the pages of an in-memory PDF.
pub fn count_pages(pdf_bytes: &[u8]) -> Result<usize, OcrError> {
    let document = lopdf::Document::load_mem(pdf_bytes)
        .map_err(|e| OcrError::Rasterize(format!("failed to load PDF document: {}", e)))?;
    Ok(document.get_pages().len())
}

/// Page count when lopdf can parse the file. poppler repairs damage lopdf
/// rejects (broken xref tables and the like), so a failure here only warns.
fn preflight_page_count(pdf_bytes: &[u8]) -> Option<usize> {
    match count_pages(pdf_bytes) {
        Ok(pages) => Some(pages),
        Err(e) => {
            warn!("Page count preflight failed, leaving the file to pdftoppm: {}", e);
            None
        }
    }
}

/// `page-07.png` -> 7
fn page_number(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    let (_, number) = stem.rsplit_once('-')?;
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_number_from_pdftoppm_names() {
        assert_eq!(page_number(Path::new("/tmp/x/page-1.png")), Some(1));
        assert_eq!(page_number(Path::new("/tmp/x/page-012.png")), Some(12));
        assert_eq!(page_number(Path::new("/tmp/x/input.png")), None);
    }

    #[test]
    fn test_count_pages_rejects_garbage() {
        let err = count_pages(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, OcrError::Rasterize(_)));
    }

    #[test]
    fn test_preflight_tolerates_unparseable_pdf() {
        assert_eq!(preflight_page_count(b"%PDF-1.4 startxref 999999 %%EOF"), None);
    }

    #[tokio::test]
    async fn test_unparseable_pdf_still_reaches_pdftoppm() {
        let rasterizer = PdftoppmRasterizer::new("/nonexistent/bin/pdftoppm");
        let result = rasterizer.rasterize(b"%PDF-1.4 startxref 999999 %%EOF", 150).await;
        assert!(matches!(result, Err(OcrError::ToolUnavailable { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdftoppm_failure_is_document_error() {
        // `false` accepts any arguments and exits 1
        let rasterizer = PdftoppmRasterizer::new("false");
        let result = rasterizer.rasterize(b"%PDF-broken", 150).await;
        assert!(matches!(result, Err(OcrError::Rasterize(msg)) if msg.starts_with("pdftoppm failed")));
    }

    #[tokio::test]
    async fn test_load_pages_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for (number, shade) in [(10u8, 10u8), (2, 2), (1, 1)] {
            let img = image::GrayImage::from_pixel(1, 1, image::Luma([shade]));
            img.save(dir.path().join(format!("page-{}.png", number))).unwrap();
        }
        std::fs::write(dir.path().join("input.pdf"), b"x").unwrap();

        let pages = PdftoppmRasterizer::default().load_pages(dir.path()).await.unwrap();
        let shades: Vec<u8> = pages.iter().map(|p| p.to_luma8().get_pixel(0, 0).0[0]).collect();
        assert_eq!(shades, vec![1, 2, 10]);
    }
}
