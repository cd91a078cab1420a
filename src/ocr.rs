use image::DynamicImage;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;

use crate::error::OcrError;
use crate::pdf::Rasterizer;
use crate::preprocess::preprocess_image;

/// Recognition engine mode passed to every engine call (default LSTM + legacy).
pub const ENGINE_MODE: u8 = 3;

pub const SUPPORTED_LANGUAGES: [&str; 8] = ["eng", "fra", "deu", "spa", "ita", "por", "chi_sim", "jpn"];

/// Page segmentation modes offered to users: fully automatic, uniform block, sparse text.
pub const SUPPORTED_PSM: [u8; 3] = [3, 6, 11];

const BANNER_RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrSettings {
    pub language: String,
    pub dpi: u32,
    pub psm: u8,
    pub enhance: bool,
    pub denoise: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            dpi: 300,
            psm: 3,
            enhance: true,
            denoise: true,
        }
    }
}

impl OcrSettings {
    /// Engine configuration string, e.g. `--oem 3 --psm 6`.
    pub fn engine_config(&self) -> String {
        format!("--oem {} --psm {}", ENGINE_MODE, self.psm)
    }
}

/// Recognizes the text on a single page image.
#[allow(async_fn_in_trait)]
pub trait OcrEngine {
    async fn recognize(&self, image: &DynamicImage, language: &str, config: &str) -> Result<String, OcrError>;
}

/// Engine backed by the `tesseract` command-line tool.
pub struct TesseractEngine {
    binary: PathBuf,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    pub async fn is_available(&self) -> bool {
        let available = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);

        if !available {
            error!("Tesseract not found. Install with: apt install tesseract-ocr");
        }
        available
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractEngine {
    async fn recognize(&self, image: &DynamicImage, language: &str, config: &str) -> Result<String, OcrError> {
        let temp_dir = tempfile::tempdir()?;
        let image_path = temp_dir.path().join("page.png");
        image
            .save(&image_path)
            .map_err(|e| OcrError::Recognition(format!("cannot write page image: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg(&image_path)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .args(config.split_whitespace())
            .output()
            .await
            .map_err(|e| OcrError::ToolUnavailable {
                tool: "tesseract".to_string(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(OcrError::Recognition(format!(
                "tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Result of recognizing one page. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    pub index: usize,
    pub text: String,
    pub error: Option<String>,
}

/// Full text of a document plus the per-page breakdown it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: usize,
    pub pages: Vec<PageOutcome>,
}

impl ExtractedDocument {
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageOutcome> {
        self.pages.iter().filter(|p| p.error.is_some())
    }
}

pub fn page_banner(index: usize) -> String {
    let rule = "=".repeat(BANNER_RULE_WIDTH);
    format!("\n{rule}\nPAGE {index}\n{rule}\n\n")
}

pub fn error_banner(index: usize) -> String {
    let rule = "=".repeat(BANNER_RULE_WIDTH);
    format!("\n{rule}\nPAGE {index} - ERROR\n{rule}\n\n")
}

pub struct OcrProcessor<R, E> {
    rasterizer: R,
    engine: E,
}

impl<R: Rasterizer, E: OcrEngine> OcrProcessor<R, E> {
    pub fn new(rasterizer: R, engine: E) -> Self {
        Self { rasterizer, engine }
    }

    /// Rasterize the document and recognize every page in order.
    ///
    /// A failure to rasterize, or an engine that cannot be launched at all,
    /// aborts with an error and no text. A page whose recognition fails gets
    /// an error banner and the remaining pages are still processed.
    pub async fn extract_text(&self, pdf_bytes: &[u8], settings: &OcrSettings) -> Result<ExtractedDocument, OcrError> {
        let images = self.rasterizer.rasterize(pdf_bytes, settings.dpi).await.map_err(|e| {
            error!("Document rasterization failed: {}", e);
            e
        })?;

        let config = settings.engine_config();
        let page_count = images.len();
        let mut text = String::new();
        let mut pages = Vec::with_capacity(page_count);

        for (idx, image) in images.into_iter().enumerate() {
            let index = idx + 1;
            let image = preprocess_image(image, settings.enhance, settings.denoise);

            match self.engine.recognize(&image, &settings.language, &config).await {
                Ok(page_text) => {
                    let trimmed = page_text.trim();
                    text.push_str(&page_banner(index));
                    text.push_str(trimmed);
                    text.push_str("\n\n");
                    pages.push(PageOutcome {
                        index,
                        text: trimmed.to_string(),
                        error: None,
                    });
                }
                Err(e @ OcrError::ToolUnavailable { .. }) => {
                    error!("OCR engine unavailable: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("OCR failed for page {}: {}", index, e);
                    text.push_str(&error_banner(index));
                    pages.push(PageOutcome {
                        index,
                        text: String::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!("Recognized {} pages", page_count);
        Ok(ExtractedDocument { text, page_count, pages })
    }
}

impl OcrProcessor<crate::pdf::PdftoppmRasterizer, TesseractEngine> {
    /// Check that both native tools can be launched
    pub async fn check_ocr_availability(&self) -> bool {
        let tesseract_available = self.engine.is_available().await;
        let pdftoppm_available = self.rasterizer.is_available().await;
        tesseract_available && pdftoppm_available
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use image::GrayImage;
    use std::sync::Mutex;

    /// Produces `pages` blank images whose width encodes their 1-based page
    /// number. Documents starting with `broken` fail to rasterize.
    pub struct FakeRasterizer {
        pub pages: usize,
        pub fail: bool,
    }

    impl Rasterizer for FakeRasterizer {
        async fn rasterize(&self, pdf_bytes: &[u8], _dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
            if self.fail || pdf_bytes.starts_with(b"broken") {
                return Err(OcrError::Rasterize("malformed PDF".to_string()));
            }
            Ok((1..=self.pages as u32)
                .map(|n| DynamicImage::ImageLuma8(GrayImage::new(n, 1)))
                .collect())
        }
    }

    /// Returns `  text of page N  ` and fails for the listed pages.
    #[derive(Default)]
    pub struct FakeEngine {
        pub failing_pages: Vec<u32>,
        pub missing: bool,
        pub calls: Mutex<Vec<(u32, String, String)>>,
    }

    impl OcrEngine for FakeEngine {
        async fn recognize(&self, image: &DynamicImage, language: &str, config: &str) -> Result<String, OcrError> {
            let page = image.width();
            self.calls
                .lock()
                .unwrap()
                .push((page, language.to_string(), config.to_string()));
            if self.missing {
                return Err(OcrError::ToolUnavailable {
                    tool: "fake".to_string(),
                    message: "not installed".to_string(),
                });
            }
            if self.failing_pages.contains(&page) {
                return Err(OcrError::Recognition(format!("engine crashed on page {}", page)));
            }
            Ok(format!("  text of page {}  \n", page))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeEngine, FakeRasterizer};
    use super::*;

    #[test]
    fn test_engine_config_string() {
        let settings = OcrSettings { psm: 11, ..OcrSettings::default() };
        assert_eq!(settings.engine_config(), "--oem 3 --psm 11");
    }

    #[test]
    fn test_banner_format() {
        let rule = "=".repeat(60);
        assert_eq!(page_banner(2), format!("\n{rule}\nPAGE 2\n{rule}\n\n"));
        assert_eq!(error_banner(2), format!("\n{rule}\nPAGE 2 - ERROR\n{rule}\n\n"));
    }

    #[tokio::test]
    async fn test_rasterization_failure_aborts_document() {
        let processor = OcrProcessor::new(FakeRasterizer { pages: 3, fail: true }, FakeEngine::default());
        let result = processor.extract_text(b"junk", &OcrSettings::default()).await;
        assert!(matches!(result, Err(OcrError::Rasterize(_))));
    }

    #[tokio::test]
    async fn test_page_failure_is_isolated() {
        let engine = FakeEngine {
            failing_pages: vec![2],
            ..FakeEngine::default()
        };
        let processor = OcrProcessor::new(FakeRasterizer { pages: 3, fail: false }, engine);

        let doc = processor.extract_text(b"pdf", &OcrSettings::default()).await.unwrap();

        assert_eq!(doc.page_count, 3);
        let expected = format!(
            "{}text of page 1\n\n{}{}text of page 3\n\n",
            page_banner(1),
            error_banner(2),
            page_banner(3)
        );
        assert_eq!(doc.text, expected);
        assert!(!doc.text.contains("PAGE 1 - ERROR"));
        assert!(!doc.text.contains("PAGE 3 - ERROR"));

        let failed: Vec<usize> = doc.failed_pages().map(|p| p.index).collect();
        assert_eq!(failed, vec![2]);
        assert_eq!(doc.pages[0].text, "text of page 1");
    }

    #[tokio::test]
    async fn test_missing_engine_aborts_document() {
        let engine = FakeEngine {
            missing: true,
            ..FakeEngine::default()
        };
        let processor = OcrProcessor::new(FakeRasterizer { pages: 3, fail: false }, engine);

        let result = processor.extract_text(b"pdf", &OcrSettings::default()).await;

        assert!(matches!(result, Err(OcrError::ToolUnavailable { .. })));
        assert_eq!(processor.engine.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_receives_language_and_config_in_page_order() {
        let processor = OcrProcessor::new(FakeRasterizer { pages: 2, fail: false }, FakeEngine::default());
        let settings = OcrSettings {
            language: "deu".to_string(),
            psm: 6,
            ..OcrSettings::default()
        };

        processor.extract_text(b"pdf", &settings).await.unwrap();

        let calls = processor.engine.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                (1, "deu".to_string(), "--oem 3 --psm 6".to_string()),
                (2, "deu".to_string(), "--oem 3 --psm 6".to_string()),
            ]
        );
    }
}
