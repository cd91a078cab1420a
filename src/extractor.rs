use anyhow::Result;
use log::{error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::database::{Database, NewExtraction};
use crate::error::OcrError;
use crate::export::batch_zip;
use crate::ocr::{OcrEngine, OcrProcessor, OcrSettings};
use crate::pdf::Rasterizer;
use crate::progress::ProgressTracker;
use crate::session::{CurrentExtraction, ExtractionMetadata, Session};

/// What a single extraction produced besides the session update.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleOutcome {
    pub metadata: ExtractionMetadata,
    pub failed_pages: Vec<usize>,
    /// `None` when saving was disabled or failed.
    pub saved_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub name: String,
    pub text: String,
    pub pages: usize,
    pub words: usize,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<BatchItem>,
    /// document name -> error message
    pub errors: BTreeMap<String, String>,
    pub total_time: f64,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    /// ZIP bundle with one text file per successful document.
    pub fn to_zip(&self) -> Result<Vec<u8>, crate::error::ExportError> {
        batch_zip(self.results.iter().map(|r| (r.name.as_str(), r.text.as_str())))
    }
}

pub struct PdfExtractor<R, E> {
    ocr: OcrProcessor<R, E>,
    settings: OcrSettings,
    save_to_db: bool,
}

impl<R: Rasterizer, E: OcrEngine> PdfExtractor<R, E> {
    pub fn new(ocr: OcrProcessor<R, E>, settings: OcrSettings, save_to_db: bool) -> Self {
        Self {
            ocr,
            settings,
            save_to_db,
        }
    }

    /// Find all PDF files in directory tree
    pub fn find_pdf_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut pdf_files = Vec::new();

        for entry in WalkDir::new(dir) {
            let entry = entry?;
            let path = entry.path();

            let is_pdf = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
            if path.is_file() && is_pdf {
                pdf_files.push(path.to_path_buf());
            }
        }

        pdf_files.sort();
        Ok(pdf_files)
    }

    /// Run OCR over one document and make it the session's current extraction.
    ///
    /// Only a document-level failure is returned as an error. Saving to the
    /// history is best effort.
    pub async fn extract_single(
        &self,
        session: &mut Session,
        filename: &str,
        pdf_bytes: &[u8],
        db: Option<&Database>,
    ) -> Result<SingleOutcome, OcrError> {
        let start_time = Instant::now();
        info!("Processing {}", filename);

        let document = self.ocr.extract_text(pdf_bytes, &self.settings).await?;
        let processing_time = start_time.elapsed().as_secs_f64();

        let metadata = ExtractionMetadata::from_text(
            filename,
            &document.text,
            document.page_count,
            &self.settings.language,
            processing_time,
        );
        let failed_pages = document.failed_pages().map(|p| p.index).collect();
        let current = CurrentExtraction::new(document.text, metadata.clone());

        let saved_id = match db {
            Some(db) if self.save_to_db => save_logged(db, &current.to_new_extraction()).await,
            _ => None,
        };

        session.set_current(current);

        Ok(SingleOutcome {
            metadata,
            failed_pages,
            saved_id,
        })
    }

    /// Process documents one after another. A failing document is recorded
    /// in the report's error map and the batch carries on.
    pub async fn process_batch(&self, files: &[PathBuf], db: Option<&Database>, progress: &ProgressTracker) -> BatchReport {
        let batch_start = Instant::now();
        let mut report = BatchReport::default();

        for (idx, (path, name)) in files.iter().zip(batch_names(files)).enumerate() {
            progress.start_item(idx + 1, &name);

            match self.process_batch_file(path, &name, db).await {
                Ok(item) => report.results.push(item),
                Err(e) => {
                    error!("Failed to process {}: {}", name, e);
                    report.errors.insert(name, e.to_string());
                }
            }

            progress.increment();
        }

        progress.finish();
        report.total_time = batch_start.elapsed().as_secs_f64();
        info!(
            "Batch complete: {} succeeded, {} failed",
            report.results.len(),
            report.errors.len()
        );
        report
    }

    async fn process_batch_file(&self, path: &Path, name: &str, db: Option<&Database>) -> Result<BatchItem> {
        let start_time = Instant::now();
        let pdf_bytes = tokio::fs::read(path).await?;
        let document = self.ocr.extract_text(&pdf_bytes, &self.settings).await?;

        if let Some(db) = db.filter(|_| self.save_to_db) {
            let extraction = NewExtraction {
                filename: display_name(path),
                page_count: document.page_count,
                language: self.settings.language.clone(),
                extracted_text: document.text.clone(),
                processing_time: start_time.elapsed().as_secs_f64(),
            };
            save_logged(db, &extraction).await;
        }

        Ok(BatchItem {
            name: name.to_string(),
            words: crate::database::word_count(&document.text),
            pages: document.page_count,
            text: document.text,
        })
    }
}

/// Save and swallow the error; the in-memory result stays usable either way.
async fn save_logged(db: &Database, extraction: &NewExtraction) -> Option<i64> {
    match db.save(extraction).await {
        Ok(id) => {
            info!("Saved {} to history as #{}", extraction.filename, id);
            Some(id)
        }
        Err(e) => {
            warn!("Database save failed for {}: {}", extraction.filename, e);
            None
        }
    }
}

/// File names, or the full path for every file whose name occurs more
/// than once in the batch.
fn batch_names(files: &[PathBuf]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for path in files {
        *counts.entry(display_name(path)).or_insert(0) += 1;
    }

    files
        .iter()
        .map(|path| {
            let name = display_name(path);
            if counts.get(&name).copied().unwrap_or(0) > 1 {
                path.display().to_string()
            } else {
                name
            }
        })
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
