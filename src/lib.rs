//! PDF OCR pipeline: rasterize, preprocess, recognize, score, detect,
//! search, persist and export.

pub mod analytics;
pub mod cli;
pub mod database;
pub mod detect;
pub mod error;
pub mod export;
pub mod extractor;
pub mod ocr;
pub mod pdf;
pub mod preprocess;
pub mod progress;
pub mod quality;
pub mod search;
pub mod session;

pub use database::{Confirmation, Database, ExtractionRecord, NewExtraction};
pub use error::{ExportError, OcrError, StoreError};
pub use ocr::{ExtractedDocument, OcrEngine, OcrSettings, PageOutcome, TesseractEngine};
pub use pdf::{PdftoppmRasterizer, Rasterizer};
pub use session::{ExtractionMetadata, Session};
