use thiserror::Error;

/// Failures raised by the rasterizer or the OCR engine.
///
/// A `Rasterize` or `ToolUnavailable` error aborts the whole document; a
/// `Recognition` error only ever affects the page it was raised for.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("PDF rasterization failed: {0}")]
    Rasterize(String),

    #[error("{tool} is not available: {message}")]
    ToolUnavailable { tool: String, message: String },

    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("clearing the history requires explicit confirmation")]
    NotConfirmed,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive write failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("spreadsheet export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("document export failed: {0}")]
    Docx(String),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
