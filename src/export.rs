//! Serializers for extracted text: plain text, JSON envelope, DOCX, XLSX,
//! history CSV and the batch ZIP bundle.
//!
//! Everything here returns bytes or strings; writing them somewhere is the
//! caller's business, so an export failure never touches stored data.

use chrono::{DateTime, Local};
use docx_rs::{BreakType, Docx, Paragraph, Run};
use rust_xlsxwriter::{Color, ColNum, Format, RowNum, Workbook, Worksheet, XlsxError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::database::ExtractionRecord;
use crate::error::ExportError;
use crate::session::ExtractionMetadata;

pub const ENVELOPE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
    Docx,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
        }
    }
}

/// `extract_20240131_235959.txt`
pub fn default_file_name(format: ExportFormat, at: DateTime<Local>) -> String {
    format!("extract_{}.{}", at.format("%Y%m%d_%H%M%S"), format.extension())
}

/// Render `text` in the requested format.
pub fn export(format: ExportFormat, text: &str, metadata: &ExtractionMetadata) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Text => Ok(text.as_bytes().to_vec()),
        ExportFormat::Json => Ok(to_json(text, metadata)?.into_bytes()),
        ExportFormat::Docx => to_docx(text, &metadata.filename, Some(metadata)),
        ExportFormat::Xlsx => to_xlsx(text),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonEnvelope {
    pub filename: String,
    pub extracted_text: String,
    pub extraction_date: String,
    pub metadata: ExtractionMetadata,
    pub version: String,
}

pub fn to_json(text: &str, metadata: &ExtractionMetadata) -> Result<String, ExportError> {
    let envelope = JsonEnvelope {
        filename: metadata.filename.clone(),
        extracted_text: text.to_string(),
        extraction_date: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        metadata: metadata.clone(),
        version: ENVELOPE_VERSION.to_string(),
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

pub fn from_json(json: &str) -> Result<JsonEnvelope, ExportError> {
    Ok(serde_json::from_str(json)?)
}

// ---------------------------------------------------------------------------
// DOCX

const TITLE_SIZE: usize = 56;
const HEADING_SIZE: usize = 32;

/// Word document with a title, a metadata block and one paragraph per
/// blank-line separated block of `text`.
pub fn to_docx(text: &str, filename: &str, metadata: Option<&ExtractionMetadata>) -> Result<Vec<u8>, ExportError> {
    let mut docx = Docx::new()
        .add_paragraph(docx_paragraph("OCR Extraction Results", Some(TITLE_SIZE)))
        .add_paragraph(docx_paragraph(&format!("Source: {}", filename), None))
        .add_paragraph(docx_paragraph(
            &format!("Date: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            None,
        ));

    if let Some(meta) = metadata {
        docx = docx
            .add_paragraph(docx_paragraph(&format!("Pages: {}", meta.page_count), None))
            .add_paragraph(docx_paragraph(&format!("Words: {}", meta.word_count), None))
            .add_paragraph(docx_paragraph(&format!("Quality: {:.1}%", meta.quality_score), None));
    }

    docx = docx
        .add_paragraph(Paragraph::new())
        .add_paragraph(docx_paragraph("Extracted Text", Some(HEADING_SIZE)));

    for block in text.split("\n\n") {
        let block = block.trim();
        if !block.is_empty() {
            docx = docx.add_paragraph(docx_paragraph(block, None));
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|e| ExportError::Docx(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// One paragraph, line breaks kept. `heading_size` (half-points) makes it a bold heading.
fn docx_paragraph(text: &str, heading_size: Option<usize>) -> Paragraph {
    let mut run = Run::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(printable(line));
    }
    if let Some(size) = heading_size {
        run = run.bold().size(size);
    }
    Paragraph::new().add_run(run)
}

/// OCR output can carry stray control characters that XML 1.0 rejects.
fn printable(line: &str) -> String {
    line.chars().filter(|c| !c.is_control() || *c == '\t').collect()
}

// ---------------------------------------------------------------------------
// XLSX

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(f64),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

/// Bold white on blue.
fn banner_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x4472C4))
}

/// Header row in `header_format`, then `rows` below it.
fn build_sheet(
    name: &str,
    column_widths: &[f64],
    header: &[&str],
    header_format: &Format,
    rows: &[Vec<Cell>],
) -> Result<Worksheet, XlsxError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(name)?;

    for (col, width) in column_widths.iter().enumerate() {
        sheet.set_column_width(col as ColNum, *width)?;
    }
    for (col, title) in header.iter().enumerate() {
        sheet.write_string_with_format(0, col as ColNum, *title, header_format)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let row_num = (r + 1) as RowNum;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(s) => sheet.write_string(row_num, col as ColNum, s.as_str())?,
                Cell::Number(n) => sheet.write_number(row_num, col as ColNum, *n)?,
            };
        }
    }

    Ok(sheet)
}

/// Workbook with an "Extracted Text" sheet (one row per line) and a
/// "Statistics" sheet.
pub fn to_xlsx(text: &str) -> Result<Vec<u8>, ExportError> {
    let text_rows: Vec<Vec<Cell>> = text
        .split('\n')
        .enumerate()
        .map(|(i, line)| vec![(i + 1).into(), printable(line).into()])
        .collect();

    let stat_rows: Vec<Vec<Cell>> = text_statistics(text)
        .into_iter()
        .map(|(metric, value)| vec![metric.into(), value.into()])
        .collect();

    let mut workbook = Workbook::new();
    workbook.push_worksheet(build_sheet(
        "Extracted Text",
        &[10.0, 100.0],
        &["Line", "Content"],
        &banner_format(),
        &text_rows,
    )?);
    workbook.push_worksheet(build_sheet(
        "Statistics",
        &[25.0, 15.0],
        &["Metric", "Value"],
        &Format::new().set_bold(),
        &stat_rows,
    )?);

    Ok(workbook.save_to_buffer()?)
}

/// Line/word/character statistics shown next to the extracted text.
pub fn text_statistics(text: &str) -> Vec<(&'static str, usize)> {
    let lines: Vec<&str> = text.split('\n').collect();
    let characters = text.chars().count();
    vec![
        ("Total Lines", lines.len()),
        ("Total Words", text.split_whitespace().count()),
        ("Total Characters", characters),
        ("Non-empty Lines", lines.iter().filter(|l| !l.trim().is_empty()).count()),
        ("Average Line Length", characters / lines.len().max(1)),
    ]
}

// ---------------------------------------------------------------------------
// History

const HISTORY_HEADER: [&str; 8] = [
    "ID",
    "Filename",
    "Timestamp",
    "Pages",
    "Words",
    "Characters",
    "Language",
    "Quality",
];

/// One history summary row; field order follows `HISTORY_HEADER`.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct HistoryRow {
    #[serde(rename = "ID")]
    id: i64,
    #[serde(rename = "Filename")]
    filename: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Pages")]
    pages: usize,
    #[serde(rename = "Words")]
    words: usize,
    #[serde(rename = "Characters")]
    characters: usize,
    #[serde(rename = "Language")]
    language: String,
    #[serde(rename = "Quality")]
    quality: f64,
}

impl From<&ExtractionRecord> for HistoryRow {
    fn from(record: &ExtractionRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            timestamp: record.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            pages: record.page_count,
            words: record.word_count,
            characters: record.character_count,
            language: record.language.clone(),
            quality: record.quality_score,
        }
    }
}

impl HistoryRow {
    fn cells(self) -> Vec<Cell> {
        vec![
            self.id.into(),
            self.filename.into(),
            self.timestamp.into(),
            self.pages.into(),
            self.words.into(),
            self.characters.into(),
            self.language.into(),
            self.quality.into(),
        ]
    }
}

pub fn history_to_xlsx(records: &[ExtractionRecord]) -> Result<Vec<u8>, ExportError> {
    let rows: Vec<Vec<Cell>> = records.iter().map(|r| HistoryRow::from(r).cells()).collect();

    let mut workbook = Workbook::new();
    workbook.push_worksheet(build_sheet(
        "History",
        &[8.0, 40.0, 18.0, 8.0, 10.0, 12.0, 10.0, 10.0],
        &HISTORY_HEADER,
        &Format::new().set_bold(),
        &rows,
    )?);

    Ok(workbook.save_to_buffer()?)
}

pub fn history_to_csv(records: &[ExtractionRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record(HISTORY_HEADER)?;
    }
    for record in records {
        writer.serialize(HistoryRow::from(record))?;
    }
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

// ---------------------------------------------------------------------------
// Batch bundle

/// ZIP with one `<stem>.txt` per document. Repeated stems get a `_2`, `_3`, ... suffix.
pub fn batch_zip<'a>(documents: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Vec<u8>, ExportError> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let named: Vec<(String, &str)> = documents
        .into_iter()
        .map(|(name, text)| {
            let stem = file_stem(name).to_string();
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;
            let entry = if *count == 1 {
                format!("{}.txt", stem)
            } else {
                format!("{}_{}.txt", stem, count)
            };
            (entry, text)
        })
        .collect();
    let entries: Vec<(&str, &str)> = named.iter().map(|(n, t)| (n.as_str(), *t)).collect();
    write_zip(&entries)
}

/// `scans/report.final.pdf` -> `report.final`
fn file_stem(name: &str) -> &str {
    let name = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn write_zip(entries: &[(&str, &str)]) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Read;

    fn metadata() -> ExtractionMetadata {
        ExtractionMetadata {
            filename: "scan.pdf".to_string(),
            page_count: 3,
            word_count: 42,
            character_count: 256,
            language: "eng".to_string(),
            processing_time: 2.5,
            quality_score: 87.5,
        }
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    }

    fn record(id: i64, filename: &str) -> ExtractionRecord {
        ExtractionRecord {
            id,
            filename: filename.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
            page_count: 1,
            word_count: 2,
            character_count: 3,
            language: "eng".to_string(),
            extracted_text: String::new(),
            processing_time: 0.0,
            quality_score: 90.0,
        }
    }

    #[test]
    fn test_json_envelope_round_trip() {
        let text = "PAGE 1\n\nline with \"quotes\" and ünïcode\n";
        let json = to_json(text, &metadata()).unwrap();
        let parsed = from_json(&json).unwrap();

        assert_eq!(parsed.extracted_text, text);
        assert_eq!(parsed.filename, "scan.pdf");
        assert_eq!(parsed.metadata, metadata());
        assert_eq!(parsed.version, "1.0");
        assert!(!parsed.extraction_date.is_empty());
    }

    #[test]
    fn test_text_export_is_verbatim() {
        let bytes = export(ExportFormat::Text, "a\nb", &metadata()).unwrap();
        assert_eq!(bytes, b"a\nb");
    }

    #[test]
    fn test_default_file_name() {
        let at = Local.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap();
        assert_eq!(default_file_name(ExportFormat::Docx, at), "extract_20240131_235958.docx");
    }

    #[test]
    fn test_docx_contains_metadata_and_paragraphs() {
        let bytes = to_docx(
            "First\x0cblock\n\n  \n\nSecond <block> & more",
            "scan.pdf",
            Some(&metadata()),
        )
        .unwrap();
        let document = read_entry(&bytes, "word/document.xml");

        assert!(document.contains("OCR Extraction Results"));
        assert!(document.contains("Source: scan.pdf"));
        assert!(document.contains("Pages: 3"));
        assert!(document.contains("Quality: 87.5%"));
        assert!(document.contains("Firstblock"));
        assert!(document.contains("Second &lt;block&gt;"));
    }

    #[test]
    fn test_docx_without_metadata_skips_metrics() {
        let bytes = to_docx("body", "scan.pdf", None).unwrap();
        let document = read_entry(&bytes, "word/document.xml");
        assert!(!document.contains("Pages:"));
        assert!(document.contains("body"));
    }

    #[test]
    fn test_xlsx_sheets() {
        let bytes = to_xlsx("alpha beta\n\ngamma").unwrap();

        let workbook = read_entry(&bytes, "xl/workbook.xml");
        assert!(workbook.contains(r#"name="Extracted Text""#));
        assert!(workbook.contains(r#"name="Statistics""#));

        let strings = read_entry(&bytes, "xl/sharedStrings.xml");
        assert!(strings.contains("gamma"));
        assert!(strings.contains("Non-empty Lines"));

        // header plus one row per line
        let lines = read_entry(&bytes, "xl/worksheets/sheet1.xml");
        assert!(lines.contains(r#"<row r="4""#));
        assert!(!lines.contains(r#"<row r="5""#));
    }

    #[test]
    fn test_history_xlsx_has_one_row_per_record() {
        let bytes = history_to_xlsx(&[record(1, "a.pdf"), record(2, "b.pdf")]).unwrap();

        assert!(read_entry(&bytes, "xl/workbook.xml").contains(r#"name="History""#));
        let strings = read_entry(&bytes, "xl/sharedStrings.xml");
        assert!(strings.contains("Filename"));
        assert!(strings.contains("b.pdf"));
        assert!(read_entry(&bytes, "xl/worksheets/sheet1.xml").contains(r#"<row r="3""#));
    }

    #[test]
    fn test_text_statistics() {
        let stats = text_statistics("alpha beta\n\ngamma");
        assert_eq!(
            stats,
            vec![
                ("Total Lines", 3),
                ("Total Words", 3),
                ("Total Characters", 17),
                ("Non-empty Lines", 2),
                ("Average Line Length", 5),
            ]
        );
    }

    #[test]
    fn test_history_csv_quotes_awkward_names() {
        let csv = String::from_utf8(history_to_csv(&[record(7, "a, \"b\".pdf")]).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("ID,Filename,Timestamp,Pages,Words,Characters,Language,Quality"));
        assert_eq!(lines.next(), Some("7,\"a, \"\"b\"\".pdf\",2024-05-06 07:08,1,2,3,eng,90.0"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_empty_history_csv_keeps_header() {
        let csv = String::from_utf8(history_to_csv(&[]).unwrap()).unwrap();
        assert_eq!(csv.trim_end(), "ID,Filename,Timestamp,Pages,Words,Characters,Language,Quality");
    }

    #[test]
    fn test_batch_zip_names_by_stem() {
        let bytes = batch_zip([("one.pdf", "first"), ("two.final.pdf", "second")]).unwrap();
        assert_eq!(read_entry(&bytes, "one.txt"), "first");
        assert_eq!(read_entry(&bytes, "two.final.txt"), "second");

        let dupes = batch_zip([("x/a.pdf", "1"), ("y/a.pdf", "2")]).unwrap();
        assert_eq!(read_entry(&dupes, "a.txt"), "1");
        assert_eq!(read_entry(&dupes, "a_2.txt"), "2");
    }
}
