use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::{info, warn};
use std::path::{Path, PathBuf};

use pdf_ocr_desk::cli::{init_logging, Args, Command};
use pdf_ocr_desk::database::Database;
use pdf_ocr_desk::detect::EntityKind;
use pdf_ocr_desk::export::{self, ExportFormat};
use pdf_ocr_desk::extractor::PdfExtractor;
use pdf_ocr_desk::ocr::{OcrProcessor, TesseractEngine};
use pdf_ocr_desk::pdf::PdftoppmRasterizer;
use pdf_ocr_desk::progress::ProgressTracker;
use pdf_ocr_desk::session::Session;

const MAX_SHOWN_MATCHES: usize = 10;
const MATCH_PREVIEW_CHARS: usize = 100;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("PDF OCR starting...");
    info!("Database: {}", args.database.display());

    // The history is optional: extraction still works without it.
    let db = if args.no_save {
        None
    } else {
        match open_database(&args.database).await {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("History unavailable, results will not be saved: {:#}", e);
                None
            }
        }
    };

    let ocr = OcrProcessor::new(
        PdftoppmRasterizer::new(&args.ocr.pdftoppm),
        TesseractEngine::new(&args.ocr.tesseract),
    );
    if !ocr.check_ocr_availability().await {
        warn!("OCR tools not available - extraction will fail");
    }

    let extractor = PdfExtractor::new(ocr, args.ocr.settings(), !args.no_save);

    match args.command {
        Command::Extract {
            file,
            no_detect,
            search,
            case_sensitive,
            out_dir,
            formats,
        } => {
            let mut session = Session::new();
            run_extract(&extractor, &mut session, db.as_ref(), &file, !no_detect).await?;

            if let Some(query) = search {
                print_search(&session, &query, case_sensitive);
            }

            if !formats.is_empty() {
                let dir = out_dir.unwrap_or_else(|| PathBuf::from("."));
                write_exports(&session, &dir, formats.into_iter().map(ExportFormat::from));
            }
        }

        Command::Batch { inputs, zip } => {
            let mut files = Vec::new();
            for input in &inputs {
                if input.is_dir() {
                    files.extend(extractor.find_pdf_files(input)?);
                } else {
                    files.push(input.clone());
                }
            }

            if files.is_empty() {
                warn!("No PDF files found");
                return Ok(());
            }
            info!("Found {} PDF files", files.len());

            let progress = ProgressTracker::new(files.len());
            let report = extractor.process_batch(&files, db.as_ref(), &progress).await;

            println!("\nBatch complete!");
            println!("Total:   {}", report.total());
            println!("Success: {}", report.results.len());
            println!("Errors:  {}", report.errors.len());
            println!("Time:    {:.1}s", report.total_time);

            if !report.errors.is_empty() {
                println!("\nErrors:");
                for (name, message) in &report.errors {
                    println!("  {}: {}", name, message);
                }
            }

            for item in &report.results {
                println!("{} - {} pages, {} words", item.name, item.pages, item.words);
            }

            if let Some(zip_path) = zip {
                match report.to_zip() {
                    Ok(bytes) => {
                        std::fs::write(&zip_path, bytes)
                            .with_context(|| format!("Failed to write {}", zip_path.display()))?;
                        println!("Texts bundled into: {}", zip_path.display());
                    }
                    Err(e) => eprintln!("ZIP export failed: {}", e),
                }
            }
        }
    }

    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    let db = Database::new(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    db.init_schema().await.context("Failed to initialize schema")?;
    Ok(db)
}

async fn run_extract(
    extractor: &PdfExtractor<PdftoppmRasterizer, TesseractEngine>,
    session: &mut Session,
    db: Option<&Database>,
    file: &Path,
    detect: bool,
) -> Result<()> {
    let pdf_bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let outcome = extractor
        .extract_single(session, &filename, &pdf_bytes, db)
        .await
        .with_context(|| format!("Extraction failed for {}", filename))?;

    let meta = &outcome.metadata;
    println!("\nExtraction complete!");
    println!("Pages:   {}", meta.page_count);
    println!("Words:   {}", meta.word_count);
    println!("Time:    {:.1}s", meta.processing_time);
    println!("Quality: {:.0}%", meta.quality_score);
    if !outcome.failed_pages.is_empty() {
        println!("Failed pages: {:?}", outcome.failed_pages);
    }
    if let Some(id) = outcome.saved_id {
        println!("Saved to history as #{}", id);
    }

    let Some(current) = session.current() else {
        return Ok(());
    };

    if detect {
        let detection = current.detect();
        if detection.is_empty() {
            println!("\nNo structured data detected");
        }
        if !detection.formats.is_empty() {
            let labels: Vec<String> = detection.formats.iter().map(|f| f.to_string()).collect();
            println!("\nDetected: {}", labels.join(" • "));
        }
        for kind in [EntityKind::Emails, EntityKind::Phones, EntityKind::Dates, EntityKind::Amounts] {
            if let Some(values) = detection.entities.get(&kind) {
                println!("{}: {}", kind.label(), values.join(", "));
            }
        }
    }

    println!("\n{}", current.text);
    Ok(())
}

fn print_search(session: &Session, query: &str, case_sensitive: bool) {
    let Some(current) = session.current() else {
        return;
    };

    let matches = current.search(query, case_sensitive);
    if matches.is_empty() {
        println!("No matches found");
        return;
    }

    println!("Found {} matches", matches.len());
    for m in matches.iter().take(MAX_SHOWN_MATCHES) {
        let preview: String = m.line.chars().take(MATCH_PREVIEW_CHARS).collect();
        println!("Line {}: {}", m.line_number, preview);
    }
}

fn write_exports(session: &Session, dir: &Path, formats: impl Iterator<Item = ExportFormat>) {
    let Some(current) = session.current() else {
        return;
    };
    let now = Local::now();

    for format in formats {
        let path = dir.join(export::default_file_name(format, now));
        let result = export::export(format, &current.text, &current.metadata)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(anyhow::Error::from));

        // an export failure never affects the extraction or the history
        match result {
            Ok(()) => println!("Exported {}", path.display()),
            Err(e) => eprintln!("{} export failed: {:#}", format.extension(), e),
        }
    }
}
