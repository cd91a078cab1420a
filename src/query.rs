use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use pdf_ocr_desk::analytics::{self, AnalyticsReport, Bucket};
use pdf_ocr_desk::cli::{init_logging, FormatArg};
use pdf_ocr_desk::database::{Confirmation, Database};
use pdf_ocr_desk::export::{self, ExportFormat};
use pdf_ocr_desk::session::ExtractionMetadata;

#[derive(Parser, Debug)]
#[command(name = "ocr-history")]
#[command(about = "Browse, export and manage the OCR extraction history")]
pub struct QueryArgs {
    /// SQLite database file
    #[arg(short, long, default_value = "ocr_history.db")]
    pub database: PathBuf,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: QueryCommand,
}

#[derive(Parser, Debug)]
pub enum QueryCommand {
    /// List every extraction, newest first
    List,

    /// Show one extraction with its full text
    Show { id: i64 },

    /// Delete one extraction
    Delete { id: i64 },

    /// Delete the whole history
    Clear {
        /// Confirm deleting every record
        #[arg(long)]
        yes: bool,
    },

    /// Show extraction totals
    Stats,

    /// Show the analytics report
    Analytics,

    /// Export the history summary as CSV
    ExportCsv { output: PathBuf },

    /// Export the history summary as an XLSX workbook
    ExportXlsx { output: PathBuf },

    /// Export one stored extraction
    Export {
        id: i64,

        #[arg(short, long, value_enum, default_value = "txt")]
        format: FormatArg,

        /// Output file (defaults to a timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run_query(args: QueryArgs) -> Result<()> {
    let db = Database::new(&args.database).await?;
    db.init_schema().await?;

    match args.command {
        QueryCommand::List => {
            let records = db.list_all().await?;
            if records.is_empty() {
                println!("No extraction history yet");
                return Ok(());
            }

            let pages: usize = records.iter().map(|r| r.page_count).sum();
            let words: usize = records.iter().map(|r| r.word_count).sum();
            println!("Documents: {}   Pages: {}   Words: {}", records.len(), pages, words);
            println!("{}", "=".repeat(90));
            println!(
                "{:>5}  {:<32} {:<17} {:>6} {:>8} {:<8} {:>8}",
                "ID", "File", "Date", "Pages", "Words", "Lang", "Quality"
            );
            println!("{}", "-".repeat(90));

            for record in &records {
                println!(
                    "{:>5}  {:<32} {:<17} {:>6} {:>8} {:<8} {:>7.0}%",
                    record.id,
                    truncate(&record.filename, 32),
                    record.timestamp.format("%Y-%m-%d %H:%M"),
                    record.page_count,
                    record.word_count,
                    record.language,
                    record.quality_score
                );
            }
        }

        QueryCommand::Show { id } => {
            let Some(record) = db.get(id).await? else {
                bail!("No extraction with id {}", id);
            };

            println!("{}", record.filename);
            println!("{}", "=".repeat(60));
            println!("Date:       {}", record.timestamp.format("%Y-%m-%d %H:%M:%S"));
            println!("Pages:      {}", record.page_count);
            println!("Words:      {}", record.word_count);
            println!("Characters: {}", record.character_count);
            println!("Language:   {}", record.language);
            println!("Time:       {:.1}s", record.processing_time);
            println!("Quality:    {:.0}%", record.quality_score);
            println!("{}", "-".repeat(60));
            println!("{}", record.extracted_text);
        }

        QueryCommand::Delete { id } => {
            if db.delete_one(id).await? {
                println!("Deleted extraction #{}", id);
            } else {
                println!("No extraction with id {}", id);
            }
        }

        QueryCommand::Clear { yes } => {
            if !yes {
                println!("This deletes the whole history. Re-run with --yes to confirm.");
                return Ok(());
            }
            let removed = db.delete_all(Confirmation::from(yes)).await?;
            println!("Cleared {} extractions", removed);
        }

        QueryCommand::Stats => {
            let stats = db.get_stats().await?;

            println!("OCR Extraction History Statistics");
            println!("{}", "=".repeat(40));
            println!("Total documents: {}", stats.total_extractions);
            println!("Total pages:     {}", stats.total_pages);
        }

        QueryCommand::Analytics => {
            let records = db.list_all().await?;
            match analytics::analyze_history(&records) {
                Some(report) => print_report(&report),
                None => println!("No extraction history yet"),
            }
        }

        QueryCommand::ExportCsv { output } => {
            let records = db.list_all().await?;
            let bytes = export::history_to_csv(&records)?;
            std::fs::write(&output, bytes).with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Exported {} records to {}", records.len(), output.display());
        }

        QueryCommand::ExportXlsx { output } => {
            let records = db.list_all().await?;
            let bytes = export::history_to_xlsx(&records)?;
            std::fs::write(&output, bytes).with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Exported {} records to {}", records.len(), output.display());
        }

        QueryCommand::Export { id, format, output } => {
            let Some(record) = db.get(id).await? else {
                bail!("No extraction with id {}", id);
            };

            let format = ExportFormat::from(format);
            let metadata = ExtractionMetadata::from(&record);
            let bytes = export::export(format, &record.extracted_text, &metadata)?;
            let output =
                output.unwrap_or_else(|| PathBuf::from(export::default_file_name(format, chrono::Local::now())));
            std::fs::write(&output, bytes).with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Exported #{} to {}", id, output.display());
        }
    }

    Ok(())
}

fn print_report(report: &AnalyticsReport) {
    println!("OCR Analytics");
    println!("{}", "=".repeat(60));
    println!("Documents:     {}", report.total_extractions);
    println!("Pages:         {}", report.total_pages);
    println!("Words:         {}", report.total_words);
    println!("Avg quality:   {:.1}%", report.avg_quality);

    println!("\nDaily activity");
    for (day, count) in &report.daily_activity {
        println!("  {}  {}", day, count);
    }

    println!("\nLanguages");
    for share in &report.languages {
        println!("  {:<8} {:>4}  ({:.1}%)", share.language, share.count, share.percent);
    }

    print_buckets("Pages per document", &report.page_distribution);
    print_buckets("Quality", &report.quality_distribution);

    println!("\nTop documents by words");
    for summary in &report.top_by_words {
        println!(
            "  #{:<5} {:<32} {:>8} words  {:>3.0}%",
            summary.id,
            truncate(&summary.filename, 32),
            summary.word_count,
            summary.quality_score
        );
    }

    let perf = &report.performance;
    println!("\nPerformance");
    println!("  Avg time per document: {:.2}s", perf.avg_time_per_doc);
    println!("  Total processing time: {:.2}s", perf.total_time);
    if let Some(per_page) = perf.time_per_page {
        println!("  Avg time per page:     {:.2}s", per_page);
    }

    println!("\nRecent activity");
    for summary in &report.recent {
        println!(
            "  {}  {} ({} pages)",
            summary.timestamp, summary.filename, summary.page_count
        );
    }
}

fn print_buckets(title: &str, buckets: &[Bucket]) {
    println!("\n{}", title);
    for bucket in buckets {
        println!("  {:<10} {}", bucket.label, bucket.count);
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut short: String = value.chars().take(max_chars - 3).collect();
        short.push_str("...");
        short
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = QueryArgs::parse();
    init_logging(args.verbose);
    run_query(args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag_is_global() {
        let args = QueryArgs::try_parse_from(["ocr-history", "stats", "--verbose"]).unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, QueryCommand::Stats));

        let quiet = QueryArgs::try_parse_from(["ocr-history", "list"]).unwrap();
        assert!(!quiet.verbose);
    }

    #[test]
    fn test_export_defaults_to_text() {
        let args = QueryArgs::try_parse_from(["ocr-history", "export", "4"]).unwrap();
        match args.command {
            QueryCommand::Export { id, format, output } => {
                assert_eq!(id, 4);
                assert_eq!(format, FormatArg::Txt);
                assert_eq!(output, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
