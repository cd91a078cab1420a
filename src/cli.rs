use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::export::ExportFormat;
use crate::ocr::{OcrSettings, SUPPORTED_LANGUAGES, SUPPORTED_PSM};

#[derive(Parser, Debug, Clone)]
#[command(name = "pdf-ocr")]
#[command(about = "Extract text from scanned PDFs with Tesseract")]
#[command(version)]
pub struct Args {
    /// SQLite history database
    #[arg(short, long, default_value = "ocr_history.db", global = true)]
    pub database: PathBuf,

    /// Do not record extractions in the history
    #[arg(long, global = true)]
    pub no_save: bool,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub ocr: OcrArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct OcrArgs {
    /// OCR language
    #[arg(short, long, default_value = "eng", value_parser = SUPPORTED_LANGUAGES, global = true)]
    pub lang: String,

    /// Rasterization resolution
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u32).range(100..=400), global = true)]
    pub dpi: u32,

    /// Page segmentation mode: 3 fully automatic, 6 uniform block, 11 sparse text
    #[arg(long, default_value_t = 3, value_parser = parse_psm, global = true)]
    pub psm: u8,

    /// Skip grayscale/contrast/sharpen preprocessing
    #[arg(long, global = true)]
    pub no_enhance: bool,

    /// Skip the median noise filter
    #[arg(long, global = true)]
    pub no_denoise: bool,

    /// tesseract executable
    #[arg(long, default_value = "tesseract", global = true)]
    pub tesseract: PathBuf,

    /// pdftoppm executable
    #[arg(long, default_value = "pdftoppm", global = true)]
    pub pdftoppm: PathBuf,
}

impl OcrArgs {
    pub fn settings(&self) -> OcrSettings {
        OcrSettings {
            language: self.lang.clone(),
            dpi: self.dpi,
            psm: self.psm,
            enhance: !self.no_enhance,
            denoise: !self.no_denoise,
        }
    }
}

/// Initialize `env_logger`; `RUST_LOG` still wins over the default level.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn parse_psm(value: &str) -> Result<u8, String> {
    let psm: u8 = value.parse().map_err(|_| format!("'{}' is not a number", value))?;
    if SUPPORTED_PSM.contains(&psm) {
        Ok(psm)
    } else {
        Err(format!("page segmentation mode must be one of {:?}", SUPPORTED_PSM))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract a single PDF
    Extract {
        /// PDF file
        file: PathBuf,

        /// Skip table/invoice/form and entity detection
        #[arg(long)]
        no_detect: bool,

        /// Search the extracted text for this literal string
        #[arg(short, long)]
        search: Option<String>,

        /// Make the search case sensitive
        #[arg(long, requires = "search")]
        case_sensitive: bool,

        /// Write exports to this directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Export formats to write (repeatable)
        #[arg(short, long = "format", value_enum)]
        formats: Vec<FormatArg>,
    },

    /// Extract every PDF in the given files or directories, one after another
    Batch {
        /// PDF files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Write a ZIP with one text file per document
        #[arg(long)]
        zip: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Txt,
    Json,
    Docx,
    Xlsx,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Txt => ExportFormat::Text,
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Docx => ExportFormat::Docx,
            FormatArg::Xlsx => ExportFormat::Xlsx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_settings_defaults() {
        let args = Args::try_parse_from(["pdf-ocr", "extract", "scan.pdf"]).unwrap();
        assert_eq!(args.ocr.settings(), OcrSettings::default());
        assert_eq!(args.database, PathBuf::from("ocr_history.db"));
    }

    #[test]
    fn test_settings_flags() {
        let args = Args::try_parse_from([
            "pdf-ocr", "extract", "scan.pdf", "--lang", "deu", "--dpi", "150", "--psm", "11", "--no-denoise",
        ])
        .unwrap();
        let settings = args.ocr.settings();
        assert_eq!(settings.language, "deu");
        assert_eq!(settings.dpi, 150);
        assert_eq!(settings.psm, 11);
        assert!(settings.enhance);
        assert!(!settings.denoise);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(Args::try_parse_from(["pdf-ocr", "extract", "a.pdf", "--psm", "4"]).is_err());
        assert!(Args::try_parse_from(["pdf-ocr", "extract", "a.pdf", "--dpi", "50"]).is_err());
        assert!(Args::try_parse_from(["pdf-ocr", "extract", "a.pdf", "--lang", "xx"]).is_err());
    }

    #[test]
    fn test_extract_formats() {
        let args = Args::try_parse_from(["pdf-ocr", "extract", "a.pdf", "-f", "json", "-f", "docx", "-o", "out"]).unwrap();
        match args.command {
            Command::Extract { formats, out_dir, .. } => {
                assert_eq!(formats, vec![FormatArg::Json, FormatArg::Docx]);
                assert_eq!(out_dir, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
