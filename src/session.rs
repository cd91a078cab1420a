use serde::{Deserialize, Serialize};

use crate::database::{character_count, word_count, ExtractionRecord, NewExtraction};
use crate::detect::{analyze, DetectionResult};
use crate::quality::calculate_quality_score;
use crate::search::{search_in_text, SearchMatch};

/// Metrics describing one extraction, shared by the history and the exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub filename: String,
    pub page_count: usize,
    pub word_count: usize,
    pub character_count: usize,
    pub language: String,
    pub processing_time: f64,
    pub quality_score: f64,
}

impl ExtractionMetadata {
    pub fn from_text(filename: &str, text: &str, page_count: usize, language: &str, processing_time: f64) -> Self {
        Self {
            filename: filename.to_string(),
            page_count,
            word_count: word_count(text),
            character_count: character_count(text),
            language: language.to_string(),
            processing_time,
            quality_score: calculate_quality_score(text),
        }
    }
}

impl From<&ExtractionRecord> for ExtractionMetadata {
    fn from(record: &ExtractionRecord) -> Self {
        Self {
            filename: record.filename.clone(),
            page_count: record.page_count,
            word_count: record.word_count,
            character_count: record.character_count,
            language: record.language.clone(),
            processing_time: record.processing_time,
            quality_score: record.quality_score,
        }
    }
}

/// The extraction currently being looked at.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentExtraction {
    pub text: String,
    pub metadata: ExtractionMetadata,
}

impl CurrentExtraction {
    pub fn new(text: String, metadata: ExtractionMetadata) -> Self {
        Self { text, metadata }
    }

    pub fn detect(&self) -> DetectionResult {
        analyze(&self.text)
    }

    pub fn search(&self, query: &str, case_sensitive: bool) -> Vec<SearchMatch> {
        search_in_text(&self.text, query, case_sensitive)
    }

    pub fn to_new_extraction(&self) -> NewExtraction {
        NewExtraction {
            filename: self.metadata.filename.clone(),
            page_count: self.metadata.page_count,
            language: self.metadata.language.clone(),
            extracted_text: self.text.clone(),
            processing_time: self.metadata.processing_time,
        }
    }
}

/// State carried between user interactions.
#[derive(Debug, Default)]
pub struct Session {
    current: Option<CurrentExtraction>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&CurrentExtraction> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, extraction: CurrentExtraction) {
        self.current = Some(extraction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_text() {
        let meta = ExtractionMetadata::from_text("doc.pdf", "alpha beta\ngamma", 1, "fra", 0.5);
        assert_eq!(meta.word_count, 3);
        assert_eq!(meta.character_count, 16);
        assert_eq!(meta.language, "fra");
        assert!((0.0..=100.0).contains(&meta.quality_score));
    }

    #[test]
    fn test_new_extraction_carries_text_and_metadata() {
        let meta = ExtractionMetadata::from_text("doc.pdf", "one two", 2, "deu", 1.5);
        let current = CurrentExtraction::new("one two".to_string(), meta);

        let record = current.to_new_extraction();

        assert_eq!(record.filename, "doc.pdf");
        assert_eq!(record.page_count, 2);
        assert_eq!(record.language, "deu");
        assert_eq!(record.extracted_text, "one two");
        assert_eq!(record.processing_time, 1.5);
    }

    #[test]
    fn test_session_holds_current_extraction() {
        let mut session = Session::new();
        assert!(session.current().is_none());

        let meta = ExtractionMetadata::from_text("doc.pdf", "Hello\nworld", 1, "eng", 0.1);
        session.set_current(CurrentExtraction::new("Hello\nworld".to_string(), meta));
        let matches = session.current().unwrap().search("WORLD", false);
        assert_eq!(matches[0].line_number, 2);
    }
}
