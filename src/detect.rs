//! Regex heuristics that guess a document's shape and pull out common
//! entities. They are intentionally loose and will both miss and overmatch.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const MIN_TABLE_ROWS: usize = 3;
const MIN_TABLE_TOKENS: usize = 3;
const MIN_FORM_FIELDS: usize = 3;

static INVOICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)invoice\s*#?\s*:?\s*(\w+)", r"(?i)total\s*:?\s*\$", r"(?i)amount\s*due"]
        .iter()
        .map(|p| Regex::new(p).expect("Invoice regex pattern is valid and should compile"))
        .collect()
});
static FORM_FIELD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Z][a-zA-Z\s]+):\s*[_\s]{2,}").expect("Form field regex pattern is valid and should compile")
});

static DIGIT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d").expect("Digit regex pattern is valid and should compile"));

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b")
        .expect("Email regex pattern is valid and should compile")
});
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("Phone regex pattern is valid and should compile"));
static DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}[-/]\d{1,2}[-/]\d{2,4}").expect("Date regex pattern is valid and should compile"));
static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\s*(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)").expect("Amount regex pattern is valid and should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentFormat {
    Table { rows: usize },
    Invoice,
    Form { fields: usize },
}

impl DocumentFormat {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Table { .. } => "table",
            Self::Invoice => "invoice",
            Self::Form { .. } => "form",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table { rows } => write!(f, "Table ({} rows)", rows),
            Self::Invoice => write!(f, "Invoice"),
            Self::Form { fields } => write!(f, "Form ({} fields)", fields),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Emails,
    Phones,
    Dates,
    Amounts,
}

impl EntityKind {
    /// Maximum number of matches kept for this category.
    pub fn cap(&self) -> usize {
        match self {
            Self::Amounts => 5,
            _ => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Emails => "Emails",
            Self::Phones => "Phones",
            Self::Dates => "Dates",
            Self::Amounts => "Amounts",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub formats: Vec<DocumentFormat>,
    pub entities: BTreeMap<EntityKind, Vec<String>>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty() && self.entities.is_empty()
    }

    pub fn has_format(&self, tag: &str) -> bool {
        self.formats.iter().any(|f| f.tag() == tag)
    }
}

pub fn analyze(text: &str) -> DetectionResult {
    DetectionResult {
        formats: detect_document_format(text),
        entities: extract_key_data(text),
    }
}

pub fn detect_document_format(text: &str) -> Vec<DocumentFormat> {
    let mut formats = Vec::new();

    let table_rows = text
        .split('\n')
        .filter(|line| line.split_whitespace().count() >= MIN_TABLE_TOKENS && DIGIT_PATTERN.is_match(line))
        .count();
    if table_rows >= MIN_TABLE_ROWS {
        formats.push(DocumentFormat::Table { rows: table_rows });
    }

    if INVOICE_PATTERNS.iter().any(|re| re.is_match(text)) {
        formats.push(DocumentFormat::Invoice);
    }

    let form_fields = FORM_FIELD_PATTERN.find_iter(text).count();
    if form_fields >= MIN_FORM_FIELDS {
        formats.push(DocumentFormat::Form { fields: form_fields });
    }

    formats
}

pub fn extract_key_data(text: &str) -> BTreeMap<EntityKind, Vec<String>> {
    let mut data = BTreeMap::new();

    let whole = |re: &Regex, kind: EntityKind| -> Vec<String> {
        re.find_iter(text).take(kind.cap()).map(|m| m.as_str().to_string()).collect()
    };

    let found = [
        (EntityKind::Emails, whole(&EMAIL_PATTERN, EntityKind::Emails)),
        (EntityKind::Phones, whole(&PHONE_PATTERN, EntityKind::Phones)),
        (EntityKind::Dates, whole(&DATE_PATTERN, EntityKind::Dates)),
        (
            EntityKind::Amounts,
            AMOUNT_PATTERN
                .captures_iter(text)
                .take(EntityKind::Amounts.cap())
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect(),
        ),
    ];

    for (kind, values) in found {
        if !values.is_empty() {
            data.insert(kind, values);
        }
    }
    data
}
