use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use log::info;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::quality::calculate_quality_score;

const RECORD_COLUMNS: &str = "id, filename, timestamp, page_count, word_count, character_count, \
                              language, extracted_text, processing_time, quality_score";

/// A document ready to be written to the history.
///
/// Word count, character count and quality score are always derived from
/// `extracted_text` when the record is saved.
#[derive(Debug, Clone)]
pub struct NewExtraction {
    pub filename: String,
    pub page_count: usize,
    pub language: String,
    pub extracted_text: String,
    pub processing_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub id: i64,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub page_count: usize,
    pub word_count: usize,
    pub character_count: usize,
    pub language: String,
    pub extracted_text: String,
    pub processing_time: f64,
    pub quality_score: f64,
}

/// Explicit answer to "really delete everything?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

impl From<bool> for Confirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Self::Confirmed
        } else {
            Self::Declined
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoryStats {
    pub total_extractions: i64,
    pub total_pages: i64,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn character_count(text: &str) -> usize {
    text.chars().count()
}

/// Append-only history of extractions. Records are never updated in place.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub async fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=memory;",
        )?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Database {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS extractions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                page_count INTEGER,
                word_count INTEGER,
                character_count INTEGER,
                language TEXT,
                extracted_text TEXT,
                processing_time REAL,
                quality_score REAL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_extractions_timestamp ON extractions(timestamp)",
            [],
        )?;

        info!("Database schema initialized");
        Ok(())
    }

    /// Persist a new record and return its identifier.
    pub async fn save(&self, extraction: &NewExtraction) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        conn.execute(
            r#"
            INSERT INTO extractions
            (filename, timestamp, page_count, word_count, character_count,
             language, extracted_text, processing_time, quality_score)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                extraction.filename,
                timestamp,
                extraction.page_count,
                word_count(&extraction.extracted_text),
                character_count(&extraction.extracted_text),
                extraction.language,
                extraction.extracted_text,
                extraction.processing_time.max(0.0),
                calculate_quality_score(&extraction.extracted_text),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// All records, newest first.
    pub async fn list_all(&self) -> Result<Vec<ExtractionRecord>, StoreError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM extractions ORDER BY timestamp DESC, id DESC",
            RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    pub async fn get(&self, id: i64) -> Result<Option<ExtractionRecord>, StoreError> {
        let conn = self.conn.lock().await;

        let record = conn
            .query_row(
                &format!("SELECT {} FROM extractions WHERE id = ?1", RECORD_COLUMNS),
                params![id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Returns `false` when no record had that id.
    pub async fn delete_one(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM extractions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Wipe the whole history. Refuses to run without confirmation.
    pub async fn delete_all(&self, confirmation: Confirmation) -> Result<usize, StoreError> {
        if confirmation != Confirmation::Confirmed {
            return Err(StoreError::NotConfirmed);
        }

        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM extractions", [])?;
        info!("Cleared {} history records", deleted);
        Ok(deleted)
    }

    pub async fn get_stats(&self) -> Result<HistoryStats, StoreError> {
        let conn = self.conn.lock().await;

        let (total_extractions, total_pages) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(page_count), 0) FROM extractions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(HistoryStats {
            total_extractions,
            total_pages,
        })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ExtractionRecord> {
    let raw_timestamp: String = row.get(2)?;
    let timestamp = parse_timestamp(&raw_timestamp).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("invalid timestamp {:?}", raw_timestamp).into(),
        )
    })?;

    Ok(ExtractionRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        timestamp,
        page_count: row.get::<_, Option<usize>>(3)?.unwrap_or(0),
        word_count: row.get::<_, Option<usize>>(4)?.unwrap_or(0),
        character_count: row.get::<_, Option<usize>>(5)?.unwrap_or(0),
        language: row.get::<_, Option<String>>(6)?.unwrap_or_else(|| "eng".to_string()),
        extracted_text: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        processing_time: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
        quality_score: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0).clamp(0.0, 100.0),
    })
}

/// Accepts RFC 3339 as well as naive `YYYY-MM-DDTHH:MM:SS[.ffffff]`, read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
