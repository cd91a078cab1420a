use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::database::ExtractionRecord;

const PAGE_BUCKETS: [(usize, usize); 6] = [(0, 5), (5, 10), (10, 20), (20, 50), (50, 100), (100, 1000)];

const QUALITY_BUCKETS: [(f64, f64, &str); 4] = [
    (0.0, 50.0, "Poor (0-50)"),
    (50.0, 70.0, "Fair (50-70)"),
    (70.0, 85.0, "Good (70-85)"),
    (85.0, 100.0, "Excellent (85-100)"),
];

const TOP_EXTRACTIONS: usize = 10;
const RECENT_ACTIVITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageShare {
    pub language: String,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performance {
    pub avg_time_per_doc: f64,
    pub total_time: f64,
    pub time_per_page: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub id: i64,
    pub filename: String,
    pub timestamp: String,
    pub page_count: usize,
    pub word_count: usize,
    pub quality_score: f64,
}

impl From<&ExtractionRecord> for RecordSummary {
    fn from(record: &ExtractionRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            timestamp: record.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            page_count: record.page_count,
            word_count: record.word_count,
            quality_score: record.quality_score,
        }
    }
}

/// Aggregate view over the whole extraction history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub total_extractions: usize,
    pub total_pages: usize,
    pub total_words: usize,
    pub avg_quality: f64,
    pub daily_activity: BTreeMap<NaiveDate, usize>,
    pub languages: Vec<LanguageShare>,
    pub page_distribution: Vec<Bucket>,
    pub quality_distribution: Vec<Bucket>,
    pub top_by_words: Vec<RecordSummary>,
    pub performance: Performance,
    pub recent: Vec<RecordSummary>,
}

/// Build the report. `records` is expected newest first, as returned by
/// `Database::list_all`.
pub fn analyze_history(records: &[ExtractionRecord]) -> Option<AnalyticsReport> {
    if records.is_empty() {
        return None;
    }

    let total_extractions = records.len();
    let total_pages: usize = records.iter().map(|r| r.page_count).sum();
    let total_words: usize = records.iter().map(|r| r.word_count).sum();
    let avg_quality = records.iter().map(|r| r.quality_score).sum::<f64>() / total_extractions as f64;

    let mut daily_activity = BTreeMap::new();
    for record in records {
        *daily_activity.entry(record.timestamp.date_naive()).or_insert(0) += 1;
    }

    let total_time: f64 = records.iter().map(|r| r.processing_time).sum();
    let performance = Performance {
        avg_time_per_doc: total_time / total_extractions as f64,
        total_time,
        time_per_page: (total_pages > 0).then(|| total_time / total_pages as f64),
    };

    let mut by_words: Vec<&ExtractionRecord> = records.iter().collect();
    // stable sort keeps newest first among equal counts
    by_words.sort_by(|a, b| b.word_count.cmp(&a.word_count));

    Some(AnalyticsReport {
        total_extractions,
        total_pages,
        total_words,
        avg_quality,
        daily_activity,
        languages: language_shares(records),
        page_distribution: page_distribution(records),
        quality_distribution: quality_distribution(records),
        top_by_words: by_words.into_iter().take(TOP_EXTRACTIONS).map(RecordSummary::from).collect(),
        performance,
        recent: records.iter().take(RECENT_ACTIVITY).map(RecordSummary::from).collect(),
    })
}

/// Most used first; ties broken alphabetically.
pub fn language_shares(records: &[ExtractionRecord]) -> Vec<LanguageShare> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.language.as_str()).or_insert(0) += 1;
    }

    let total = records.len().max(1) as f64;
    let mut shares: Vec<LanguageShare> = counts
        .into_iter()
        .map(|(language, count)| LanguageShare {
            language: language.to_string(),
            count,
            percent: count as f64 / total * 100.0,
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count));
    shares
}

/// Right-closed page-count intervals; documents outside every interval are not counted.
pub fn page_distribution(records: &[ExtractionRecord]) -> Vec<Bucket> {
    PAGE_BUCKETS
        .iter()
        .map(|&(low, high)| Bucket {
            label: format!("({}, {}]", low, high),
            count: records
                .iter()
                .filter(|r| r.page_count > low && r.page_count <= high)
                .count(),
        })
        .collect()
}

/// Right-closed score intervals; a score of exactly 0 falls in no bucket.
pub fn quality_distribution(records: &[ExtractionRecord]) -> Vec<Bucket> {
    QUALITY_BUCKETS
        .iter()
        .map(|&(low, high, label)| Bucket {
            label: label.to_string(),
            count: records
                .iter()
                .filter(|r| r.quality_score > low && r.quality_score <= high)
                .count(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: i64, day: u32, pages: usize, words: usize, language: &str, quality: f64) -> ExtractionRecord {
        ExtractionRecord {
            id,
            filename: format!("doc{}.pdf", id),
            timestamp: Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap(),
            page_count: pages,
            word_count: words,
            character_count: words * 5,
            language: language.to_string(),
            extracted_text: String::new(),
            processing_time: 2.0,
            quality_score: quality,
        }
    }

    fn sample() -> Vec<ExtractionRecord> {
        vec![
            record(4, 3, 12, 900, "eng", 100.0),
            record(3, 2, 1, 50, "fra", 50.0),
            record(2, 2, 7, 300, "eng", 80.0),
            record(1, 1, 0, 0, "eng", 0.0),
        ]
    }

    #[test]
    fn test_empty_history_has_no_report() {
        assert!(analyze_history(&[]).is_none());
    }

    #[test]
    fn test_totals_and_performance() {
        let report = analyze_history(&sample()).unwrap();
        assert_eq!(report.total_extractions, 4);
        assert_eq!(report.total_pages, 20);
        assert_eq!(report.total_words, 1250);
        assert_eq!(report.avg_quality, 57.5);

        let perf = report.performance;
        assert_eq!(perf.total_time, 8.0);
        assert_eq!(perf.avg_time_per_doc, 2.0);
        assert_eq!(perf.time_per_page, Some(0.4));
    }

    #[test]
    fn test_daily_activity() {
        let report = analyze_history(&sample()).unwrap();
        let counts: Vec<usize> = report.daily_activity.values().copied().collect();
        assert_eq!(counts, vec![1, 2, 1]);
    }

    #[test]
    fn test_language_shares() {
        let shares = language_shares(&sample());
        assert_eq!(shares[0].language, "eng");
        assert_eq!(shares[0].count, 3);
        assert_eq!(shares[0].percent, 75.0);
        assert_eq!(shares[1].language, "fra");
    }

    #[test]
    fn test_buckets_are_right_closed() {
        let pages: Vec<usize> = page_distribution(&sample()).iter().map(|b| b.count).collect();
        assert_eq!(pages, vec![1, 1, 1, 0, 0, 0]);

        let quality: Vec<usize> = quality_distribution(&sample()).iter().map(|b| b.count).collect();
        assert_eq!(quality, vec![1, 0, 1, 1]);
    }

    #[test]
    fn test_top_and_recent() {
        let report = analyze_history(&sample()).unwrap();
        let top: Vec<i64> = report.top_by_words.iter().map(|r| r.id).collect();
        assert_eq!(top, vec![4, 2, 3, 1]);
        assert_eq!(report.recent[0].id, 4);
        assert_eq!(report.recent[0].timestamp, "2024-06-03 12:00");
    }

    #[test]
    fn test_recent_activity_shows_latest_ten() {
        let records: Vec<ExtractionRecord> = (1..=12).rev().map(|id| record(id, 1, 1, 10, "eng", 90.0)).collect();
        let report = analyze_history(&records).unwrap();

        let recent: Vec<i64> = report.recent.iter().map(|r| r.id).collect();
        assert_eq!(recent, (3..=12).rev().collect::<Vec<i64>>());
    }
}
