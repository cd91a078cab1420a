//! Heuristic confidence score for OCR output.
//!
//! The score starts at 100 and loses points for suspiciously short text, a
//! high share of symbols, and implausible word lengths. It says nothing about
//! ground-truth accuracy.

const MAX_SCORE: f64 = 100.0;

const MIN_TEXT_LENGTH: usize = 10;
const SHORT_TEXT_PENALTY: f64 = 50.0;

const MIN_CLEAN_RATIO: f64 = 0.7;
const NOISY_TEXT_PENALTY: f64 = 30.0;

const MIN_AVG_WORD_LENGTH: f64 = 2.0;
const MAX_AVG_WORD_LENGTH: f64 = 15.0;
const WORD_SHAPE_PENALTY: f64 = 20.0;

pub fn calculate_quality_score(text: &str) -> f64 {
    let mut score = MAX_SCORE;

    if text.trim().chars().count() < MIN_TEXT_LENGTH {
        score -= SHORT_TEXT_PENALTY;
    }

    let total = text.chars().count().max(1);
    let clean = text.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).count();
    if (clean as f64 / total as f64) < MIN_CLEAN_RATIO {
        score -= NOISY_TEXT_PENALTY;
    }

    let (words, letters) = text
        .split_whitespace()
        .fold((0usize, 0usize), |(n, len), w| (n + 1, len + w.chars().count()));
    if words > 0 {
        let avg = letters as f64 / words as f64;
        if !(MIN_AVG_WORD_LENGTH..=MAX_AVG_WORD_LENGTH).contains(&avg) {
            score -= WORD_SHAPE_PENALTY;
        }
    }

    score.clamp(0.0, MAX_SCORE)
}
