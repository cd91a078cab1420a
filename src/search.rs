use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// 1-based
    pub line_number: usize,
    pub line: String,
}

/// Literal substring search, line by line.
pub fn search_in_text(text: &str, query: &str, case_sensitive: bool) -> Vec<SearchMatch> {
    if query.is_empty() {
        return Vec::new();
    }

    let needle = if case_sensitive { query.to_string() } else { query.to_lowercase() };

    text.split('\n')
        .enumerate()
        .filter(|(_, line)| {
            if case_sensitive {
                line.contains(&needle)
            } else {
                line.to_lowercase().contains(&needle)
            }
        })
        .map(|(i, line)| SearchMatch {
            line_number: i + 1,
            line: line.to_string(),
        })
        .collect()
}
