use indicatif::{ProgressBar, ProgressStyle};

/// Batch progress, advanced once per document.
pub struct ProgressTracker {
    bar: ProgressBar,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message("Processing PDFs...");

        Self { bar }
    }

    /// Tracker that draws nothing.
    pub fn hidden(total: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total as u64);
        Self { bar }
    }

    pub fn start_item(&self, index: usize, name: &str) {
        self.bar
            .set_message(format!("Processing {}/{}: {}", index, self.bar.length().unwrap_or(0), name));
    }

    pub fn increment(&self) {
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("All files processed");
    }
}
