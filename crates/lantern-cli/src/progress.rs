//! Reception progress display.

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the source bytes of an incoming transfer.
pub struct ReceiveProgress {
    bar: ProgressBar,
}

impl ReceiveProgress {
    /// Create a tracker once the session metadata is known.
    #[must_use]
    pub fn new(total_bytes: u64, filename: &str) -> Self {
        let bar = ProgressBar::new(total_bytes);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );

        bar.set_message(format!("Receiving: {filename}"));

        Self { bar }
    }

    /// Update the decoded byte estimate.
    pub fn update(&self, decoded_bytes: u64) {
        self.bar.set_position(decoded_bytes);
    }

    /// Finish with a message.
    pub fn finish_with_message(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    /// Abandon the bar (for errors).
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Format bytes in human-readable form.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024_u64.pow(4)), "1.00 TB");
    }
}
