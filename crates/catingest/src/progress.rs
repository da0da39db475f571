//! Progress bars for file ingests

use indicatif::{ProgressBar, ProgressStyle};

/// Record-count progress bar for one file, or a hidden one when `visible`
/// is false.
pub fn record_progress(total: u64, file: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} records ({eta})")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(file.to_string());
    pb
}
