use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::core::models::outcome::ItemOutcome;

// Status lines go to stderr; stdout may carry the result batch.

/// Print a success message.
pub fn success(msg: &str) {
    eprintln!("  {} {}", "✓".green(), msg);
}

/// Print a warning message.
pub fn warning(msg: &str) {
    eprintln!("  {} {}", "⚠".yellow(), msg);
}

/// Print an error message.
pub fn error(msg: &str) {
    eprintln!("  {} {}", "✗".red(), msg);
}

/// Print a header line.
pub fn header(msg: &str) {
    println!("\n{}", msg.bold());
}

/// Print an indented `label: value` line.
pub fn detail(label: &str, value: &str) {
    println!("    {} {}", format!("{label}:").dimmed(), value);
}

/// Progress bar over the items of a batch. Hidden in quiet mode.
pub fn progress(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("  {bar:30.cyan/blue} {pos}/{len} items {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Advance the bar for one finished item.
pub fn tick(bar: &ProgressBar, outcome: &ItemOutcome) {
    if !outcome.is_success() {
        bar.set_message(format!("(item {} failed)", outcome.index()));
    }
    bar.inc(1);
}
