//! Terminal output: progress sink and deploy summaries
//!
//! Everything here writes to stderr so `berth render` can stream manifests
//! on stdout.

use berth_deploy::{DeployOutcome, DiagnosticSink, Stage};
use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress sink with a spinner for the running stage
pub struct ConsoleSink {
    term: Term,
    spinner: ProgressBar,
}

impl ConsoleSink {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self {
            term: Term::stderr(),
            spinner,
        }
    }

    fn line(&self, line: String) {
        self.spinner.suspend(|| {
            // Output errors are dropped: the sink cannot fail
            let _ = self.term.write_line(&line);
        });
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for ConsoleSink {
    fn info(&self, message: &str) {
        self.line(format!("{} {}", style("→").blue().bold(), message));
    }

    fn warn(&self, message: &str) {
        self.line(format!("{} {}", style("⚠").yellow(), style(message).yellow()));
    }

    fn stage(&self, stage: Stage) {
        if stage.is_terminal() {
            self.spinner.finish_and_clear();
        } else {
            self.spinner.set_message(stage_label(stage));
            self.spinner.enable_steady_tick(Duration::from_millis(100));
        }
    }
}

/// Human-readable label for a running stage
pub fn stage_label(stage: Stage) -> String {
    let label = match stage {
        Stage::Idle => "Starting",
        Stage::ResolvingImages => "Resolving images",
        Stage::LoadingSecrets => "Resolving images and loading secrets",
        Stage::ComposingValues => "Composing values",
        Stage::MaterializingChart => "Preparing chart",
        Stage::Deploying => "Deploying",
        Stage::Done => "Done",
        Stage::Failed => "Failed",
    };
    format!("{}...", label)
}

/// Print the result of a successful deploy
pub fn print_outcome(outcome: &DeployOutcome) {
    let term = Term::stderr();
    let mut lines = vec![format!(
        "{} Deployed {} in namespace {}",
        style("✓").green().bold(),
        style(&outcome.release).cyan(),
        style(&outcome.namespace).yellow()
    )];

    for (name, image) in &outcome.images {
        lines.push(format!("  {} {}", style(name).bold(), style(image).dim()));
    }
    for resource in &outcome.report.resources {
        lines.push(format!("  {} {}", style("applied").green(), resource));
    }

    if let Some(notes) = &outcome.report.notes {
        lines.push(String::new());
        lines.push(style("NOTES:").bold().to_string());
        lines.push(notes.trim_end().to_string());
    }

    for line in lines {
        let _ = term.write_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(stage_label(Stage::Deploying), "Deploying...");
        assert_eq!(stage_label(Stage::MaterializingChart), "Preparing chart...");
    }

    #[test]
    fn test_sink_accepts_lines_without_terminal() {
        let sink = ConsoleSink::new();
        sink.stage(Stage::ResolvingImages);
        sink.info("Using release: demo");
        sink.warn("cleanup failed");
        sink.stage(Stage::Done);
    }
}
