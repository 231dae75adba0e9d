use anyhow::Result;
use console::{style, StyledObject};

use crate::runner::{JobState, JobStatus, LogEntry};

fn styled_state(state: JobState) -> StyledObject<&'static str> {
    let label = style(state.as_str());
    match state {
        JobState::Ready => label.dim(),
        JobState::Downloading => label.cyan(),
        JobState::Converting => label.magenta(),
        JobState::Complete => label.green().bold(),
        JobState::Error => label.red().bold(),
    }
}

/// One log line as printed by the CLI
pub fn format_log_entry(entry: &LogEntry) -> String {
    format!(
        "[{}] {:<11} {}",
        entry.at.format("%H:%M:%S"),
        styled_state(entry.state),
        entry.message
    )
}

/// Print the outcome of a finished job, returning an error for failed jobs
pub fn report_outcome(status: &JobStatus) -> Result<()> {
    match (&status.state, &status.result) {
        (JobState::Complete, Some(result)) => {
            println!("{} {}", style("✓").green().bold(), result.title);
            println!("Saved to: {}", result.output_path.display());
            Ok(())
        }
        (JobState::Error, _) => anyhow::bail!("{}", status.message),
        (state, _) => anyhow::bail!("Job ended in unexpected state {}: {}", state, status.message),
    }
}
