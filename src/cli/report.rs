//! Test run report rendering

use std::io::{self, Write};

use colored::Colorize;

use crate::remote::{RunSummary, TestRunResult};

/// Write one line per test case, followed by a summary
///
/// With `fail_fast`, listing stops after the first failing case; the summary
/// still counts the whole run.
pub fn write_report<W: Write>(
    out: &mut W,
    result: &TestRunResult,
    fail_fast: bool,
) -> io::Result<RunSummary> {
    if !result.user_agent.is_empty() {
        writeln!(
            out,
            "{} {{{}}} {}",
            "Worker".dimmed(),
            result.worker_id,
            result.user_agent.dimmed()
        )?;
    }

    for case in &result.results {
        match case.first_failure() {
            None => writeln!(out, "  {} {}", "✓".green(), case.description())?,
            Some(assertion) => {
                writeln!(out, "  {} {}", "✗".red(), case.description().red())?;
                writeln!(out, "      {}", assertion.failure_message())?;
                if fail_fast {
                    writeln!(out, "  {}", "Stopping at first failure".yellow())?;
                    break;
                }
            }
        }
    }

    let summary = result.summary();
    let line = format!(
        "{} passed, {} failed, {} total",
        summary.passed,
        summary.failed,
        summary.total()
    );
    if summary.success() {
        writeln!(out, "\n{}", line.green().bold())?;
    } else {
        writeln!(out, "\n{}", line.red().bold())?;
    }
    Ok(summary)
}
