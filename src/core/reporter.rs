// src/core/reporter.rs

use crate::core::env::Env;
use crate::models::ParsedCmd;
use colored::*;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPhase {
    Before,
    After,
}

/// Everything a reporter is told about one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchEvent<'a> {
    pub phase: ReportPhase,
    pub path: &'a str,
    pub quiet: bool,
    /// The per-invocation env the command runs with.
    pub env: &'a Env,
    /// `None` before dispatch.
    pub success: Option<bool>,
    pub elapsed: Duration,
    pub plan: &'a [ParsedCmd],
    pub cursor: usize,
}

/// Observes command dispatch. Has no say in control flow.
pub trait Reporter: fmt::Debug {
    fn notify(&mut self, event: &DispatchEvent<'_>);
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn notify(&mut self, _event: &DispatchEvent<'_>) {}
}

/// Prints one line per command start and failure to the terminal.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    /// Also print a line when a command succeeds, with its duration.
    pub show_timing: bool,
}

impl Reporter for ConsoleReporter {
    fn notify(&mut self, event: &DispatchEvent<'_>) {
        match (event.phase, event.success) {
            (ReportPhase::Before, _) => {
                log::debug!(
                    "[{}/{}] {} env: {:?}",
                    event.cursor + 1,
                    event.plan.len(),
                    event.path,
                    event.env.flatten()
                );
                if !event.quiet {
                    println!("{} {}", "→".blue(), event.path.green());
                }
            }
            (ReportPhase::After, Some(false)) => {
                eprintln!(
                    "{} {} {}",
                    "✗".red().bold(),
                    event.path.red(),
                    format!("({:.2?})", event.elapsed).dimmed()
                );
            }
            (ReportPhase::After, _) => {
                if self.show_timing && !event.quiet {
                    println!(
                        "{} {} {}",
                        "✓".green(),
                        event.path,
                        format!("({:.2?})", event.elapsed).dimmed()
                    );
                }
            }
        }
    }
}
