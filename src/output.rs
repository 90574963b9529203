use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::types::{RecordReport, RunResult};

/// Global output format setting
static OUTPUT_JSON: AtomicBool = AtomicBool::new(false);

pub fn set_json_output(json: bool) {
    OUTPUT_JSON.store(json, Ordering::Relaxed);
}

pub fn is_json_output() -> bool {
    OUTPUT_JSON.load(Ordering::Relaxed)
}

/// Print a single item or JSON depending on output mode
pub fn print_item<T: Serialize>(item: &T, display: impl FnOnce(&T)) {
    if is_json_output() {
        println!("{}", serde_json::to_string_pretty(item).unwrap_or_default());
    } else {
        display(item);
    }
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&RecordReport> for RecordRow {
    fn from(report: &RecordReport) -> Self {
        Self {
            name: report.name.clone(),
            email: report.email.clone(),
            outcome: report.outcome.colored(),
            attempts: report.attempts,
            error: report
                .error
                .as_deref()
                .map(|e| truncate(e, 60))
                .unwrap_or_default(),
        }
    }
}

/// Print the per-record table and totals, or the whole result as JSON
pub fn print_summary(result: &RunResult) {
    print_item(result, |result| {
        if !result.records.is_empty() {
            let rows: Vec<RecordRow> = result.records.iter().map(RecordRow::from).collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{table}");
        }
        println!("{}", summary_line(result));
    });
}

fn summary_line(result: &RunResult) -> String {
    let failed = format!("{} failed", result.failed);
    let failed = if result.failed > 0 {
        failed.red().bold().to_string()
    } else {
        failed
    };
    format!(
        "{} users: {} delivered, {} skipped, {}",
        result.total(),
        result.delivered.to_string().green(),
        result.skipped,
        failed
    )
}

/// Truncate a string with ellipsis
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("retry exhausted after 3", 10), "retry e...");
    }

    #[test]
    fn test_summary_line_counts() {
        colored::control::set_override(false);
        let mut result = RunResult::default();
        result.record(RecordReport {
            name: "A".to_string(),
            email: "a@x.biz".to_string(),
            outcome: Outcome::Delivered,
            attempts: 1,
            error: None,
        });
        result.record(RecordReport {
            name: "B".to_string(),
            email: "b@x.com".to_string(),
            outcome: Outcome::Skipped,
            attempts: 0,
            error: None,
        });

        assert_eq!(
            summary_line(&result),
            "2 users: 1 delivered, 1 skipped, 0 failed"
        );
    }
}
