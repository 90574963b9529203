use colored::Colorize;
use serde::Serialize;

/// How a single fetched record ended up.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Delivered,
    Skipped,
    Failed,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Delivered => "delivered",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        }
    }

    /// Get the colored label for terminal output.
    pub fn colored(self) -> String {
        let label = self.label();
        match self {
            Outcome::Delivered => label.green().to_string(),
            Outcome::Skipped => label.bright_black().to_string(),
            Outcome::Failed => label.red().bold().to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RecordReport {
    pub name: String,
    pub email: String,
    pub outcome: Outcome,
    /// Sink calls made for this record (0 when skipped)
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one dispatcher run.
#[derive(Serialize, Debug, Clone, Default)]
pub struct RunResult {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub records: Vec<RecordReport>,
}

impl RunResult {
    pub fn record(&mut self, report: RecordReport) {
        match report.outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
        self.records.push(report);
    }

    pub fn total(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}
