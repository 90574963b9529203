mod report;
mod user;

pub use report::{Outcome, RecordReport, RunResult};
pub use user::{UserRecord, DEFAULT_TARGET_SUFFIX};
