//! Per-run context
//!
//! One [`RunContext`] is created per invocation and handed to every stage.
//! It carries the run identity and collects non-fatal warnings for the
//! end-of-run report.

use crate::error::PartialDataWarning;
use chrono::{DateTime, Local};
use uuid::Uuid;

#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    job: String,
    started_at: DateTime<Local>,
    warnings: Vec<PartialDataWarning>,
}

impl RunContext {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job: job.into(),
            started_at: Local::now(),
            warnings: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Record and log a partial-data warning
    pub fn warn(&mut self, warning: PartialDataWarning) {
        log::warn!("[{}] Partial data: {}", self.job, warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[PartialDataWarning] {
        &self.warnings
    }

    /// Hand the collected warnings to the caller
    pub fn take_warnings(&mut self) -> Vec<PartialDataWarning> {
        std::mem::take(&mut self.warnings)
    }
}
