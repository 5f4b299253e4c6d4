//! The `execute(sql)` capability
//!
//! Generated statements leave the crate through exactly one seam: an
//! `Execute` implementation called once per statement, in emission order.

use crate::error::ReplicateResult;

/// Runs one SQL statement
pub trait Execute {
    fn execute(&mut self, sql: &str) -> ReplicateResult<()>;
}

impl<F> Execute for F
where
    F: FnMut(&str) -> ReplicateResult<()>,
{
    fn execute(&mut self, sql: &str) -> ReplicateResult<()> {
        self(sql)
    }
}

/// Collects statements instead of running them
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    statements: Vec<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }
}

impl Execute for RecordingExecutor {
    fn execute(&mut self, sql: &str) -> ReplicateResult<()> {
        self.statements.push(sql.to_string());
        Ok(())
    }
}

/// Runs statements through SPI inside the calling backend's transaction
#[cfg(feature = "pg")]
#[derive(Debug, Default)]
pub struct SpiExecutor;

#[cfg(feature = "pg")]
impl Execute for SpiExecutor {
    fn execute(&mut self, sql: &str) -> ReplicateResult<()> {
        pgrx::Spi::run(sql).map_err(|e| crate::error::ReplicateError::ExecutionFailed {
            sql: sql.to_string(),
            error: e.to_string(),
        })
    }
}
