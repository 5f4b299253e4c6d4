//! Error types for pg_replicate
//!
//! Every failure maps to a PostgreSQL SQLSTATE through `ReplicateError::sqlstate`,
//! so the SQL surface can report it with the matching error class.

use std::fmt;

pub mod testing;

/// Main error type for pg_replicate
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicateError {
    // ============ Configuration Errors (22xxx) ============
    /// An option has an unusable value
    ConfigError {
        setting: String,
        value: String,
        reason: String,
    },

    /// `action` is not one of create, drop, initialize, populate
    InvalidAction {
        action: String,
    },

    /// `through` does not split into exactly `table.column`
    InvalidThrough {
        through: String,
        reason: String,
    },

    /// `prefix_map` or `prefixes` given without a `prefix` column
    PrefixMapWithoutPrefix {
        table: String,
    },

    /// No field mapping supplied
    EmptyFields {
        table: String,
    },

    // ============ Semantic Errors (42xxx) ============
    /// A qualified reference names a table that is neither the source nor the through table
    ReferenceMismatch {
        option: String,
        reference: String,
        source_table: String,
        through_table: Option<String>,
    },

    /// Invalid identifier or expression
    InvalidInput {
        parameter: String,
        value: String,
        reason: String,
    },

    /// Input rejected as a possible injection
    SecurityViolation {
        parameter: String,
        value: String,
        reason: String,
    },

    // ============ Backfill Errors (55xxx) ============
    /// Assembly requested for a target table with no registered slices
    NoSlicesRegistered {
        target: String,
    },

    // ============ I/O and System Errors (XX000) ============
    /// The execute capability rejected a statement
    ExecutionFailed {
        sql: String,
        error: String,
    },

    /// Serialization/deserialization failed
    SerializationError {
        message: String,
    },

    /// Internal error (bug in pg_replicate)
    InternalError {
        message: String,
        file: &'static str,
        line: u32,
    },
}

impl ReplicateError {
    /// Get PostgreSQL SQLSTATE code for this error
    pub fn sqlstate(&self) -> &'static str {
        use ReplicateError::*;
        match self {
            ConfigError { .. } => "22023", // Invalid parameter value
            InvalidAction { .. } => "22P02", // Invalid text representation
            InvalidThrough { .. } => "42P10", // Invalid column reference
            PrefixMapWithoutPrefix { .. } => "22004", // Null value not allowed
            EmptyFields { .. } => "42P17", // Invalid object definition

            ReferenceMismatch { .. } => "42P01", // Undefined table
            InvalidInput { .. } => "42602", // Invalid name
            SecurityViolation { .. } => "42501", // Insufficient privilege

            NoSlicesRegistered { .. } => "55000", // Object not in prerequisite state

            ExecutionFailed { .. } => "XX000",
            SerializationError { .. } => "XX000",
            InternalError { .. } => "XX000",
        }
    }

    /// Create internal error with file/line info
    pub fn internal(message: String, file: &'static str, line: u32) -> Self {
        ReplicateError::InternalError { message, file, line }
    }

    /// True for errors caused by the caller's option set
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            ReplicateError::ExecutionFailed { .. } | ReplicateError::InternalError { .. }
        )
    }
}

impl fmt::Display for ReplicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ReplicateError::*;
        match self {
            ConfigError { setting, value, reason } => {
                write!(f, "Configuration error for '{}': {} (value: {})", setting, reason, value)
            }
            InvalidAction { action } => {
                write!(
                    f,
                    "invalid action: '{}' (expected create, drop, initialize or populate)",
                    action
                )
            }
            InvalidThrough { through, reason } => {
                write!(f, "Invalid through reference '{}': {}", through, reason)
            }
            PrefixMapWithoutPrefix { table } => {
                write!(
                    f,
                    "Replication of '{}' declares prefix_map/prefixes without a prefix column",
                    table
                )
            }
            EmptyFields { table } => {
                write!(f, "Replication of '{}' declares no fields", table)
            }
            ReferenceMismatch { option, reference, source_table, through_table } => match through_table {
                Some(through) => write!(
                    f,
                    "{} '{}' must reference '{}' or '{}'",
                    option, reference, source_table, through
                ),
                None => write!(f, "{} '{}' must reference '{}'", option, reference, source_table),
            },
            InvalidInput { parameter, value, reason } => {
                write!(f, "Invalid {} '{}': {}", parameter, value, reason)
            }
            SecurityViolation { parameter, value, reason } => {
                write!(f, "Rejected {} '{}': {}", parameter, value, reason)
            }
            NoSlicesRegistered { target } => {
                write!(f, "No slices registered for target table '{}'. Run the initialize action first.", target)
            }
            ExecutionFailed { sql, error } => {
                let shown = sql.char_indices().nth(100).map_or(sql.as_str(), |(i, _)| &sql[..i]);
                write!(f, "Statement failed: {}\nSQL: {}", error, shown)
            }
            SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            InternalError { message, file, line } => {
                write!(f, "Internal error at {}:{}: {}\nPlease report this bug.",
                       file, line, message)
            }
        }
    }
}

impl std::error::Error for ReplicateError {}

/// Result type for replication operations
pub type ReplicateResult<T> = Result<T, ReplicateError>;

/// Option documents that fail to decode are configuration errors
impl From<serde_json::Error> for ReplicateError {
    fn from(e: serde_json::Error) -> Self {
        ReplicateError::ConfigError {
            setting: "options".to_string(),
            value: format!("line {}, column {}", e.line(), e.column()),
            reason: e.to_string(),
        }
    }
}

/// Convert SpiError to ReplicateError
#[cfg(feature = "pg")]
impl From<pgrx::spi::Error> for ReplicateError {
    fn from(e: pgrx::spi::Error) -> Self {
        ReplicateError::ExecutionFailed {
            sql: "Unknown".to_string(),
            error: e.to_string(),
        }
    }
}

/// Helper macro for creating internal errors with automatic file/line
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::ReplicateError::internal($msg.to_string(), file!(), line!())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ReplicateError::internal(format!($fmt, $($arg)*), file!(), line!())
    };
}
