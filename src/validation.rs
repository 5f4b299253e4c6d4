//! Input Validation Module
//!
//! Every name supplied in an option set ends up spliced into generated DDL,
//! so names are checked against a whitelist before a `TriggerSpec` is built.
//!
//! ## Principles
//!
//! 1. **Whitelist, not blacklist**: Only allow known-safe characters
//! 2. **Validate early**: Nothing is generated from an unchecked option
//! 3. **Fail securely**: Return clear errors on invalid input
//!
//! ## Usage
//!
//! ```rust
//! use pg_replicate::validation::{validate_sql_identifier, validate_table_name};
//!
//! validate_sql_identifier("user_id", "key").unwrap();
//! validate_table_name("public.users", "to").unwrap();
//! assert!(validate_sql_identifier("users; DROP TABLE", "to").is_err());
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::MAX_IDENTIFIER_LEN;
use crate::error::{ReplicateError, ReplicateResult};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

/// Validate `PostgreSQL` identifier (table, column, prefix names)
///
/// Allows: alphanumeric, underscore, `$` after the first character.
/// Rejects: quotes, semicolons, dashes, spaces, dots, leading digits,
/// anything over 63 bytes.
///
/// # Examples
///
/// ```rust
/// use pg_replicate::validation::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("my_table", "to").is_ok());
/// assert!(validate_sql_identifier("user-data", "to").is_err());
/// assert!(validate_sql_identifier("'admin'", "key").is_err());
/// ```
pub fn validate_sql_identifier(identifier: &str, param_name: &str) -> ReplicateResult<()> {
    if identifier.trim().is_empty() {
        return Err(ReplicateError::InvalidInput {
            parameter: param_name.to_string(),
            value: identifier.to_string(),
            reason: "Identifier cannot be blank".to_string(),
        });
    }

    let dangerous_chars = [';', '\'', '"', '\\', '\0'];
    if let Some(ch) = identifier.chars().find(|c| dangerous_chars.contains(c)) {
        return Err(ReplicateError::SecurityViolation {
            parameter: param_name.to_string(),
            value: sanitize_for_logging(identifier),
            reason: format!("Identifier contains dangerous character: '{}'", ch),
        });
    }

    if !IDENTIFIER.is_match(identifier) {
        return Err(ReplicateError::InvalidInput {
            parameter: param_name.to_string(),
            value: sanitize_for_logging(identifier),
            reason: "Identifier must start with a letter or underscore and contain only \
                     alphanumeric characters, underscores and dollar signs"
                .to_string(),
        });
    }

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(ReplicateError::InvalidInput {
            parameter: param_name.to_string(),
            value: format!("{}... ({} chars)", &identifier[..20], identifier.len()),
            reason: format!("Identifier too long (max {} characters)", MAX_IDENTIFIER_LEN),
        });
    }

    Ok(())
}

/// Validate a table name, optionally schema-qualified (`schema.table`)
pub fn validate_table_name(name: &str, param_name: &str) -> ReplicateResult<()> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(ReplicateError::InvalidInput {
            parameter: param_name.to_string(),
            value: sanitize_for_logging(name),
            reason: "Table name may have at most one schema qualifier".to_string(),
        });
    }
    for part in parts {
        validate_sql_identifier(part, param_name)?;
    }
    Ok(())
}

/// Validate the raw boolean guard expression
///
/// The expression is not parsed; it only must not be able to terminate the
/// statement or the `$$`-quoted function body it is spliced into.
pub fn validate_condition(condition: &str) -> ReplicateResult<()> {
    if condition.trim().is_empty() {
        return Err(ReplicateError::InvalidInput {
            parameter: "condition".to_string(),
            value: condition.to_string(),
            reason: "Condition cannot be blank".to_string(),
        });
    }

    for pattern in [";", "--", "/*", "$$"] {
        if condition.contains(pattern) {
            return Err(ReplicateError::SecurityViolation {
                parameter: "condition".to_string(),
                value: sanitize_for_logging(condition),
                reason: format!("Condition contains '{}'", pattern),
            });
        }
    }

    Ok(())
}

/// Sanitize string for logging (truncate, escape control chars)
fn sanitize_for_logging(s: &str) -> String {
    let max_len = 50;
    let truncated = match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    };

    truncated
        .replace('\0', "\\0")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
