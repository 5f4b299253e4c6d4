//! Reference Resolver
//!
//! Option values name columns either bare (`type`) or qualified by a table
//! (`events.type`). Inside the generated function a column is read from one
//! of two records: `ROW`, bound to the changed source row, or `THROUGH`,
//! bound to the current row of the through relation. Resolution picks the
//! record from the qualifier and rejects qualifiers naming any other table.

use std::fmt;

use serde::Serialize;

use crate::config::{ROW_VAR, SOURCE_ID_COLUMN, THROUGH_VAR};
use crate::error::{ReplicateError, ReplicateResult};
use crate::validation::validate_sql_identifier;

/// Record a column is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowSource {
    /// The changed source row (OLD on delete, NEW otherwise)
    Row,
    /// The iterated row of the through relation
    Through,
}

impl RowSource {
    pub fn variable(&self) -> &'static str {
        match self {
            RowSource::Row => ROW_VAR,
            RowSource::Through => THROUGH_VAR,
        }
    }
}

/// A column read from `ROW` or `THROUGH`; displays as `ROW.column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub source: RowSource,
    pub column: String,
}

impl ColumnRef {
    pub fn row(column: impl Into<String>) -> Self {
        Self {
            source: RowSource::Row,
            column: column.into(),
        }
    }

    pub fn through(column: impl Into<String>) -> Self {
        Self {
            source: RowSource::Through,
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source.variable(), self.column)
    }
}

/// Indirection relation: rows of `table` whose `key` equals the changed row's id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Through {
    pub table: String,
    pub key: String,
}

impl Through {
    /// Parse `"table.column"`; anything but two non-empty parts is rejected
    pub fn parse(reference: &str) -> ReplicateResult<Self> {
        let parts: Vec<&str> = reference.split('.').collect();
        if parts.len() != 2 {
            return Err(ReplicateError::InvalidThrough {
                through: reference.to_string(),
                reason: format!("expected 'table.column', found {} part(s)", parts.len()),
            });
        }
        if parts.iter().any(|part| part.trim().is_empty()) {
            return Err(ReplicateError::InvalidThrough {
                through: reference.to_string(),
                reason: "table and column must both be non-empty".to_string(),
            });
        }

        validate_sql_identifier(parts[0], "through table")?;
        validate_sql_identifier(parts[1], "through column")?;

        Ok(Self {
            table: parts[0].to_string(),
            key: parts[1].to_string(),
        })
    }

    /// Row set iterated by the trigger: `SELECT * FROM events WHERE address_id = ROW.id`
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT * FROM {} WHERE {} = {}",
            self.table,
            self.key,
            ColumnRef::row(SOURCE_ID_COLUMN)
        )
    }

    /// Join predicate between the aliased source and through tables
    pub fn join_sql(&self) -> String {
        format!(
            "{} = {}",
            ColumnRef::through(self.key.as_str()),
            ColumnRef::row(SOURCE_ID_COLUMN)
        )
    }
}

impl fmt::Display for Through {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.key)
    }
}

/// Tables a qualified reference may name
#[derive(Debug, Clone, Copy)]
pub struct TableContext<'a> {
    pub source_table: &'a str,
    pub through: Option<&'a Through>,
}

impl<'a> TableContext<'a> {
    pub fn new(source_table: &'a str, through: Option<&'a Through>) -> Self {
        Self {
            source_table,
            through,
        }
    }

    /// Resolve `column` or `table.column`, splitting at the rightmost dot
    ///
    /// `option` names the option being resolved, for error messages.
    pub fn resolve(&self, option: &str, reference: &str) -> ReplicateResult<ColumnRef> {
        let (qualifier, column) = match reference.rsplit_once('.') {
            Some((qualifier, column)) => (Some(qualifier), column),
            None => (None, reference),
        };
        validate_sql_identifier(column, option)?;

        let source = match qualifier {
            None => RowSource::Row,
            Some(table) if names_table(table, self.source_table) => RowSource::Row,
            Some(table) if self.through.is_some_and(|t| t.table == table) => RowSource::Through,
            Some(_) => {
                return Err(ReplicateError::ReferenceMismatch {
                    option: option.to_string(),
                    reference: reference.to_string(),
                    source_table: self.source_table.to_string(),
                    through_table: self.through.map(|t| t.table.clone()),
                })
            }
        };

        Ok(ColumnRef {
            source,
            column: column.to_string(),
        })
    }
}

/// `qualifier` names `table` either exactly or by its unqualified part
fn names_table(qualifier: &str, table: &str) -> bool {
    qualifier == table || table.rsplit('.').next() == Some(qualifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::{assert_error_contains, assert_error_sqlstate};

    #[test]
    fn test_parse_through() {
        let through = Through::parse("events.address_id").unwrap();
        assert_eq!(through.table, "events");
        assert_eq!(through.key, "address_id");
        assert_eq!(
            through.select_sql(),
            "SELECT * FROM events WHERE address_id = ROW.id"
        );
        assert_eq!(through.join_sql(), "THROUGH.address_id = ROW.id");
    }

    #[test]
    fn test_parse_through_rejects_malformed() {
        assert_error_sqlstate(Through::parse("events"), "42P10");
        assert_error_sqlstate(Through::parse("a.b.c"), "42P10");
        assert_error_sqlstate(Through::parse(".address_id"), "42P10");
        assert_error_sqlstate(Through::parse("events."), "42P10");
        assert_error_contains(Through::parse("events"), "expected 'table.column'");
    }

    #[test]
    fn test_resolve_bare_column_is_row_sourced() {
        let ctx = TableContext::new("locations", None);
        let column = ctx.resolve("prefix", "type").unwrap();
        assert_eq!(column, ColumnRef::row("type"));
        assert_eq!(column.to_string(), "ROW.type");
    }

    #[test]
    fn test_resolve_source_qualified() {
        let ctx = TableContext::new("locations", None);
        assert_eq!(ctx.resolve("prefix", "locations.kind").unwrap(), ColumnRef::row("kind"));

        let schema_ctx = TableContext::new("public.locations", None);
        assert_eq!(
            schema_ctx.resolve("prefix", "public.locations.kind").unwrap(),
            ColumnRef::row("kind")
        );
        assert_eq!(
            schema_ctx.resolve("prefix", "locations.kind").unwrap(),
            ColumnRef::row("kind")
        );
    }

    #[test]
    fn test_resolve_through_qualified() {
        let through = Through::parse("events.address_id").unwrap();
        let ctx = TableContext::new("locations", Some(&through));
        let column = ctx.resolve("prefix", "events.type").unwrap();
        assert_eq!(column, ColumnRef::through("type"));
        assert_eq!(column.to_string(), "THROUGH.type");
    }

    #[test]
    fn test_resolve_other_table_is_an_error() {
        let through = Through::parse("events.address_id").unwrap();
        let ctx = TableContext::new("locations", Some(&through));
        let result = ctx.resolve("prefix", "people.type");
        assert!(matches!(result, Err(ReplicateError::ReferenceMismatch { .. })));

        let no_through = TableContext::new("locations", None);
        assert_error_contains(no_through.resolve("prefix", "events.type"), "must reference 'locations'");
    }
}
