//! Trigger Specification Model
//!
//! A `TriggerSpec` is the validated, normalized form of one replication rule.
//! It is built once from a source table and a `ReplicateOptions`, never
//! mutated afterwards, and handed to the DDL and backfill assemblers which
//! only read from it.
//!
//! ## Building
//!
//! 1. Validate table names
//! 2. Parse `through` into (table, key)
//! 3. Resolve the key against `THROUGH` (when a through relation exists) or `ROW`
//! 4. Resolve `prefix` and build the ordered discriminator branches
//! 5. Normalize and resolve `fields`, checking prefixed column lengths
//! 6. Derive the function name unless one was given

pub mod fields;
pub mod naming;
pub mod reference;

use serde::Serialize;

use crate::config::options::{Dependent, ReplicateOptions};
use crate::config::{DEFAULT_KEY, MAX_IDENTIFIER_LEN};
use crate::error::{ReplicateError, ReplicateResult};
use crate::validation::{validate_condition, validate_sql_identifier, validate_table_name};

pub use fields::{FieldMap, FieldMapping};
pub use reference::{ColumnRef, RowSource, TableContext, Through};

/// One discriminator value and the column prefix it routes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub value: String,
    pub prefix: String,
}

/// How target column names are prefixed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Routing {
    /// Target columns are written under their own names
    Unprefixed,
    /// Every target column is written as `{prefix}_{column}`
    Static { prefix: String },
    /// The discriminator's value picks the prefix; branches keep declaration order
    Discriminated {
        discriminator: ColumnRef,
        branches: Vec<Branch>,
    },
}

/// One path through the routing: an optional discriminator test and the prefix it writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub test: Option<(&'a ColumnRef, &'a str)>,
    pub prefix: Option<&'a str>,
}

impl Routing {
    /// Routes in emission order; exactly one for unrouted specs
    pub fn routes(&self) -> Vec<Route<'_>> {
        match self {
            Routing::Unprefixed => vec![Route {
                test: None,
                prefix: None,
            }],
            Routing::Static { prefix } => vec![Route {
                test: None,
                prefix: Some(prefix.as_str()),
            }],
            Routing::Discriminated {
                discriminator,
                branches,
            } => branches
                .iter()
                .map(|branch| Route {
                    test: Some((discriminator, branch.value.as_str())),
                    prefix: Some(branch.prefix.as_str()),
                })
                .collect(),
        }
    }
}

/// Immutable description of one generated trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    name: String,
    source_table: String,
    target_table: String,
    key: ColumnRef,
    through: Option<Through>,
    condition: Option<String>,
    routing: Routing,
    fields: FieldMap,
    timestamps: bool,
    dependent_destroy: bool,
    coalesce: bool,
    upsert: bool,
    propagate_keys: bool,
}

impl TriggerSpec {
    /// Validate and normalize `options` for changes on `table`
    pub fn build(table: &str, options: &ReplicateOptions) -> ReplicateResult<Self> {
        validate_table_name(table, "table")?;
        validate_table_name(&options.to, "to")?;

        let key = options.key.as_deref().unwrap_or(DEFAULT_KEY);
        validate_sql_identifier(key, "key")?;

        let through = options.through.as_deref().map(Through::parse).transpose()?;
        let ctx = TableContext::new(table, through.as_ref());

        let key = if through.is_some() {
            ColumnRef::through(key)
        } else {
            ColumnRef::row(key)
        };

        if let Some(condition) = &options.condition {
            validate_condition(condition)?;
        }

        let routing = build_routing(table, options, &ctx)?;
        let fields = FieldMap::build(&options.fields, &ctx)?;
        check_target_columns(&routing, &fields)?;

        let mut spec = Self {
            name: String::new(),
            source_table: table.to_string(),
            target_table: options.to.clone(),
            key,
            through,
            condition: options.condition.as_ref().map(|c| c.trim().to_string()),
            routing,
            fields,
            timestamps: options.timestamps,
            dependent_destroy: options.dependent == Dependent::Destroy,
            coalesce: options.coalesce,
            upsert: options.upsert,
            propagate_keys: options.propagate_keys,
        };

        spec.name = match &options.name {
            Some(name) => {
                validate_sql_identifier(name, "name")?;
                name.clone()
            }
            None => naming::derived_name(&spec)?,
        };

        Ok(spec)
    }

    /// Function and trigger name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    /// Resolved reference holding the target row's id
    pub fn key(&self) -> &ColumnRef {
        &self.key
    }

    pub fn through(&self) -> Option<&Through> {
        self.through.as_ref()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn dependent_destroy(&self) -> bool {
        self.dependent_destroy
    }

    pub fn coalesce(&self) -> bool {
        self.coalesce
    }

    pub fn upsert(&self) -> bool {
        self.upsert
    }

    pub fn propagate_keys(&self) -> bool {
        self.propagate_keys
    }
}

/// Every `{prefix}_{column}` must fit the identifier limit, or PostgreSQL
/// silently truncates it
fn check_target_columns(routing: &Routing, fields: &FieldMap) -> ReplicateResult<()> {
    for route in routing.routes() {
        for target in fields.targets() {
            let column = match route.prefix {
                Some(prefix) => format!("{}_{}", prefix, target),
                None => target.to_string(),
            };
            if column.len() > MAX_IDENTIFIER_LEN {
                return Err(ReplicateError::InvalidInput {
                    parameter: "field target".to_string(),
                    value: column,
                    reason: format!("prefixed column name exceeds {} bytes", MAX_IDENTIFIER_LEN),
                });
            }
        }
    }
    Ok(())
}

fn build_routing(
    table: &str,
    options: &ReplicateOptions,
    ctx: &TableContext<'_>,
) -> ReplicateResult<Routing> {
    let prefix = options.prefix.as_deref();
    match (prefix, options.prefix_pairs()) {
        (None, None) => Ok(Routing::Unprefixed),
        (None, Some(_)) => Err(ReplicateError::PrefixMapWithoutPrefix {
            table: table.to_string(),
        }),
        (Some(prefix), None) => {
            validate_sql_identifier(prefix, "prefix")?;
            Ok(Routing::Static {
                prefix: prefix.to_string(),
            })
        }
        (Some(prefix), Some(pairs)) => {
            let discriminator = ctx.resolve("prefix", prefix)?;
            if pairs.is_empty() {
                return Err(ReplicateError::ConfigError {
                    setting: "prefix_map".to_string(),
                    value: "{}".to_string(),
                    reason: "at least one discriminator value is required".to_string(),
                });
            }

            let mut branches: Vec<Branch> = Vec::with_capacity(pairs.len());
            for (value, column_prefix) in pairs {
                validate_sql_identifier(&column_prefix, "prefix_map prefix")?;
                if branches.iter().any(|b| b.value == value) {
                    return Err(ReplicateError::ConfigError {
                        setting: "prefix_map".to_string(),
                        value,
                        reason: "discriminator value listed twice".to_string(),
                    });
                }
                branches.push(Branch {
                    value,
                    prefix: column_prefix,
                });
            }

            Ok(Routing::Discriminated {
                discriminator,
                branches,
            })
        }
    }
}
