//! Sliced initialization
//!
//! Instead of updating the target in place, `initialize` materializes each
//! route into its own table (a slice) holding `id` plus the route's mapped
//! columns. Slices of every rule replicating into the same target are
//! collected in a `SliceRegistry`, then joined on `id` into one table.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::backfill::from_clause;
use crate::config::TARGET_ID_COLUMN;
use crate::ddl::fragments::target_column;
use crate::ddl::guard::route_filters;
use crate::error::{ReplicateError, ReplicateResult};
use crate::spec::naming::derived_object_name;
use crate::spec::TriggerSpec;
use crate::validation::validate_table_name;

/// A physical table created for one route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSlice {
    pub name: String,
    /// Mapped target columns, `id` excluded
    pub field_names: Vec<String>,
}

/// A slice and the statement creating it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicePlan {
    pub slice: TableSlice,
    pub sql: String,
}

/// Slices created so far, per target table
///
/// Owned by the caller; registering needs `&mut`, so registrations for one
/// registry are serialized by construction.
#[derive(Debug, Clone, Default)]
pub struct SliceRegistry {
    slices: BTreeMap<String, Vec<TableSlice>>,
}

impl SliceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a slice; re-registering a slice name replaces the earlier entry
    pub fn register(&mut self, target: &str, slice: TableSlice) {
        let slices = self.slices.entry(target.to_string()).or_default();
        match slices.iter_mut().find(|existing| existing.name == slice.name) {
            Some(existing) => *existing = slice,
            None => slices.push(slice),
        }
    }

    /// Register every slice of `other`, target by target
    pub fn absorb(&mut self, other: SliceRegistry) {
        for (target, slices) in other.slices {
            for slice in slices {
                self.register(&target, slice);
            }
        }
    }

    /// Slices registered for `target`, in registration order
    pub fn slices(&self, target: &str) -> &[TableSlice] {
        self.slices.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Target tables with at least one slice
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.slices.values().all(Vec::is_empty)
    }

    /// Forget the slices of `target`, returning them
    pub fn clear(&mut self, target: &str) -> Vec<TableSlice> {
        self.slices.remove(target).unwrap_or_default()
    }

    /// Join every slice of `target` into a new table `into`
    ///
    /// The id set is the union of all slice ids, so rows present in any
    /// slice survive; each slice is left-outer-joined onto it. Two slices
    /// writing the same column cannot be joined into one table.
    pub fn assemble_sql(&self, target: &str, into: &str) -> ReplicateResult<String> {
        validate_table_name(into, "into")?;
        let slices = self.slices(target);
        if slices.is_empty() {
            return Err(ReplicateError::NoSlicesRegistered {
                target: target.to_string(),
            });
        }

        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        let mut columns = vec![format!("slice_ids.{}", TARGET_ID_COLUMN)];
        for slice in slices {
            for field in &slice.field_names {
                if field == TARGET_ID_COLUMN {
                    return Err(ReplicateError::ConfigError {
                        setting: "slices".to_string(),
                        value: field.clone(),
                        reason: format!("slice '{}' maps onto the id column of '{}'", slice.name, target),
                    });
                }
                if let Some(owner) = owners.insert(field.as_str(), slice.name.as_str()) {
                    return Err(ReplicateError::ConfigError {
                        setting: "slices".to_string(),
                        value: field.clone(),
                        reason: format!(
                            "column written by both '{}' and '{}'; give the rules distinct prefixes",
                            owner, slice.name
                        ),
                    });
                }
                columns.push(format!("{}.{}", slice.name, field));
            }
        }

        let ids = slices
            .iter()
            .map(|slice| format!("SELECT {} FROM {}", TARGET_ID_COLUMN, slice.name))
            .collect::<Vec<_>>()
            .join(" UNION ");

        let joins = slices
            .iter()
            .map(|slice| {
                format!(
                    " LEFT OUTER JOIN {name} ON {name}.{id} = slice_ids.{id}",
                    name = slice.name,
                    id = TARGET_ID_COLUMN
                )
            })
            .collect::<String>();

        Ok(format!(
            "CREATE TABLE {} AS SELECT {} FROM ({}) AS slice_ids{}",
            into,
            columns.join(", "),
            ids,
            joins
        ))
    }

    /// `DROP TABLE IF EXISTS` for every slice of `target`
    pub fn drop_slices_sql(&self, target: &str) -> Vec<String> {
        self.slices(target)
            .iter()
            .map(|slice| format!("DROP TABLE IF EXISTS {}", slice.name))
            .collect()
    }
}

/// Slices of one rule and their `CREATE TABLE … AS SELECT` statements
///
/// Slice tables are named `{function name}_{prefix}`, or
/// `{function name}_slice` when the rule is unprefixed; over-long names are
/// shortened by `derived_object_name`.
pub fn plan_slices(spec: &TriggerSpec) -> Vec<SlicePlan> {
    spec.routing()
        .routes()
        .iter()
        .map(|route| {
            let name = derived_object_name(spec.name(), route.prefix.unwrap_or("slice"));

            let mut selected = vec![format!("{} AS {}", spec.key(), TARGET_ID_COLUMN)];
            let mut field_names = Vec::with_capacity(spec.fields().len());
            for mapping in spec.fields() {
                let column = target_column(route.prefix, &mapping.target);
                selected.push(format!("{} AS {}", mapping.value_sql(spec.coalesce()), column));
                field_names.push(column);
            }

            let mut filters = vec![format!("{} IS NOT NULL", spec.key())];
            filters.extend(route_filters(spec, route));

            let sql = format!(
                "CREATE TABLE {} AS SELECT DISTINCT ON ({}) {} FROM {} WHERE {}",
                name,
                spec.key(),
                selected.join(", "),
                from_clause(spec),
                filters.join(" AND ")
            );

            SlicePlan {
                slice: TableSlice { name, field_names },
                sql,
            }
        })
        .collect()
}

/// Slice statements for `spec`, registering each slice under its target table
pub fn initialize_sql(spec: &TriggerSpec, registry: &mut SliceRegistry) -> Vec<String> {
    plan_slices(spec)
        .into_iter()
        .map(|plan| {
            registry.register(spec.target_table(), plan.slice);
            plan.sql
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplicateOptions;
    use crate::error::testing::assert_error_sqlstate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn spec(table: &str, value: serde_json::Value) -> TriggerSpec {
        TriggerSpec::build(table, &ReplicateOptions::from_value(value).unwrap()).unwrap()
    }

    fn scenario() -> TriggerSpec {
        spec(
            "locations",
            json!({
                "name": "replicate_locations_to_users",
                "to": "users",
                "fields": ["latitude", {"from": ["city", "state"], "to": "location"}],
                "through": "events.address_id",
                "key": "user_id",
                "prefix": "events.type",
                "prefix_map": {"BirthEvent": "birth", "GraduationEvent": "grad"}
            }),
        )
    }

    #[test]
    fn test_plan_slices_per_branch() {
        let plans = plan_slices(&scenario());

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].slice.name, "replicate_locations_to_users_birth");
        assert_eq!(plans[0].slice.field_names, vec!["birth_latitude", "birth_location"]);
        assert_eq!(
            plans[0].sql,
            "CREATE TABLE replicate_locations_to_users_birth AS SELECT DISTINCT ON (THROUGH.user_id) \
             THROUGH.user_id AS id, ROW.latitude AS birth_latitude, ROW.city || ' ' || ROW.state AS birth_location \
             FROM locations AS ROW, events AS THROUGH \
             WHERE THROUGH.user_id IS NOT NULL AND THROUGH.address_id = ROW.id AND THROUGH.type = 'BirthEvent'"
        );
        assert_eq!(plans[1].slice.name, "replicate_locations_to_users_grad");
    }

    #[test]
    fn test_unprefixed_slice_name() {
        let spec = spec("addresses", json!({"name": "replicate_home", "to": "users", "fields": "city"}));
        let plans = plan_slices(&spec);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].slice.name, "replicate_home_slice");
        assert_eq!(plans[0].slice.field_names, vec!["city"]);
    }

    #[test]
    fn test_long_slice_names_stay_distinct() {
        let source = "s".repeat(30);
        let target = "t".repeat(30);
        let rule = |condition: &str| {
            spec(
                &source,
                json!({
                    "to": target, "key": "owner_id", "fields": "city",
                    "prefix": "kind", "prefixes": ["graduation_ceremony"], "condition": condition
                }),
            )
        };

        let first = plan_slices(&rule("ROW.verified"));
        let second = plan_slices(&rule("NOT ROW.verified"));
        assert_ne!(first[0].slice.name, second[0].slice.name);
        assert!(first[0].slice.name.len() <= crate::config::MAX_IDENTIFIER_LEN);

        let mut registry = SliceRegistry::new();
        registry.register(&target, first[0].slice.clone());
        registry.register(&target, second[0].slice.clone());
        assert_eq!(registry.slices(&target).len(), 2);
    }

    #[test]
    fn test_initialize_registers_slices() {
        let mut registry = SliceRegistry::new();
        let statements = initialize_sql(&scenario(), &mut registry);

        assert_eq!(statements.len(), 2);
        let names: Vec<&str> = registry.slices("users").iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["replicate_locations_to_users_birth", "replicate_locations_to_users_grad"]
        );
        assert!(registry.slices("accounts").is_empty());
    }

    #[test]
    fn test_reinitialize_does_not_duplicate() {
        let mut registry = SliceRegistry::new();
        initialize_sql(&scenario(), &mut registry);
        initialize_sql(&scenario(), &mut registry);
        assert_eq!(registry.slices("users").len(), 2);
    }

    #[test]
    fn test_assemble_joins_registered_slices() {
        let mut registry = SliceRegistry::new();
        registry.register(
            "users",
            TableSlice { name: "s_birth".to_string(), field_names: vec!["birth_city".to_string()] },
        );
        registry.register(
            "users",
            TableSlice { name: "s_grad".to_string(), field_names: vec!["grad_city".to_string()] },
        );

        assert_eq!(
            registry.assemble_sql("users", "users_replica").unwrap(),
            "CREATE TABLE users_replica AS SELECT slice_ids.id, s_birth.birth_city, s_grad.grad_city \
             FROM (SELECT id FROM s_birth UNION SELECT id FROM s_grad) AS slice_ids \
             LEFT OUTER JOIN s_birth ON s_birth.id = slice_ids.id \
             LEFT OUTER JOIN s_grad ON s_grad.id = slice_ids.id"
        );
    }

    #[test]
    fn test_assemble_without_slices_fails() {
        let registry = SliceRegistry::new();
        assert_error_sqlstate(registry.assemble_sql("users", "users_replica"), "55000");
    }

    #[test]
    fn test_assemble_rejects_shared_column() {
        let mut registry = SliceRegistry::new();
        for table in ["home_addrs", "work_addrs"] {
            let spec = spec(table, json!({"to": "users", "key": "user_id", "fields": "city"}));
            initialize_sql(&spec, &mut registry);
        }

        assert_eq!(registry.slices("users").len(), 2);
        assert_error_sqlstate(registry.assemble_sql("users", "users_replica"), "22023");
        let message = registry.assemble_sql("users", "users_replica").unwrap_err().to_string();
        assert!(message.contains("(value: city)"));
        assert!(message.contains("replicate_home_addrs_to_users_"));
    }

    #[test]
    fn test_assemble_accepts_distinct_prefixes() {
        let mut registry = SliceRegistry::new();
        for (table, prefix) in [("home_addrs", "home"), ("work_addrs", "work")] {
            let spec = spec(
                table,
                json!({"to": "users", "key": "user_id", "fields": "city", "prefix": prefix}),
            );
            initialize_sql(&spec, &mut registry);
        }

        let sql = registry.assemble_sql("users", "users_replica").unwrap();
        assert!(sql.contains(".home_city"));
        assert!(sql.contains(".work_city"));
    }

    #[test]
    fn test_absorb_replaces_by_name() {
        let mut shared = SliceRegistry::new();
        initialize_sql(&scenario(), &mut shared);

        let mut session = SliceRegistry::new();
        initialize_sql(&scenario(), &mut session);
        session.register("accounts", TableSlice { name: "s_acc".to_string(), field_names: vec![] });

        shared.absorb(session);
        assert_eq!(shared.slices("users").len(), 2);
        assert_eq!(shared.targets().collect::<Vec<_>>(), vec!["accounts", "users"]);
    }

    #[test]
    fn test_drop_and_clear() {
        let mut registry = SliceRegistry::new();
        initialize_sql(&scenario(), &mut registry);

        assert_eq!(
            registry.drop_slices_sql("users"),
            vec![
                "DROP TABLE IF EXISTS replicate_locations_to_users_birth".to_string(),
                "DROP TABLE IF EXISTS replicate_locations_to_users_grad".to_string(),
            ]
        );
        assert_eq!(registry.clear("users").len(), 2);
        assert!(registry.is_empty());
    }
}
