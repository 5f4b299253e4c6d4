//! SQL Fragment Builder
//!
//! Statement fragments shared by the trigger body and the backfill
//! statements. Fragments carry no trailing semicolon; callers terminate them.

use crate::config::{CREATED_AT_COLUMN, TARGET_ID_COLUMN, UPDATED_AT_COLUMN};
use crate::spec::TriggerSpec;

/// `{prefix}_{column}`, or `column` when unprefixed
pub fn target_column(prefix: Option<&str>, column: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}_{}", prefix, column),
        None => column.to_string(),
    }
}

/// `users.id = THROUGH.user_id`
pub fn key_match_sql(spec: &TriggerSpec) -> String {
    format!("{}.{} = {}", spec.target_table(), TARGET_ID_COLUMN, spec.key())
}

/// SET list for one route; `clear` assigns NULL instead of the mapped value
pub fn assignments(spec: &TriggerSpec, prefix: Option<&str>, clear: bool) -> Vec<String> {
    let mut sets: Vec<String> = spec
        .fields()
        .iter()
        .map(|mapping| {
            let value = if clear {
                "NULL".to_string()
            } else {
                mapping.value_sql(spec.coalesce())
            };
            format!("{} = {}", target_column(prefix, &mapping.target), value)
        })
        .collect();

    if spec.timestamps() {
        sets.push(format!("{} = NOW()", UPDATED_AT_COLUMN));
    }
    sets
}

/// `UPDATE users SET … WHERE users.id = ROW.user_id`
pub fn update_sql(spec: &TriggerSpec, prefix: Option<&str>, clear: bool) -> String {
    format!(
        "UPDATE {} SET {} WHERE {}",
        spec.target_table(),
        assignments(spec, prefix, clear).join(", "),
        key_match_sql(spec)
    )
}

/// `NOT EXISTS (SELECT 1 FROM users WHERE users.id = ROW.user_id)`
pub fn missing_target_sql(spec: &TriggerSpec) -> String {
    format!(
        "NOT EXISTS (SELECT 1 FROM {} WHERE {})",
        spec.target_table(),
        key_match_sql(spec)
    )
}

/// Insert of the target row's id (and creation time)
///
/// Without `upsert` the caller guards this with `missing_target_sql`; two
/// concurrent writers can both pass that check unless the target's id column
/// is unique. With `upsert` the insert itself tolerates an existing row.
pub fn insert_sql(spec: &TriggerSpec) -> String {
    let (columns, values) = if spec.timestamps() {
        (
            format!("{}, {}", TARGET_ID_COLUMN, CREATED_AT_COLUMN),
            format!("{}, NOW()", spec.key()),
        )
    } else {
        (TARGET_ID_COLUMN.to_string(), spec.key().to_string())
    };

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        spec.target_table(),
        columns,
        values
    );
    if spec.upsert() {
        sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", TARGET_ID_COLUMN));
    }
    sql
}

/// `DELETE FROM users WHERE users.id = ROW.user_id`
pub fn delete_sql(spec: &TriggerSpec) -> String {
    format!("DELETE FROM {} WHERE {}", spec.target_table(), key_match_sql(spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplicateOptions;
    use serde_json::json;

    fn spec(value: serde_json::Value) -> TriggerSpec {
        TriggerSpec::build("addresses", &ReplicateOptions::from_value(value).unwrap()).unwrap()
    }

    #[test]
    fn test_target_column() {
        assert_eq!(target_column(Some("birth"), "location"), "birth_location");
        assert_eq!(target_column(None, "location"), "location");
    }

    #[test]
    fn test_update_sql() {
        let spec = spec(json!({"to": "users", "key": "user_id", "fields": ["city", {"zip": "postcode"}]}));
        assert_eq!(
            update_sql(&spec, None, false),
            "UPDATE users SET city = ROW.city, postcode = ROW.zip WHERE users.id = ROW.user_id"
        );
        assert_eq!(
            update_sql(&spec, Some("home"), true),
            "UPDATE users SET home_city = NULL, home_postcode = NULL WHERE users.id = ROW.user_id"
        );
    }

    #[test]
    fn test_timestamps() {
        let spec = spec(json!({"to": "users", "fields": "city", "timestamps": true}));
        assert_eq!(
            insert_sql(&spec),
            "INSERT INTO users (id, created_at) VALUES (ROW.id, NOW())"
        );
        assert!(update_sql(&spec, None, false).contains("city = ROW.city, updated_at = NOW()"));
        assert!(update_sql(&spec, None, true).contains("city = NULL, updated_at = NOW()"));
    }

    #[test]
    fn test_insert_variants() {
        let guarded = spec(json!({"to": "users", "fields": "city"}));
        assert_eq!(insert_sql(&guarded), "INSERT INTO users (id) VALUES (ROW.id)");
        assert_eq!(
            missing_target_sql(&guarded),
            "NOT EXISTS (SELECT 1 FROM users WHERE users.id = ROW.id)"
        );

        let upsert = spec(json!({"to": "users", "fields": "city", "upsert": true}));
        assert_eq!(
            insert_sql(&upsert),
            "INSERT INTO users (id) VALUES (ROW.id) ON CONFLICT (id) DO NOTHING"
        );
    }

    #[test]
    fn test_delete_sql() {
        let spec = spec(json!({"to": "users", "key": "user_id", "fields": "city"}));
        assert_eq!(delete_sql(&spec), "DELETE FROM users WHERE users.id = ROW.user_id");
    }
}
