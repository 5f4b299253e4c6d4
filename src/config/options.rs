//! Option Schema: the declarative description of one replication rule
//!
//! Options arrive as a JSON document (the SQL surface takes `jsonb`) or are
//! built in Rust. They are never mutated after decoding: the action is a
//! field of its own rather than a key removed from the map before use.
//!
//! ```json
//! {
//!   "to": "users",
//!   "fields": ["latitude", "longitude", {"from": ["city", "state", "country"], "to": "location"}],
//!   "through": "events.address_id",
//!   "key": "user_id",
//!   "prefix": "events.type",
//!   "prefix_map": {"BirthEvent": "birth", "GraduationEvent": "grad"}
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ReplicateError, ReplicateResult};

/// What to generate for a replication rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Trigger function plus its trigger binding
    #[default]
    Create,
    /// Drop the trigger function and, through CASCADE, its binding
    Drop,
    /// One `CREATE TABLE … AS SELECT` slice per discriminator branch
    Initialize,
    /// One `UPDATE … FROM` backfill per discriminator branch
    Populate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Drop => "drop",
            Action::Initialize => "initialize",
            Action::Populate => "populate",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ReplicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "drop" => Ok(Action::Drop),
            "initialize" => Ok(Action::Initialize),
            "populate" => Ok(Action::Populate),
            _ => Err(ReplicateError::InvalidAction {
                action: s.to_string(),
            }),
        }
    }
}

/// What happens to the target row when the source row is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependent {
    /// Clear the mapped columns
    #[default]
    Nullify,
    /// Delete the target row
    Destroy,
}

/// One or several source columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceColumns {
    One(String),
    Many(Vec<String>),
}

impl SourceColumns {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            SourceColumns::One(column) => vec![column],
            SourceColumns::Many(columns) => columns,
        }
    }
}

/// Composite mapping, the JSON spelling of `[city, state, country] => location`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeField {
    pub from: SourceColumns,
    pub to: String,
}

/// A single entry of a `fields` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldEntry {
    /// Copied under its own name
    Column(String),
    Composite(CompositeField),
    /// `{source: target, ...}`
    Mapping(IndexMap<String, String>),
}

/// The `fields` option in any of its accepted shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldsOption {
    Single(String),
    List(Vec<FieldEntry>),
    Mapping(IndexMap<String, String>),
}

/// Ordered discriminator value → column prefix mapping
///
/// Entry order fixes the IF/ELSIF order of the generated branches. The pair
/// list is the canonical form; the object form relies on document order,
/// which `IndexMap` preserves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefixMapOption {
    Pairs(Vec<(String, String)>),
    Map(IndexMap<String, String>),
}

impl PrefixMapOption {
    pub fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            PrefixMapOption::Pairs(pairs) => pairs,
            PrefixMapOption::Map(map) => map.into_iter().collect(),
        }
    }
}

/// Complete option set for one replication rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicateOptions {
    /// Target table
    pub to: String,
    pub fields: FieldsOption,
    /// Explicit function/trigger name; derived from the rule when absent
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub through: Option<String>,
    #[serde(default, alias = "if")]
    pub condition: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub prefix_map: Option<PrefixMapOption>,
    #[serde(default)]
    pub prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub dependent: Dependent,
    /// Wrap each component of a composite mapping in `COALESCE(…, '')`
    #[serde(default)]
    pub coalesce: bool,
    /// Emit `INSERT … ON CONFLICT DO NOTHING` instead of the existence-guarded insert
    #[serde(default)]
    pub upsert: bool,
    /// Rebind NEW from OLD on delete and return it
    #[serde(default)]
    pub propagate_keys: bool,
    #[serde(default)]
    pub action: Action,
}

impl ReplicateOptions {
    pub fn new(to: impl Into<String>, fields: FieldsOption) -> Self {
        Self {
            to: to.into(),
            fields,
            name: None,
            key: None,
            through: None,
            condition: None,
            prefix: None,
            prefix_map: None,
            prefixes: None,
            timestamps: false,
            dependent: Dependent::Nullify,
            coalesce: false,
            upsert: false,
            propagate_keys: false,
            action: Action::Create,
        }
    }

    /// Decode an option document
    pub fn from_json(json: &str) -> ReplicateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: serde_json::Value) -> ReplicateResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Same rule, different action
    pub fn with_action(&self, action: Action) -> Self {
        Self {
            action,
            ..self.clone()
        }
    }

    /// The discriminator mapping, from `prefix_map` or the identity mapping of `prefixes`
    pub fn prefix_pairs(&self) -> Option<Vec<(String, String)>> {
        if let Some(map) = &self.prefix_map {
            return Some(map.clone().into_pairs());
        }
        self.prefixes
            .as_ref()
            .map(|values| values.iter().map(|v| (v.clone(), v.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_defaults_to_create() {
        let options = ReplicateOptions::from_value(json!({"to": "users", "fields": "name"})).unwrap();
        assert_eq!(options.action, Action::Create);
        assert_eq!(options.dependent, Dependent::Nullify);
        assert!(!options.timestamps);
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("populate".parse::<Action>().unwrap(), Action::Populate);
        assert!(matches!(
            "truncate".parse::<Action>(),
            Err(ReplicateError::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_action_spellings_match_decoding() {
        for action in [Action::Create, Action::Drop, Action::Initialize, Action::Populate] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
            let decoded = ReplicateOptions::from_value(json!({
                "to": "users", "fields": "name", "action": action.as_str()
            }))
            .unwrap();
            assert_eq!(decoded.action, action);
        }

        for spelling in [":drop", " drop", "Drop"] {
            assert!(spelling.parse::<Action>().is_err(), "{}", spelling);
            let decoded = ReplicateOptions::from_value(json!({
                "to": "users", "fields": "name", "action": spelling
            }));
            assert!(decoded.is_err(), "{}", spelling);
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result = ReplicateOptions::from_value(json!({
            "to": "users", "fields": "name", "action": "truncate"
        }));
        let err = result.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("truncate"));
    }

    #[test]
    fn test_if_alias_for_condition() {
        let options = ReplicateOptions::from_value(json!({
            "to": "users", "fields": "name", "if": "ROW.active"
        }))
        .unwrap();
        assert_eq!(options.condition.as_deref(), Some("ROW.active"));
    }

    #[test]
    fn test_condition_and_if_together_rejected() {
        let result = ReplicateOptions::from_json(
            r#"{"to": "users", "fields": "name", "condition": "ROW.a", "if": "ROW.b"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_option_rejected() {
        let result = ReplicateOptions::from_value(json!({
            "to": "users", "fields": "name", "using": "NEW.owner_id"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_prefix_map_keeps_document_order() {
        let options = ReplicateOptions::from_json(
            r#"{"to": "users", "fields": "x", "prefix": "type",
                "prefix_map": {"Zeta": "z", "Alpha": "a", "Mid": "m"}}"#,
        )
        .unwrap();

        let pairs = options.prefix_pairs().unwrap();
        let values: Vec<&str> = pairs.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(values, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_prefix_map_pairs_form() {
        let options = ReplicateOptions::from_value(json!({
            "to": "users", "fields": "x", "prefix": "type",
            "prefix_map": [["BirthEvent", "birth"], ["GraduationEvent", "grad"]]
        }))
        .unwrap();

        assert_eq!(
            options.prefix_pairs().unwrap(),
            vec![
                ("BirthEvent".to_string(), "birth".to_string()),
                ("GraduationEvent".to_string(), "grad".to_string()),
            ]
        );
    }

    #[test]
    fn test_prefixes_identity_mapping() {
        let options = ReplicateOptions::from_value(json!({
            "to": "users", "fields": "x", "prefix": "kind", "prefixes": ["home", "work"]
        }))
        .unwrap();

        assert_eq!(
            options.prefix_pairs().unwrap(),
            vec![
                ("home".to_string(), "home".to_string()),
                ("work".to_string(), "work".to_string()),
            ]
        );
    }

    #[test]
    fn test_fields_shapes() {
        let single = ReplicateOptions::from_value(json!({"to": "t", "fields": "a"})).unwrap();
        assert_eq!(single.fields, FieldsOption::Single("a".to_string()));

        let list = ReplicateOptions::from_value(json!({
            "to": "t",
            "fields": ["a", {"b": "c"}, {"from": ["d", "e"], "to": "f"}]
        }))
        .unwrap();
        match list.fields {
            FieldsOption::List(entries) => {
                assert_eq!(entries[0], FieldEntry::Column("a".to_string()));
                assert!(matches!(entries[1], FieldEntry::Mapping(_)));
                assert!(matches!(entries[2], FieldEntry::Composite(_)));
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_with_action_leaves_original_untouched() {
        let options = ReplicateOptions::new("users", FieldsOption::Single("name".to_string()));
        let dropping = options.with_action(Action::Drop);
        assert_eq!(options.action, Action::Create);
        assert_eq!(dropping.action, Action::Drop);
        assert_eq!(dropping.to, "users");
    }
}
