//! Field Mapping Normalizer
//!
//! `fields` accepts a column name, a list of names, a `{source: target}`
//! mapping, or a list mixing all of those with composite entries. All of them
//! normalize to one ordered list of (source columns → target column).

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::options::{FieldEntry, FieldsOption};
use crate::error::{ReplicateError, ReplicateResult};
use crate::spec::reference::{ColumnRef, TableContext};
use crate::validation::validate_sql_identifier;

/// Source columns concatenated into one target column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    pub sources: Vec<ColumnRef>,
    pub target: String,
}

impl FieldMapping {
    pub fn is_composite(&self) -> bool {
        self.sources.len() > 1
    }

    /// Value expression: `ROW.city || ' ' || ROW.state`
    ///
    /// With `coalesce`, each component of a composite is wrapped in
    /// `COALESCE(…, '')` so a null part does not null the whole value.
    pub fn value_sql(&self, coalesce: bool) -> String {
        let wrap = coalesce && self.is_composite();
        self.sources
            .iter()
            .map(|source| {
                if wrap {
                    format!("COALESCE({}, '')", source)
                } else {
                    source.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" || ' ' || ")
    }
}

/// Ordered, non-empty list of field mappings with unique targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMap(Vec<FieldMapping>);

impl FieldMap {
    /// Normalize and resolve a `fields` option against the source/through tables
    pub fn build(option: &FieldsOption, ctx: &TableContext<'_>) -> ReplicateResult<Self> {
        let raw = normalize(option)?;
        if raw.is_empty() {
            return Err(ReplicateError::EmptyFields {
                table: ctx.source_table.to_string(),
            });
        }

        let mut mappings = Vec::with_capacity(raw.len());
        for (target, sources) in raw {
            let sources = sources
                .iter()
                .map(|source| ctx.resolve("fields", source))
                .collect::<ReplicateResult<Vec<_>>>()?;
            mappings.push(FieldMapping { sources, target });
        }
        Ok(Self(mappings))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldMapping> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|m| m.target.as_str())
    }
}

impl<'a> IntoIterator for &'a FieldMap {
    type Item = &'a FieldMapping;
    type IntoIter = std::slice::Iter<'a, FieldMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Flatten every accepted `fields` shape into target → source columns
///
/// A later entry for an already-mapped target replaces its sources but keeps
/// the target's original position.
pub fn normalize(option: &FieldsOption) -> ReplicateResult<IndexMap<String, Vec<String>>> {
    let mut fields = IndexMap::new();
    match option {
        FieldsOption::Single(column) => add_column(&mut fields, column)?,
        FieldsOption::Mapping(map) => {
            for (source, target) in map {
                add(&mut fields, vec![source.clone()], target)?;
            }
        }
        FieldsOption::List(entries) => {
            for entry in entries {
                match entry {
                    FieldEntry::Column(column) => add_column(&mut fields, column)?,
                    FieldEntry::Composite(composite) => {
                        add(&mut fields, composite.from.clone().into_vec(), &composite.to)?
                    }
                    FieldEntry::Mapping(map) => {
                        for (source, target) in map {
                            add(&mut fields, vec![source.clone()], target)?;
                        }
                    }
                }
            }
        }
    }
    Ok(fields)
}

/// A bare column maps onto itself; a qualified one onto its column part
fn add_column(fields: &mut IndexMap<String, Vec<String>>, column: &str) -> ReplicateResult<()> {
    let target = column.rsplit('.').next().unwrap_or(column);
    add(fields, vec![column.to_string()], target)
}

fn add(
    fields: &mut IndexMap<String, Vec<String>>,
    sources: Vec<String>,
    target: &str,
) -> ReplicateResult<()> {
    validate_sql_identifier(target, "field target")?;
    if sources.is_empty() {
        return Err(ReplicateError::ConfigError {
            setting: "fields".to_string(),
            value: target.to_string(),
            reason: "composite field has no source columns".to_string(),
        });
    }
    fields.insert(target.to_string(), sources);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::{CompositeField, SourceColumns};
    use crate::spec::reference::Through;

    fn list(entries: Vec<FieldEntry>) -> FieldsOption {
        FieldsOption::List(entries)
    }

    fn column(name: &str) -> FieldEntry {
        FieldEntry::Column(name.to_string())
    }

    fn composite(from: &[&str], to: &str) -> FieldEntry {
        FieldEntry::Composite(CompositeField {
            from: SourceColumns::Many(from.iter().map(|s| s.to_string()).collect()),
            to: to.to_string(),
        })
    }

    fn mapping(pairs: &[(&str, &str)]) -> FieldEntry {
        FieldEntry::Mapping(
            pairs
                .iter()
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_single_column() {
        let fields = normalize(&FieldsOption::Single("name".to_string())).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["name"], vec!["name".to_string()]);
    }

    #[test]
    fn test_mixed_list_keeps_order() {
        let fields = normalize(&list(vec![
            column("latitude"),
            column("longitude"),
            composite(&["city", "state", "country"], "location"),
        ]))
        .unwrap();

        let targets: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(targets, vec!["latitude", "longitude", "location"]);
        assert_eq!(fields["location"], vec!["city", "state", "country"]);
    }

    #[test]
    fn test_last_write_wins_on_target() {
        let fields = normalize(&list(vec![
            column("name"),
            column("email"),
            mapping(&[("full_name", "name")]),
        ]))
        .unwrap();

        let targets: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(targets, vec!["name", "email"]);
        assert_eq!(fields["name"], vec!["full_name".to_string()]);
    }

    #[test]
    fn test_empty_list_is_empty_fields() {
        let ctx = TableContext::new("locations", None);
        let result = FieldMap::build(&list(vec![]), &ctx);
        assert!(matches!(result, Err(ReplicateError::EmptyFields { .. })));
    }

    #[test]
    fn test_empty_composite_rejected() {
        assert!(normalize(&list(vec![composite(&[], "location")])).is_err());
    }

    #[test]
    fn test_composite_value_sql() {
        let ctx = TableContext::new("locations", None);
        let map = FieldMap::build(
            &list(vec![composite(&["city", "state", "country"], "location")]),
            &ctx,
        )
        .unwrap();
        let location = map.iter().next().unwrap();

        assert_eq!(
            location.value_sql(false),
            "ROW.city || ' ' || ROW.state || ' ' || ROW.country"
        );
        assert_eq!(
            location.value_sql(true),
            "COALESCE(ROW.city, '') || ' ' || COALESCE(ROW.state, '') || ' ' || COALESCE(ROW.country, '')"
        );
    }

    #[test]
    fn test_coalesce_skips_single_columns() {
        let ctx = TableContext::new("locations", None);
        let map = FieldMap::build(&FieldsOption::Single("latitude".to_string()), &ctx).unwrap();
        assert_eq!(map.iter().next().unwrap().value_sql(true), "ROW.latitude");
    }

    #[test]
    fn test_through_qualified_source() {
        let through = Through::parse("events.address_id").unwrap();
        let ctx = TableContext::new("locations", Some(&through));
        let map = FieldMap::build(&list(vec![column("events.happened_on")]), &ctx).unwrap();
        let mapping = map.iter().next().unwrap();

        assert_eq!(mapping.target, "happened_on");
        assert_eq!(mapping.value_sql(false), "THROUGH.happened_on");
    }

    #[test]
    fn test_unknown_source_table_rejected() {
        let ctx = TableContext::new("locations", None);
        let result = FieldMap::build(&list(vec![column("people.name")]), &ctx);
        assert!(matches!(result, Err(ReplicateError::ReferenceMismatch { .. })));
    }
}
