use crate::backfill::from_clause;
use crate::ddl::fragments::{assignments, key_match_sql};
use crate::ddl::guard::route_filters;
use crate::spec::TriggerSpec;

/// One `UPDATE … FROM … WHERE` per route
///
/// Each statement joins the target to the source (and through) table on the
/// trigger's key logic, filters by the route's discriminator value and the
/// raw condition, and writes every mapped column of the route. Target rows
/// must already exist; missing ones are not created.
pub fn populate_sql(spec: &TriggerSpec) -> Vec<String> {
    spec.routing()
        .routes()
        .iter()
        .map(|route| {
            let mut filters = vec![key_match_sql(spec)];
            filters.extend(route_filters(spec, route));

            format!(
                "UPDATE {} SET {} FROM {} WHERE {}",
                spec.target_table(),
                assignments(spec, route.prefix, false).join(", "),
                from_clause(spec),
                filters.join(" AND ")
            )
        })
        .collect()
}
