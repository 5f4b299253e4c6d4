//! Condition & Routing Builder
//!
//! The guard decides whether a row takes part in replication at all; the
//! routing writes one block per discriminator branch, as an IF/ELSIF chain
//! in branch declaration order.

use crate::spec::{ColumnRef, Route, Routing, TriggerSpec};
use crate::utils::{quote_literal, quote_literal_list, BodyWriter};

/// `THROUGH.user_id IS NOT NULL AND THROUGH.type IN ('BirthEvent', 'GraduationEvent') AND (…)`
pub fn guard_sql(spec: &TriggerSpec) -> String {
    let mut conditions = vec![format!("{} IS NOT NULL", spec.key())];

    if let Routing::Discriminated { discriminator, branches } = spec.routing() {
        conditions.push(format!(
            "{} IN ({})",
            discriminator,
            quote_literal_list(branches.iter().map(|b| b.value.as_str()))
        ));
    }

    if let Some(condition) = spec.condition() {
        conditions.push(format!("({})", condition));
    }

    conditions.join(" AND ")
}

/// `THROUGH.type = 'BirthEvent'`
pub fn branch_test_sql(discriminator: &ColumnRef, value: &str) -> String {
    format!("{} = {}", discriminator, quote_literal(value))
}

/// Predicates selecting the rows of one route outside the trigger
///
/// Used by backfill statements: the through join, the route's discriminator
/// test and the raw condition.
pub fn route_filters(spec: &TriggerSpec, route: &Route<'_>) -> Vec<String> {
    let mut filters = Vec::new();
    if let Some(through) = spec.through() {
        filters.push(through.join_sql());
    }
    if let Some((discriminator, value)) = route.test {
        filters.push(branch_test_sql(discriminator, value));
    }
    if let Some(condition) = spec.condition() {
        filters.push(format!("({})", condition));
    }
    filters
}

/// Write `each` once per route, inside an IF/ELSIF chain when routes are discriminated
///
/// `each` receives the column prefix of the route.
pub fn write_routed(
    body: &mut BodyWriter,
    spec: &TriggerSpec,
    mut each: impl FnMut(&mut BodyWriter, Option<&str>),
) {
    let routes = spec.routing().routes();
    let discriminated = routes.iter().any(|route| route.test.is_some());

    if !discriminated {
        for route in &routes {
            each(body, route.prefix);
        }
        return;
    }

    for (index, route) in routes.iter().enumerate() {
        let keyword = if index == 0 { "IF" } else { "ELSIF" };
        if let Some((discriminator, value)) = route.test {
            body.line(format!("{} {} THEN", keyword, branch_test_sql(discriminator, value)));
        }
        body.nested(|body| each(body, route.prefix));
    }
    body.line("END IF;");
}
