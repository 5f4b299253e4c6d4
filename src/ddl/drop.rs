use crate::spec::TriggerSpec;

/// Drop the replication trigger function
///
/// CASCADE removes the trigger binding with it, and IF EXISTS makes the
/// statement a no-op when nothing was installed. Only the function name
/// matters, so every other option is irrelevant here.
pub fn drop_sql(spec: &TriggerSpec) -> String {
    drop_function_sql(spec.name())
}

/// `DROP FUNCTION IF EXISTS {name}() CASCADE`
pub fn drop_function_sql(name: &str) -> String {
    format!("DROP FUNCTION IF EXISTS {}() CASCADE", name)
}
