use crate::ddl::fragments::{delete_sql, insert_sql, missing_target_sql, update_sql};
use crate::ddl::guard::{guard_sql, write_routed};
use crate::spec::TriggerSpec;
use crate::utils::BodyWriter;

/// Statements installing the replication trigger
///
/// Two statements, executed in order:
/// 1. `CREATE OR REPLACE FUNCTION` for the trigger function
/// 2. `CREATE TRIGGER` binding it to INSERT, UPDATE and DELETE on the source table
pub fn create_sql(spec: &TriggerSpec) -> Vec<String> {
    vec![function_sql(spec), trigger_sql(spec)]
}

/// Trigger function body
///
/// Per changed row:
/// 1. Bind `ROW` to OLD on delete, NEW otherwise
/// 2. With a through relation, loop over its rows matching `ROW.id`
/// 3. Skip rows failing the guard
/// 4. Insert/update: create the target row if missing, then write the mapped columns
/// 5. Delete: clear the mapped columns, or delete the target row when dependent
/// 6. Return NULL (or the rebound NEW when keys are propagated)
pub fn function_sql(spec: &TriggerSpec) -> String {
    let mut body = BodyWriter::new();

    body.line(format!("CREATE OR REPLACE FUNCTION {}() RETURNS TRIGGER AS $$", spec.name()));
    body.line("DECLARE");
    body.nested(|body| {
        if spec.through().is_some() {
            body.line("ROW     RECORD;");
            body.line("THROUGH RECORD;");
        } else {
            body.line("ROW RECORD;");
        }
    });
    body.line("BEGIN");
    body.nested(|body| {
        body.line("IF (TG_OP = 'DELETE') THEN");
        body.nested(|body| {
            body.line("ROW := OLD;");
            if spec.propagate_keys() {
                body.line("NEW := OLD;");
            }
        });
        body.line("ELSE");
        body.nested(|body| body.line("ROW := NEW;"));
        body.line("END IF;");

        match spec.through() {
            Some(through) => body.block(
                format!("FOR THROUGH IN {} LOOP", through.select_sql()),
                "END LOOP;",
                |body| write_guarded(body, spec),
            ),
            None => write_guarded(body, spec),
        }

        body.line(if spec.propagate_keys() { "RETURN NEW;" } else { "RETURN NULL;" });
    });
    body.line("END;");
    body.line("$$ LANGUAGE plpgsql");

    body.finish()
}

/// `CREATE TRIGGER` firing the function after every row change on the source table
pub fn trigger_sql(spec: &TriggerSpec) -> String {
    format!(
        "CREATE TRIGGER {name} AFTER INSERT OR UPDATE OR DELETE ON {table}\n  FOR EACH ROW EXECUTE PROCEDURE {name}()",
        name = spec.name(),
        table = spec.source_table()
    )
}

fn write_guarded(body: &mut BodyWriter, spec: &TriggerSpec) {
    body.block(format!("IF {} THEN", guard_sql(spec)), "END IF;", |body| {
        body.line("IF (TG_OP = 'DELETE') THEN");
        body.nested(|body| write_delete_path(body, spec));
        body.line("ELSE");
        body.nested(|body| write_write_path(body, spec));
        body.line("END IF;");
    });
}

fn write_delete_path(body: &mut BodyWriter, spec: &TriggerSpec) {
    if spec.dependent_destroy() {
        body.line(format!("{};", delete_sql(spec)));
    } else {
        write_routed(body, spec, |body, prefix| {
            body.line(format!("{};", update_sql(spec, prefix, true)));
        });
    }
}

fn write_write_path(body: &mut BodyWriter, spec: &TriggerSpec) {
    if spec.upsert() {
        body.line(format!("{};", insert_sql(spec)));
    } else {
        body.block(format!("IF {} THEN", missing_target_sql(spec)), "END IF;", |body| {
            body.line(format!("{};", insert_sql(spec)));
        });
    }
    write_routed(body, spec, |body, prefix| {
        body.line(format!("{};", update_sql(spec, prefix, false)));
    });
}
