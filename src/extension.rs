//! SQL surface of the extension
//!
//! One `SharedReplicator` per backend holds the slice registry between
//! calls, so `pg_replicate(..., '{"action": "initialize"}')` followed by
//! `pg_replicate_assemble(...)` works within a session.

use std::sync::LazyLock;

use pgrx::prelude::*;
use pgrx::JsonB;

use crate::config::ReplicateOptions;
use crate::error::{ReplicateError, ReplicateResult};
use crate::executor::SpiExecutor;
use crate::replicator::{self, SharedReplicator};

static REPLICATOR: LazyLock<SharedReplicator> = LazyLock::new(SharedReplicator::new);

fn parse_options(options: JsonB) -> ReplicateResult<ReplicateOptions> {
    ReplicateOptions::from_value(options.0)
}

fn raise(err: &ReplicateError) -> ! {
    error!("pg_replicate: [{}] {}", err.sqlstate(), err)
}

/// Version of the pg_replicate extension
#[pg_extern]
fn pg_replicate_version() -> &'static str {
    crate::VERSION
}

/// Generate and run the statements for `options.action` on `source_table`
///
/// Returns the number of statements executed.
#[pg_extern]
fn pg_replicate(source_table: &str, options: JsonB) -> i64 {
    let result = parse_options(options)
        .and_then(|options| REPLICATOR.replicate(&mut SpiExecutor, source_table, &options));

    match result {
        Ok(count) => {
            info!("pg_replicate: executed {} statement(s) for {}", count, source_table);
            i64::try_from(count).unwrap_or(i64::MAX)
        }
        Err(e) => raise(&e),
    }
}

/// Statements `pg_replicate` would run, without running them
#[pg_extern]
fn pg_replicate_sql(source_table: &str, options: JsonB) -> Vec<String> {
    match parse_options(options).and_then(|options| replicator::generate(source_table, &options)) {
        Ok(statements) => statements,
        Err(e) => raise(&e),
    }
}

/// Join the slices registered for `target_table` into a new table `into_table`
///
/// Returns the number of slices joined.
#[pg_extern]
fn pg_replicate_assemble(target_table: &str, into_table: &str) -> i64 {
    match REPLICATOR.assemble(&mut SpiExecutor, target_table, into_table) {
        Ok(count) => i64::try_from(count).unwrap_or(i64::MAX),
        Err(e) => raise(&e),
    }
}

#[cfg(feature = "pg_test")]
#[pg_schema]
mod tests {
    use pgrx::prelude::*;

    const SCENARIO: &str = r#"{
        "to": "users",
        "fields": ["latitude", "longitude", {"from": ["city", "state", "country"], "to": "location"}],
        "through": "events.address_id",
        "key": "user_id",
        "prefix": "events.type",
        "prefix_map": [["BirthEvent", "birth"], ["GraduationEvent", "grad"]]
    }"#;

    fn scenario_tables() {
        Spi::run(
            "CREATE TABLE locations (id INT PRIMARY KEY, latitude FLOAT8, longitude FLOAT8, \
             city TEXT, state TEXT, country TEXT)",
        )
        .unwrap();
        Spi::run("CREATE TABLE events (id SERIAL PRIMARY KEY, address_id INT, user_id INT, type TEXT)").unwrap();
        Spi::run(
            "CREATE TABLE users (id INT PRIMARY KEY, \
             birth_latitude FLOAT8, birth_longitude FLOAT8, birth_location TEXT, \
             grad_latitude FLOAT8, grad_longitude FLOAT8, grad_location TEXT)",
        )
        .unwrap();
    }

    fn replicate(table: &str, options: &str) -> Option<i64> {
        Spi::get_one::<i64>(&format!(
            "SELECT pg_replicate('{}', '{}'::jsonb)",
            table,
            options.replace('\'', "''")
        ))
        .unwrap()
    }

    #[pg_test]
    fn test_version_callable_from_sql() {
        let version = Spi::get_one::<String>("SELECT pg_replicate_version()").unwrap();
        assert!(version.unwrap().starts_with("0.1.0"));
    }

    #[pg_test]
    fn test_sql_returns_statements_without_running_them() {
        let statements = Spi::get_one::<Vec<String>>(&format!(
            "SELECT pg_replicate_sql('locations', '{}'::jsonb)",
            SCENARIO
        ))
        .unwrap()
        .unwrap();

        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE OR REPLACE FUNCTION replicate_locations_to_users_"));
        let triggers = Spi::get_one::<i64>("SELECT count(*) FROM pg_trigger WHERE tgname LIKE 'replicate_%'");
        assert_eq!(triggers.unwrap(), Some(0));
    }

    #[pg_test]
    fn test_trigger_replicates_through_rows() {
        scenario_tables();
        assert_eq!(replicate("locations", SCENARIO), Some(2));

        Spi::run("INSERT INTO locations VALUES (1, 48.85, 2.35, 'Paris', 'IDF', 'FR')").unwrap();
        Spi::run("INSERT INTO events (address_id, user_id, type) VALUES (1, 7, 'BirthEvent')").unwrap();
        Spi::run("INSERT INTO events (address_id, user_id, type) VALUES (1, 8, 'GraduationEvent')").unwrap();
        Spi::run("UPDATE locations SET city = 'Paris' WHERE id = 1").unwrap();

        let birth = Spi::get_one::<String>("SELECT birth_location FROM users WHERE id = 7").unwrap();
        assert_eq!(birth.as_deref(), Some("Paris IDF FR"));
        let grad = Spi::get_one::<f64>("SELECT grad_latitude FROM users WHERE id = 8").unwrap();
        assert_eq!(grad, Some(48.85));
        let untouched = Spi::get_one::<String>("SELECT grad_location FROM users WHERE id = 7").unwrap();
        assert_eq!(untouched, None);

        Spi::run("DELETE FROM locations WHERE id = 1").unwrap();
        let cleared = Spi::get_one::<String>("SELECT birth_location FROM users WHERE id = 7").unwrap();
        assert_eq!(cleared, None);
        let kept = Spi::get_one::<i64>("SELECT count(*) FROM users").unwrap();
        assert_eq!(kept, Some(2));
    }

    #[pg_test]
    fn test_drop_removes_trigger() {
        scenario_tables();
        replicate("locations", SCENARIO);
        let dropped = SCENARIO.replacen('{', r#"{"action": "drop","#, 1);
        assert_eq!(replicate("locations", &dropped), Some(1));

        let triggers = Spi::get_one::<i64>("SELECT count(*) FROM pg_trigger WHERE tgname LIKE 'replicate_%'");
        assert_eq!(triggers.unwrap(), Some(0));
    }

    #[pg_test]
    #[should_panic(expected = "already exists")]
    fn test_create_twice_raises() {
        scenario_tables();
        replicate("locations", SCENARIO);
        replicate("locations", SCENARIO);
    }

    #[pg_test]
    fn test_initialize_then_assemble() {
        Spi::run("CREATE TABLE home_addrs (id INT PRIMARY KEY, user_id INT, city TEXT)").unwrap();
        Spi::run("CREATE TABLE work_addrs (id INT PRIMARY KEY, user_id INT, city TEXT)").unwrap();
        Spi::run("INSERT INTO home_addrs VALUES (1, 10, 'Lyon'), (2, 11, 'Nice')").unwrap();
        Spi::run("INSERT INTO work_addrs VALUES (1, 10, 'Paris')").unwrap();

        for (table, prefix) in [("home_addrs", "home"), ("work_addrs", "work")] {
            let options = format!(
                r#"{{"to": "members", "key": "user_id", "fields": "city", "prefix": "{}", "action": "initialize"}}"#,
                prefix
            );
            assert_eq!(replicate(table, &options), Some(1));
        }

        let slices = Spi::get_one::<i64>("SELECT pg_replicate_assemble('members', 'members_replica')").unwrap();
        assert_eq!(slices, Some(2));
        let rows = Spi::get_one::<i64>("SELECT count(*) FROM members_replica").unwrap();
        assert_eq!(rows, Some(2));
        let work = Spi::get_one::<String>("SELECT work_city FROM members_replica WHERE id = 10").unwrap();
        assert_eq!(work.as_deref(), Some("Paris"));
        let missing = Spi::get_one::<String>("SELECT work_city FROM members_replica WHERE id = 11").unwrap();
        assert_eq!(missing, None);
    }

    #[pg_test]
    #[should_panic(expected = "[22023]")]
    fn test_invalid_options_raise_sqlstate() {
        replicate("locations", r#"{"to": "users", "fields": "city", "action": "truncate"}"#);
    }

    #[pg_test]
    #[should_panic(expected = "[55000]")]
    fn test_assemble_without_slices_raises() {
        Spi::run("SELECT pg_replicate_assemble('nobody', 'nobody_replica')").unwrap();
    }
}
