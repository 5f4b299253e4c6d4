//! Backfill: applying a replication rule to rows that already exist
//!
//! A trigger only sees changes made after it is installed. The statements
//! here bring existing rows in line once:
//! - **populate**: one `UPDATE … FROM` per route, writing straight into the target table
//! - **initialize**: one `CREATE TABLE … AS SELECT` slice per route, registered in a
//!   `SliceRegistry` and later joined into one table by `SliceRegistry::assemble_sql`
//!
//! Backfill statements alias the source table `AS ROW` and the through table
//! `AS THROUGH`, so column references and the raw condition read exactly as
//! they do inside the trigger function.

pub mod populate;
pub mod slice;

pub use populate::populate_sql;
pub use slice::{initialize_sql, plan_slices, SlicePlan, SliceRegistry, TableSlice};

use crate::config::{ROW_VAR, THROUGH_VAR};
use crate::spec::TriggerSpec;

/// `locations AS ROW, events AS THROUGH`
pub fn from_clause(spec: &TriggerSpec) -> String {
    let mut tables = vec![format!("{} AS {}", spec.source_table(), ROW_VAR)];
    if let Some(through) = spec.through() {
        tables.push(format!("{} AS {}", through.table, THROUGH_VAR));
    }
    tables.join(", ")
}
