//! pg_replicate: trigger-maintained denormalized tables for PostgreSQL
//!
//! A replication rule says which columns of a source table (optionally
//! reached through an indirection table, optionally routed by a
//! discriminator into column prefixes) are copied into a target table. This
//! crate turns such a rule into the SQL that enforces it:
//!
//! - `create`: a PL/pgSQL trigger function and its `CREATE TRIGGER` binding
//! - `drop`: `DROP FUNCTION … CASCADE`
//! - `populate`: `UPDATE … FROM` backfills of existing rows
//! - `initialize`: per-branch `CREATE TABLE … AS SELECT` slices, later assembled
//!
//! Generation is pure and deterministic. Statements leave the crate only
//! through an `Execute` implementation; with the `pg` feature the crate also
//! builds as a pgrx extension that runs them through SPI.

pub mod backfill;
pub mod config;
pub mod ddl;
pub mod error;
pub mod executor;
pub mod replicator;
pub mod spec;
pub mod utils;
pub mod validation;

#[cfg(feature = "pg")]
mod extension;

pub use config::{Action, Dependent, ReplicateOptions};
pub use error::{ReplicateError, ReplicateResult};
pub use executor::{Execute, RecordingExecutor};
pub use replicator::{generate, Replicator, SharedReplicator};
pub use spec::TriggerSpec;

#[cfg(feature = "pg")]
pgrx::pg_module_magic!();

/// Crate version reported by the SQL surface
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
