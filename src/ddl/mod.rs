//! DDL Generation: Replication Triggers
//!
//! This module turns a `TriggerSpec` into the statements that install or
//! remove its trigger:
//! - **CREATE**: trigger function + `CREATE TRIGGER` binding
//! - **DROP**: `DROP FUNCTION … CASCADE`, which also removes the binding
//!
//! ## Architecture
//!
//! - `guard`: row guard expression and the IF/ELSIF discriminator routing
//! - `fragments`: INSERT / UPDATE / DELETE fragments from the field mapping
//! - `create`: assembles the PL/pgSQL function body
//! - `drop`: the idempotent drop statement
//!
//! Generation is pure; nothing here executes SQL.

pub mod create;
pub mod drop;
pub mod fragments;
pub mod guard;

pub use create::create_sql;
pub use drop::drop_sql;
