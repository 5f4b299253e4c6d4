//! Replicator: option set + action → statements → `execute`
//!
//! ```rust
//! use pg_replicate::{ReplicateOptions, Replicator, RecordingExecutor};
//!
//! let options = ReplicateOptions::from_json(
//!     r#"{"to": "users", "key": "user_id", "fields": ["city", "zip"]}"#,
//! ).unwrap();
//!
//! let mut replicator = Replicator::new();
//! let mut executor = RecordingExecutor::new();
//! replicator.replicate(&mut executor, "addresses", &options).unwrap();
//! assert_eq!(executor.statements().len(), 2);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::backfill::{plan_slices, populate_sql, SliceRegistry, TableSlice};
use crate::config::{Action, ReplicateOptions};
use crate::ddl::{create_sql, drop_sql};
use crate::error::ReplicateResult;
use crate::executor::Execute;
use crate::spec::TriggerSpec;

/// Statements for one action, plus slices to register once they have run
#[derive(Debug, Clone)]
struct Plan {
    spec: TriggerSpec,
    action: Action,
    statements: Vec<String>,
    slices: Vec<TableSlice>,
}

/// Generates replication SQL and owns the slice registry between calls
#[derive(Debug, Default)]
pub struct Replicator {
    registry: SliceRegistry,
}

impl Replicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: SliceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SliceRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> SliceRegistry {
        self.registry
    }

    /// Statements for `options.action` on `table`, without executing them
    ///
    /// Slices produced by `initialize` are registered immediately.
    pub fn generate(&mut self, table: &str, options: &ReplicateOptions) -> ReplicateResult<Vec<String>> {
        let plan = plan(table, options)?;
        self.register(&plan);
        Ok(plan.statements)
    }

    /// Generate and execute, one `execute` call per statement
    ///
    /// Every statement is generated before the first one runs, so an invalid
    /// option set executes nothing. Slices are registered only after all of
    /// their statements succeeded. Returns the number of statements run.
    pub fn replicate<E: Execute>(
        &mut self,
        executor: &mut E,
        table: &str,
        options: &ReplicateOptions,
    ) -> ReplicateResult<usize> {
        let plan = plan(table, options)?;
        for sql in &plan.statements {
            debug!(function = plan.spec.name(), "{}", sql);
            executor.execute(sql)?;
        }
        self.register(&plan);
        Ok(plan.statements.len())
    }

    /// Join the registered slices of `target` into a new table `into`
    pub fn assemble<E: Execute>(&mut self, executor: &mut E, target: &str, into: &str) -> ReplicateResult<()> {
        let sql = self.registry.assemble_sql(target, into)?;
        debug!(target_table = target, "{}", sql);
        executor.execute(&sql)?;
        info!(
            target_table = target,
            into_table = into,
            slices = self.registry.slices(target).len(),
            "assembled slices"
        );
        Ok(())
    }

    fn register(&mut self, plan: &Plan) {
        for slice in &plan.slices {
            self.registry.register(plan.spec.target_table(), slice.clone());
        }
        info!(
            source_table = plan.spec.source_table(),
            target_table = plan.spec.target_table(),
            function = plan.spec.name(),
            action = %plan.action,
            statements = plan.statements.len(),
            "generated replication statements"
        );
    }
}

fn plan(table: &str, options: &ReplicateOptions) -> ReplicateResult<Plan> {
    let spec = TriggerSpec::build(table, options)?;
    let action = options.action;

    let (statements, slices): (Vec<String>, Vec<TableSlice>) = match action {
        Action::Create => (create_sql(&spec), Vec::new()),
        Action::Drop => (vec![drop_sql(&spec)], Vec::new()),
        Action::Populate => (populate_sql(&spec), Vec::new()),
        Action::Initialize => plan_slices(&spec)
            .into_iter()
            .map(|plan| (plan.sql, plan.slice))
            .unzip(),
    };

    Ok(Plan {
        spec,
        action,
        statements,
        slices,
    })
}

/// A `Replicator` shared between callers
///
/// Statements run without the lock held: a failing statement may unwind
/// (inside PostgreSQL an ERROR does), and the registry must stay usable
/// afterwards. Slices reach the shared registry only once every statement
/// of the action succeeded.
#[derive(Debug, Default)]
pub struct SharedReplicator {
    inner: Mutex<Replicator>,
}

impl SharedReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and execute; see `Replicator::replicate`
    pub fn replicate<E: Execute>(
        &self,
        executor: &mut E,
        table: &str,
        options: &ReplicateOptions,
    ) -> ReplicateResult<usize> {
        let mut session = Replicator::new();
        let count = session.replicate(executor, table, options)?;
        self.lock().registry.absorb(session.into_registry());
        Ok(count)
    }

    /// Join the registered slices of `target` into `into`, returning the number of slices joined
    pub fn assemble<E: Execute>(&self, executor: &mut E, target: &str, into: &str) -> ReplicateResult<usize> {
        let (sql, slices) = {
            let replicator = self.lock();
            let sql = replicator.registry.assemble_sql(target, into)?;
            (sql, replicator.registry.slices(target).len())
        };

        debug!(target_table = target, "{}", sql);
        executor.execute(&sql)?;
        info!(target_table = target, into_table = into, slices, "assembled slices");
        Ok(slices)
    }

    /// Read the registry under the lock
    pub fn with_registry<R>(&self, read: impl FnOnce(&SliceRegistry) -> R) -> R {
        read(&self.lock().registry)
    }

    // The registry is only written after statements succeeded, so a guard
    // poisoned by an unwinding reader still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, Replicator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Statements for one rule, without a registry
///
/// `initialize` slices are generated but not recorded anywhere.
pub fn generate(table: &str, options: &ReplicateOptions) -> ReplicateResult<Vec<String>> {
    Ok(plan(table, options)?.statements)
}
