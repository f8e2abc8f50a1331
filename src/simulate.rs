//! Drive a [`Dispatcher`] with simulated sync traffic and check that the
//! lock guarantees held throughout.

use crate::action::{ActionHandle, SyncAction};
use crate::dispatch::Dispatcher;
use crate::error::{Result, TableLockError};
use chrono::{DateTime, Local};
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub tables: Vec<String>,
    pub ops_per_table: usize,
    pub checkpoints: usize,
    pub work: Duration,
    pub jitter: Duration,
    pub fail_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tables: vec!["orders".to_string(), "customers".to_string()],
            ops_per_table: 10,
            checkpoints: 2,
            work: Duration::from_millis(20),
            jitter: Duration::from_millis(10),
            fail_rate: 0.0,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(TableLockError::InvalidArgument(
                "at least one table is required".to_string(),
            ));
        }
        if self.tables.iter().any(|t| t.trim().is_empty()) {
            return Err(TableLockError::InvalidArgument(
                "table names must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fail_rate) {
            return Err(TableLockError::InvalidArgument(format!(
                "fail rate must be between 0 and 1, got {}",
                self.fail_rate
            )));
        }
        Ok(())
    }

    pub fn total_actions(&self) -> usize {
        self.tables.len() * self.ops_per_table + self.checkpoints
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Pull,
    Push,
    Purge,
    Checkpoint,
}

impl ActionKind {
    fn for_op(op: usize) -> Self {
        match op % 3 {
            0 => ActionKind::Pull,
            1 => ActionKind::Push,
            _ => ActionKind::Purge,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Pull => "pull",
            ActionKind::Push => "push",
            ActionKind::Purge => "purge",
            ActionKind::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub peak_concurrent_tables: usize,
    pub violations: Vec<String>,
}

impl SimulationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "started: {}", self.started_at.to_rfc3339())?;
        writeln!(f, "elapsed: {:?}", self.elapsed)?;
        writeln!(f, "completed: {}", self.completed)?;
        writeln!(f, "failed: {}", self.failed)?;
        writeln!(f, "cancelled: {}", self.cancelled)?;
        writeln!(f, "peak concurrent tables: {}", self.peak_concurrent_tables)?;
        write!(f, "violations: {}", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "\n  - {}", violation)?;
        }
        Ok(())
    }
}

/// Records who is inside a slot and flags any overlap the locks should
/// have prevented.
#[derive(Debug, Default)]
struct Tracker {
    active_tables: Mutex<HashSet<String>>,
    exclusive_active: AtomicUsize,
    peak_tables: AtomicUsize,
    violations: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Tracker {
    fn enter_table(&self, table: &str) {
        let mut active = lock(&self.active_tables);
        if self.exclusive_active.load(Ordering::SeqCst) > 0 {
            self.violation(format!("table {} ran inside the exclusive window", table));
        }
        if !active.insert(table.to_string()) {
            self.violation(format!("two actions overlapped on table {}", table));
        }
        self.peak_tables.fetch_max(active.len(), Ordering::SeqCst);
    }

    fn exit_table(&self, table: &str) {
        lock(&self.active_tables).remove(table);
    }

    fn enter_exclusive(&self) {
        let active = lock(&self.active_tables);
        if !active.is_empty() {
            self.violation(format!(
                "checkpoint overlapped {} table action(s)",
                active.len()
            ));
        }
        if self.exclusive_active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.violation("two checkpoints overlapped".to_string());
        }
    }

    fn exit_exclusive(&self) {
        let _active = lock(&self.active_tables);
        self.exclusive_active.fetch_sub(1, Ordering::SeqCst);
    }

    fn violation(&self, message: String) {
        warn!("{}", message);
        lock(&self.violations).push(message);
    }
}

struct SimulatedAction {
    kind: ActionKind,
    table: Option<String>,
    pause: Duration,
    fail: bool,
    tracker: Arc<Tracker>,
}

impl SyncAction for SimulatedAction {
    type Output = ActionKind;
    type Error = TableLockError;

    fn table(&self) -> Option<String> {
        self.table.clone()
    }

    fn execute(
        self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<ActionKind>> + Send {
        async move {
            match &self.table {
                Some(table) => self.tracker.enter_table(table),
                None => self.tracker.enter_exclusive(),
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TableLockError::Cancelled),
                _ = tokio::time::sleep(self.pause) => {
                    if self.fail {
                        let target = self.table.as_deref().unwrap_or("all tables");
                        Err(TableLockError::ActionFailed(format!("{} on {}", self.kind, target)))
                    } else {
                        Ok(self.kind)
                    }
                }
            };

            match &self.table {
                Some(table) => self.tracker.exit_table(table),
                None => self.tracker.exit_exclusive(),
            }
            outcome
        }
    }
}

/// Build the action list: table actions round-robin across tables, with
/// checkpoints spread evenly between them.
fn plan(config: &SimulationConfig, tracker: &Arc<Tracker>) -> Vec<SimulatedAction> {
    let mut rng = rand::thread_rng();
    let jitter_ms = config.jitter.as_millis() as u64;
    let mut pause = || config.work + Duration::from_millis(rng.gen_range(0..=jitter_ms));

    let keyed_total = config.tables.len() * config.ops_per_table;
    let spacing = keyed_total / (config.checkpoints + 1);
    let mut actions = Vec::with_capacity(config.total_actions());
    let mut checkpoints_left = config.checkpoints;

    for op in 0..config.ops_per_table {
        for table in &config.tables {
            if checkpoints_left > 0 && spacing > 0 && actions.len() % (spacing + 1) == spacing {
                actions.push(SimulatedAction {
                    kind: ActionKind::Checkpoint,
                    table: None,
                    pause: pause(),
                    fail: false,
                    tracker: tracker.clone(),
                });
                checkpoints_left -= 1;
            }
            actions.push(SimulatedAction {
                kind: ActionKind::for_op(op),
                table: Some(table.clone()),
                pause: pause(),
                fail: false,
                tracker: tracker.clone(),
            });
        }
    }
    for _ in 0..checkpoints_left {
        actions.push(SimulatedAction {
            kind: ActionKind::Checkpoint,
            table: None,
            pause: pause(),
            fail: false,
            tracker: tracker.clone(),
        });
    }

    for action in &mut actions {
        action.fail = config.fail_rate > 0.0 && rng.gen_bool(config.fail_rate);
    }
    actions
}

/// Post every planned action to `dispatcher` and wait for all outcomes.
///
/// Cancelling `cancel` cancels every action still pending; their outcomes
/// are counted as cancelled rather than failing the run.
pub async fn run_simulation(
    dispatcher: &Dispatcher,
    config: &SimulationConfig,
    cancel: CancellationToken,
) -> Result<SimulationReport> {
    config.validate()?;

    let started_at = Local::now();
    let start = Instant::now();
    let tracker = Arc::new(Tracker::default());

    let handles: Vec<(ActionKind, ActionHandle<ActionKind, TableLockError>)> = plan(config, &tracker)
        .into_iter()
        .map(|action| {
            let kind = action.kind;
            (kind, dispatcher.post(action, cancel.child_token()))
        })
        .collect();
    debug!("Posted {} action(s)", handles.len());

    let mut completed = 0;
    let mut failed = 0;
    let mut cancelled = 0;
    for (kind, handle) in handles {
        match handle.outcome().await {
            Ok(_) => completed += 1,
            Err(TableLockError::Cancelled) => cancelled += 1,
            Err(e) => {
                debug!("Action {} failed: {}", kind, e);
                failed += 1;
            }
        }
    }

    let violations = lock(&tracker.violations).clone();
    Ok(SimulationReport {
        started_at,
        elapsed: start.elapsed(),
        completed,
        failed,
        cancelled,
        peak_concurrent_tables: tracker.peak_tables.load(Ordering::SeqCst),
        violations,
    })
}
