//! The event loop.
//!
//! All engine state lives behind one mutex. The worker thread repeatedly asks
//! the scheduler for the next [`Step`] while holding the lock, then releases
//! it and runs the step. Every user callback therefore runs on the worker
//! thread with the lock released, one at a time.
//!
//! Scheduling rules:
//! - loose deliveries (events not tied to a live transaction) go first
//! - open requests wait until their database has no unfinished transaction
//! - a transaction starts once no earlier unfinished transaction on the same
//!   database overlaps its scope with a read-write mode on either side
//! - a running transaction executes its requests FIFO and commits when its
//!   queue is empty and no handle is left (or `commit` was called)

use crate::config::EngineConfig;
use crate::data::{DatabaseData, StoreData, Undo};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::factory::{Connection, VersionChange};
use crate::transaction::Mode;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Transaction identifier, increasing in creation order.
pub(crate) type TxId = u64;

/// A callback ready to run outside the lock. Returns an error to propagate
/// to the owning transaction.
pub(crate) type Delivery = Box<dyn FnOnce() -> Option<EngineError> + Send>;

/// A queued request: executed under the lock, or failed without running.
pub(crate) type Op = Box<dyn for<'a, 'b> FnOnce(Execution<'a, 'b>) -> Delivery + Send>;

/// Final state of a transaction, shared with its handles.
pub(crate) type Outcome = Arc<Mutex<Option<EngineResult<()>>>>;

pub(crate) type UpgradeFn = Box<dyn FnOnce(&mut VersionChange) -> EngineResult<()> + Send>;

/// Backstop for a shutdown signal racing the idle wait.
const IDLE_POLL: Duration = Duration::from_millis(100);

pub(crate) fn boxed_op<F>(f: F) -> Op
where
    F: for<'a, 'b> FnOnce(Execution<'a, 'b>) -> Delivery + Send + 'static,
{
    Box::new(f)
}

/// How a queued request is consumed.
pub(crate) enum Execution<'a, 'b> {
    /// The request runs against the transaction's view of the database.
    Run(&'a mut OpCtx<'b>),
    /// The request never runs and reports this error.
    Fail(EngineError),
}

/// What a request sees while it executes.
pub(crate) struct OpCtx<'a> {
    data: &'a mut DatabaseData,
    undo: &'a mut Vec<Undo>,
    mode: Mode,
    scope: &'a BTreeSet<String>,
}

impl OpCtx<'_> {
    pub(crate) fn store(&self, name: &str) -> EngineResult<&StoreData> {
        if !self.scope.contains(name) {
            return Err(EngineError::not_found(format!(
                "store `{name}` is not in the transaction scope"
            )));
        }
        self.data
            .stores
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("no object store named `{name}`")))
    }

    pub(crate) fn store_mut(&mut self, name: &str) -> EngineResult<(&mut StoreData, &mut Vec<Undo>)> {
        if self.mode == Mode::ReadOnly {
            return Err(EngineError::new(
                ErrorKind::ReadOnly,
                "the transaction is read-only",
            ));
        }
        if !self.scope.contains(name) {
            return Err(EngineError::not_found(format!(
                "store `{name}` is not in the transaction scope"
            )));
        }
        let OpCtx { data, undo, .. } = self;
        let store = data
            .stores
            .get_mut(name)
            .ok_or_else(|| EngineError::not_found(format!("no object store named `{name}`")))?;
        Ok((store, &mut **undo))
    }
}

pub(crate) struct OpenJob {
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) name: String,
    pub(crate) version: Option<u32>,
    pub(crate) upgrade: Option<UpgradeFn>,
    pub(crate) on_success: Box<dyn FnOnce(Connection) + Send>,
    pub(crate) on_error: Box<dyn FnOnce(EngineError) + Send>,
}

impl OpenJob {
    fn finish(self, result: EngineResult<u32>) {
        match result {
            Ok(version) => {
                debug!(database = %self.name, version, "database opened");
                let connection = Connection::new(Arc::clone(&self.runtime), self.name, version);
                (self.on_success)(connection);
            }
            Err(err) => {
                debug!(database = %self.name, error = %err, "database open failed");
                (self.on_error)(err);
            }
        }
    }
}

struct UpgradeJob {
    job: OpenJob,
    data: DatabaseData,
    old_version: u32,
    new_version: u32,
}

struct DatabaseSlot {
    data: DatabaseData,
    upgrading: bool,
}

struct TxRecord {
    db: String,
    scope: BTreeSet<String>,
    mode: Mode,
    running: bool,
    handles: usize,
    commit_requested: bool,
    abort_requested: Option<EngineError>,
    queue: VecDeque<Op>,
    undo: Vec<Undo>,
    on_complete: Vec<Box<dyn FnOnce() + Send>>,
    on_error: Vec<Box<dyn FnOnce(EngineError) + Send>>,
    outcome: Outcome,
}

/// Everything guarded by the engine lock.
pub(crate) struct EngineState {
    config: EngineConfig,
    databases: HashMap<String, DatabaseSlot>,
    opens: VecDeque<OpenJob>,
    transactions: BTreeMap<TxId, TxRecord>,
    next_tx: TxId,
    loose: VecDeque<Delivery>,
}

enum Step {
    Deliver { tx: Option<TxId>, delivery: Delivery },
    Batch(Vec<Delivery>),
    Upgrade(Box<UpgradeJob>),
    Opened { job: OpenJob, result: EngineResult<u32> },
}

impl EngineState {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            databases: HashMap::new(),
            opens: VecDeque::new(),
            transactions: BTreeMap::new(),
            next_tx: 1,
            loose: VecDeque::new(),
        }
    }

    pub(crate) fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .databases
            .iter()
            .filter(|(_, slot)| !slot.upgrading || slot.data.version > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn enqueue_open(&mut self, job: OpenJob) {
        self.opens.push_back(job);
    }

    pub(crate) fn schema_names(&self, db: &str) -> Vec<String> {
        self.databases
            .get(db)
            .map(|slot| slot.data.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn store_data(&self, db: &str, store: &str) -> Option<&StoreData> {
        self.databases.get(db)?.data.stores.get(store)
    }

    /// Registers a transaction holding one handle.
    pub(crate) fn begin(&mut self, db: &str, stores: &[&str], mode: Mode) -> EngineResult<(TxId, Outcome)> {
        let slot = self
            .databases
            .get(db)
            .ok_or_else(|| EngineError::not_found(format!("no database named `{db}`")))?;
        for store in stores {
            if !slot.data.stores.contains_key(*store) {
                return Err(EngineError::not_found(format!(
                    "no object store named `{store}`"
                )));
            }
        }
        let id = self.next_tx;
        self.next_tx += 1;
        let outcome: Outcome = Arc::new(Mutex::new(None));
        self.transactions.insert(
            id,
            TxRecord {
                db: db.to_string(),
                scope: stores.iter().map(|s| (*s).to_string()).collect(),
                mode,
                running: false,
                handles: 1,
                commit_requested: false,
                abort_requested: None,
                queue: VecDeque::new(),
                undo: Vec::new(),
                on_complete: Vec::new(),
                on_error: Vec::new(),
                outcome: Arc::clone(&outcome),
            },
        );
        debug!(tx = id, database = db, ?mode, "transaction created");
        Ok((id, outcome))
    }

    pub(crate) fn is_live(&self, id: TxId) -> bool {
        self.transactions
            .get(&id)
            .is_some_and(|record| !record.commit_requested && record.abort_requested.is_none())
    }

    pub(crate) fn transaction_db(&self, id: TxId) -> Option<&str> {
        self.transactions.get(&id).map(|record| record.db.as_str())
    }

    pub(crate) fn retain(&mut self, id: TxId) {
        if let Some(record) = self.transactions.get_mut(&id) {
            record.handles += 1;
        }
    }

    pub(crate) fn release(&mut self, id: TxId) {
        if let Some(record) = self.transactions.get_mut(&id) {
            record.handles = record.handles.saturating_sub(1);
        }
    }

    pub(crate) fn request_commit(&mut self, id: TxId) {
        if let Some(record) = self.transactions.get_mut(&id) {
            record.commit_requested = true;
        }
    }

    pub(crate) fn request_abort(&mut self, id: TxId) {
        if let Some(record) = self.transactions.get_mut(&id) {
            if record.abort_requested.is_none() {
                record.abort_requested = Some(EngineError::abort("the transaction was aborted"));
            }
        }
    }

    /// Queues a request, or fails it at once if the transaction is inactive.
    pub(crate) fn submit(&mut self, id: TxId, op: Op) {
        match self.transactions.get_mut(&id) {
            Some(record) if !record.commit_requested => record.queue.push_back(op),
            _ => self.loose.push_back(op(Execution::Fail(EngineError::inactive()))),
        }
    }

    pub(crate) fn add_complete_listener(&mut self, id: TxId, outcome: &Outcome, f: Box<dyn FnOnce() + Send>) {
        if let Some(record) = self.transactions.get_mut(&id) {
            record.on_complete.push(f);
            return;
        }
        let fire = matches!(*outcome.lock(), Some(Ok(())));
        self.loose.push_back(Box::new(move || {
            if fire {
                f();
            }
            None
        }));
    }

    pub(crate) fn add_error_listener(
        &mut self,
        id: TxId,
        outcome: &Outcome,
        f: Box<dyn FnOnce(EngineError) + Send>,
    ) {
        if let Some(record) = self.transactions.get_mut(&id) {
            record.on_error.push(f);
            return;
        }
        let failure = match &*outcome.lock() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        };
        self.loose.push_back(Box::new(move || {
            if let Some(err) = failure {
                f(err);
            }
            None
        }));
    }

    fn next_step(&mut self) -> Option<Step> {
        if let Some(delivery) = self.loose.pop_front() {
            return Some(Step::Deliver { tx: None, delivery });
        }
        if let Some(step) = self.next_open() {
            return Some(step);
        }
        let ids: Vec<TxId> = self.transactions.keys().copied().collect();
        ids.into_iter().find_map(|id| self.advance(id))
    }

    fn next_open(&mut self) -> Option<Step> {
        let front = self.opens.front()?;
        let busy = self.transactions.values().any(|record| record.db == front.name)
            || self.databases.get(&front.name).is_some_and(|slot| slot.upgrading);
        if busy {
            return None;
        }
        let job = self.opens.pop_front()?;
        let current = self.databases.get(&job.name).map(|slot| slot.data.version);
        let requested = job.version.or(current).unwrap_or(1);
        if requested == 0 {
            let result = Err(EngineError::data("database version must be at least 1"));
            return Some(Step::Opened { job, result });
        }
        match current {
            Some(stored) if requested < stored => {
                let result = Err(EngineError::new(
                    ErrorKind::Version,
                    format!("requested version {requested} is lower than stored version {stored}"),
                ));
                Some(Step::Opened { job, result })
            }
            Some(stored) if requested == stored => Some(Step::Opened {
                job,
                result: Ok(stored),
            }),
            _ => {
                let slot = self
                    .databases
                    .entry(job.name.clone())
                    .or_insert_with(|| DatabaseSlot {
                        data: DatabaseData::default(),
                        upgrading: false,
                    });
                slot.upgrading = true;
                let data = slot.data.clone();
                debug!(database = %job.name, from = data.version, to = requested, "upgrade needed");
                Some(Step::Upgrade(Box::new(UpgradeJob {
                    old_version: data.version,
                    new_version: requested,
                    data,
                    job,
                })))
            }
        }
    }

    fn finish_upgrade(
        &mut self,
        name: &str,
        mut data: DatabaseData,
        old: u32,
        new: u32,
        result: EngineResult<()>,
    ) -> EngineResult<u32> {
        match result {
            Ok(()) => {
                data.version = new;
                if let Some(slot) = self.databases.get_mut(name) {
                    slot.data = data;
                    slot.upgrading = false;
                }
                debug!(database = name, version = new, "upgrade committed");
                Ok(new)
            }
            Err(err) => {
                if old == 0 {
                    self.databases.remove(name);
                } else if let Some(slot) = self.databases.get_mut(name) {
                    slot.upgrading = false;
                }
                debug!(database = name, error = %err, "upgrade rolled back");
                Err(EngineError::abort(format!("version change aborted: {err}")))
            }
        }
    }

    fn can_start(&self, id: TxId) -> bool {
        let Some(record) = self.transactions.get(&id) else {
            return false;
        };
        if self.databases.get(&record.db).map_or(true, |slot| slot.upgrading) {
            return false;
        }
        self.transactions.range(..id).all(|(_, earlier)| {
            earlier.db != record.db
                || earlier.scope.is_disjoint(&record.scope)
                || (earlier.mode == Mode::ReadOnly && record.mode == Mode::ReadOnly)
        })
    }

    fn advance(&mut self, id: TxId) -> Option<Step> {
        if let Some(err) = self.transactions.get_mut(&id)?.abort_requested.take() {
            return Some(Step::Batch(self.abort_transaction(id, err)));
        }
        if !self.transactions.get(&id)?.running {
            if !self.can_start(id) {
                return None;
            }
            self.transactions.get_mut(&id)?.running = true;
            debug!(tx = id, "transaction started");
        }

        let EngineState {
            databases,
            transactions,
            ..
        } = &mut *self;
        let record = transactions.get_mut(&id)?;
        if let Some(op) = record.queue.pop_front() {
            let slot = databases.get_mut(&record.db)?;
            let mut ctx = OpCtx {
                data: &mut slot.data,
                undo: &mut record.undo,
                mode: record.mode,
                scope: &record.scope,
            };
            trace!(tx = id, "dispatching request");
            let delivery = op(Execution::Run(&mut ctx));
            return Some(Step::Deliver {
                tx: Some(id),
                delivery,
            });
        }
        if record.handles == 0 || record.commit_requested {
            return Some(Step::Batch(self.commit_transaction(id)));
        }
        None
    }

    fn commit_transaction(&mut self, id: TxId) -> Vec<Delivery> {
        let Some(mut record) = self.transactions.remove(&id) else {
            return Vec::new();
        };
        if record.mode == Mode::ReadWrite {
            if let (Some(limit), Some(slot)) = (self.config.max_records, self.databases.get_mut(&record.db)) {
                let total = slot.data.record_count();
                if total > limit {
                    slot.data.rollback(std::mem::take(&mut record.undo));
                    let err = EngineError::new(
                        ErrorKind::QuotaExceeded,
                        format!("database `{}` would hold {total} records, over the limit of {limit}", record.db),
                    );
                    return finish_failed(id, record, err);
                }
            }
        }
        debug!(tx = id, "transaction committed");
        *record.outcome.lock() = Some(Ok(()));
        let unused = record.on_error;
        let mut deliveries: Vec<Delivery> = record
            .on_complete
            .into_iter()
            .map(|f| {
                Box::new(move || {
                    f();
                    None
                }) as Delivery
            })
            .collect();
        deliveries.push(Box::new(move || {
            drop(unused);
            None
        }));
        deliveries
    }

    fn abort_transaction(&mut self, id: TxId, err: EngineError) -> Vec<Delivery> {
        let Some(mut record) = self.transactions.remove(&id) else {
            return Vec::new();
        };
        if let Some(slot) = self.databases.get_mut(&record.db) {
            slot.data.rollback(std::mem::take(&mut record.undo));
        }
        finish_failed(id, record, err)
    }
}

/// Fails queued requests with an abort error, then notifies error listeners.
fn finish_failed(id: TxId, record: TxRecord, err: EngineError) -> Vec<Delivery> {
    debug!(tx = id, error = %err, "transaction aborted");
    *record.outcome.lock() = Some(Err(err.clone()));
    let mut deliveries: Vec<Delivery> = record
        .queue
        .into_iter()
        .map(|op| op(Execution::Fail(EngineError::abort("the transaction was aborted"))))
        .collect();
    deliveries.extend(record.on_error.into_iter().map(|f| {
        let err = err.clone();
        Box::new(move || {
            f(err);
            None
        }) as Delivery
    }));
    let unused = record.on_complete;
    deliveries.push(Box::new(move || {
        drop(unused);
        None
    }));
    deliveries
}

impl Step {
    fn run(self, shared: &Shared) {
        match self {
            Step::Deliver { tx, delivery } => {
                if let (Some(err), Some(id)) = (delivery(), tx) {
                    let batch = shared.state.lock().abort_transaction(id, err);
                    Step::Batch(batch).run(shared);
                }
            }
            Step::Batch(deliveries) => {
                for delivery in deliveries {
                    // Errors of requests failed by an abort have nowhere to go.
                    let _ = delivery();
                }
            }
            Step::Upgrade(upgrade) => {
                let UpgradeJob {
                    mut job,
                    data,
                    old_version,
                    new_version,
                } = *upgrade;
                let mut change = VersionChange::new(data, old_version, new_version);
                let result = match job.upgrade.take() {
                    Some(upgrade) => upgrade(&mut change),
                    None => Ok(()),
                };
                let result = shared.state.lock().finish_upgrade(
                    &job.name,
                    change.into_data(),
                    old_version,
                    new_version,
                    result,
                );
                job.finish(result);
            }
            Step::Opened { job, result } => job.finish(result),
        }
    }
}

pub(crate) struct Shared {
    state: Mutex<EngineState>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

fn run(shared: Arc<Shared>) {
    debug!("engine worker started");
    loop {
        let step = {
            let mut state = shared.state.lock();
            loop {
                if let Some(step) = state.next_step() {
                    break Some(step);
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                shared.wakeup.wait_for(&mut state, IDLE_POLL);
            }
        };
        match step {
            Some(step) => step.run(&shared),
            None => break,
        }
    }
    debug!("engine worker stopped");
}

/// Owner of the worker thread. The worker drains remaining work and exits
/// once the last runtime reference is gone.
pub(crate) struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    pub(crate) fn start(config: EngineConfig) -> EngineResult<Arc<Self>> {
        let name = config.thread_name.clone();
        let shared = Arc::new(Shared {
            state: Mutex::new(EngineState::new(config)),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let worker = Arc::clone(&shared);
        std::thread::Builder::new()
            .name(name)
            .spawn(move || run(worker))
            .map_err(|e| EngineError::invalid_state(format!("failed to start engine thread: {e}")))?;
        Ok(Arc::new(Self { shared }))
    }

    /// Runs `f` under the engine lock and wakes the worker.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let result = f(&mut self.shared.state.lock());
        self.shared.wakeup.notify_one();
        result
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // May run on the worker thread with the lock held, so no locking here.
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wakeup.notify_one();
    }
}
