//! The central scheduler (spec.md §4.1): the authoritative, single-locked state
//! machine for workers, object stores, functions, tasks and object references.
//!
//! Every public method here is synchronous and side-effect-free beyond its own
//! state: it returns a list of [`Effect`]s the caller (the `rt-scheduler`
//! binary's gRPC layer) must carry out *after* releasing the lock that guards
//! this struct, per the §5 concurrency model ("long-running operations ... are
//! issued from that context but their completions re-enter as fresh events").

use std::collections::{HashMap, HashSet};

use crate::error::{Result, RuntimeError};
use crate::function_table::FunctionTable;
use crate::ids::{IdAllocator, ObjRefId, ObjStoreId, OperationId, WorkerId};
use crate::objref::ObjRefTable;
use crate::objstore_rec::ObjStoreRecord;
use crate::task::{TaskArg, TaskQueue, TaskRecord, TaskStatus};
use crate::worker::{WorkerRecord, WorkerState};

/// A command the scheduler's caller must carry out against a peer (an object
/// store or a worker) once the lock guarding [`Scheduler`] is released.
#[derive(Debug, Clone)]
pub enum Effect {
    StartDelivery {
        dest: ObjStoreId,
        dest_addr: String,
        src_addr: String,
        objref: ObjRefId,
    },
    ExecuteTask {
        worker: WorkerId,
        worker_addr: String,
        task: TaskDispatch,
    },
    DeallocateObject {
        store: ObjStoreId,
        store_addr: String,
        canonical: ObjRefId,
    },
    NotifyAlias {
        store: ObjStoreId,
        store_addr: String,
        alias: ObjRefId,
        canonical: ObjRefId,
    },
}

#[derive(Debug, Clone)]
pub struct TaskDispatch {
    pub operation_id: OperationId,
    pub function_name: String,
    pub args: Vec<TaskArg>,
    pub result_objrefs: Vec<ObjRefId>,
}

#[derive(Debug, Default)]
struct TransferState {
    attempts: u32,
    failed_sources: HashSet<ObjStoreId>,
}

/// A task matched to a worker but still waiting on one or more transfers
/// (§4.1.1: "decoupling match from dispatch"). Not re-matched while pending.
struct PendingDispatch {
    worker: WorkerId,
    remaining: HashSet<ObjRefId>,
}

#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    pub workers: Vec<WorkerRecord>,
    pub objstores: Vec<ObjStoreRecord>,
    pub queued_tasks: usize,
    pub pending_dispatch_tasks: usize,
}

pub struct Scheduler {
    worker_ids: IdAllocator,
    objstore_ids: IdAllocator,
    objref_ids: IdAllocator,
    operation_ids: IdAllocator,

    workers: HashMap<WorkerId, WorkerRecord>,
    objstores: HashMap<ObjStoreId, ObjStoreRecord>,
    functions: FunctionTable,
    objrefs: ObjRefTable,
    tasks: HashMap<OperationId, TaskRecord>,
    queue: TaskQueue,

    /// Workers matched to a task that is still in `pending_dispatch`. Excluded
    /// from matching even though their `state` remains `Idle` per spec.md §3's
    /// three-state enum — this set is the scheduler's bookkeeping for the
    /// "matched but not dispatched" window of §4.1.1, kept separate from the
    /// spec'd worker state rather than adding a fourth state.
    reserved_workers: HashSet<WorkerId>,
    pending_dispatch: HashMap<OperationId, PendingDispatch>,
    in_flight: HashMap<(ObjStoreId, ObjRefId), TransferState>,

    start_delivery_retries: u32,
}

impl Scheduler {
    pub fn new(start_delivery_retries: u32) -> Self {
        Self {
            worker_ids: IdAllocator::new(),
            objstore_ids: IdAllocator::new(),
            objref_ids: IdAllocator::new(),
            operation_ids: IdAllocator::new(),
            workers: HashMap::new(),
            objstores: HashMap::new(),
            functions: FunctionTable::new(),
            objrefs: ObjRefTable::new(),
            tasks: HashMap::new(),
            queue: TaskQueue::new(),
            reserved_workers: HashSet::new(),
            pending_dispatch: HashMap::new(),
            in_flight: HashMap::new(),
            start_delivery_retries,
        }
    }

    // ---- registration ----------------------------------------------------

    pub fn register_objstore(&mut self, addr: String) -> ObjStoreId {
        let id = ObjStoreId(self.objstore_ids.alloc());
        self.objstores.insert(
            id,
            ObjStoreRecord {
                objstore_id: id,
                objstore_address: addr,
            },
        );
        id
    }

    pub fn register_worker(&mut self, addr: String, objstore_id: ObjStoreId) -> Result<WorkerId> {
        if !self.objstores.contains_key(&objstore_id) {
            return Err(RuntimeError::UnknownObjStore(objstore_id));
        }
        let id = WorkerId(self.worker_ids.alloc());
        self.workers.insert(id, WorkerRecord::new(id, addr, objstore_id));
        Ok(id)
    }

    pub fn register_function(&mut self, worker: WorkerId, name: &str, arity: u32) -> Result<Vec<Effect>> {
        if !self.workers.contains_key(&worker) {
            return Err(RuntimeError::UnknownWorker(worker));
        }
        self.functions.register(worker, name, arity)?;
        Ok(self.run_scheduling_pass())
    }

    // ---- tasks & objects ---------------------------------------------------

    /// Returns `(result_objrefs, function_registered, effects)`. An unknown
    /// function allocates nothing and does not enqueue (spec.md §7
    /// `UnknownFunction`).
    pub fn submit_task(
        &mut self,
        function_name: &str,
        args: Vec<TaskArg>,
    ) -> Result<(Vec<ObjRefId>, bool, Vec<Effect>)> {
        let arity = match self.functions.get(function_name) {
            Some(entry) => entry.arity,
            None => return Ok((Vec::new(), false, Vec::new())),
        };

        let arg_refs: Vec<ObjRefId> = args.iter().filter_map(TaskArg::as_objref).collect();
        self.objrefs.increment(&arg_refs)?;

        let mut result_objrefs = Vec::with_capacity(arity as usize);
        for _ in 0..arity {
            let id = ObjRefId(self.objref_ids.alloc());
            self.objrefs.alloc(id, 1);
            result_objrefs.push(id);
        }

        let op = OperationId(self.operation_ids.alloc());
        let task = TaskRecord::new(op, function_name.to_string(), args, result_objrefs.clone());
        self.tasks.insert(op, task);
        self.queue.push(op);

        let effects = self.run_scheduling_pass();
        Ok((result_objrefs, true, effects))
    }

    pub fn push_obj(&mut self) -> ObjRefId {
        let id = ObjRefId(self.objref_ids.alloc());
        self.objrefs.alloc(id, 1);
        id
    }

    pub fn request_obj(&mut self, worker: WorkerId, objref: ObjRefId) -> Result<Vec<Effect>> {
        let dest = self
            .workers
            .get(&worker)
            .ok_or(RuntimeError::UnknownWorker(worker))?
            .objstore_id;
        let canonical = self.objrefs.canonical_of(objref)?;
        let locations = self.objrefs.locations(canonical)?;
        if locations.contains(&dest) || self.in_flight.contains_key(&(dest, canonical)) {
            return Ok(Vec::new());
        }
        let Some(&src) = locations.iter().min() else {
            return Ok(Vec::new()); // not ready anywhere yet; caller retries later
        };
        self.in_flight.insert((dest, canonical), TransferState::default());
        let dest_addr = self.objstores[&dest].objstore_address.clone();
        let src_addr = self.objstores[&src].objstore_address.clone();
        Ok(vec![Effect::StartDelivery {
            dest,
            dest_addr,
            src_addr,
            objref: canonical,
        }])
    }

    /// spec.md §4.1.2 + §9 Open Question: notify every store in
    /// `locations(alias) ∪ locations(canonical)`.
    pub fn alias_objrefs(&mut self, alias: ObjRefId, target: ObjRefId) -> Result<Vec<Effect>> {
        let mut stores: HashSet<ObjStoreId> = HashSet::new();
        if let Ok(locs) = self.objrefs.locations(alias) {
            stores.extend(locs);
        }
        if let Ok(resolved_before) = self.objrefs.canonical_of(target) {
            if let Ok(locs) = self.objrefs.locations(resolved_before) {
                stores.extend(locs);
            }
        }

        let resolved = self.objrefs.alias(alias, target)?;

        let mut effects: Vec<Effect> = stores
            .into_iter()
            .filter_map(|s| {
                self.objstores.get(&s).map(|rec| Effect::NotifyAlias {
                    store: s,
                    store_addr: rec.objstore_address.clone(),
                    alias,
                    canonical: resolved,
                })
            })
            .collect();
        effects.extend(self.run_scheduling_pass());
        Ok(effects)
    }

    pub fn obj_ready(&mut self, objref: ObjRefId, store: ObjStoreId) -> Result<Vec<Effect>> {
        let outcome = self.objrefs.mark_ready(objref, store)?;
        let mut effects = self.retired_to_effects(outcome.retired);
        effects.extend(self.advance_pending_dispatch(outcome.canonical, store));
        if outcome.newly_ready {
            effects.extend(self.run_scheduling_pass());
        }
        Ok(effects)
    }

    pub fn increment_ref_count(&mut self, objrefs: &[ObjRefId]) -> Result<()> {
        self.objrefs.increment(objrefs)
    }

    pub fn decrement_ref_count(&mut self, objrefs: &[ObjRefId]) -> Result<Vec<Effect>> {
        let retired = self.objrefs.decrement(objrefs)?;
        Ok(self.retired_to_effects(retired))
    }

    pub fn add_contained_objrefs(&mut self, container: ObjRefId, contained: Vec<ObjRefId>) -> Result<()> {
        self.objrefs.add_contained(container, contained)
    }

    /// spec.md's `ReadyForNewTask`: resolves the previous task's outcome (if
    /// any) and transitions the worker to idle, then runs a matching pass.
    pub fn ready_for_new_task(
        &mut self,
        worker: WorkerId,
        prev_outcome: Option<(bool, Option<String>)>,
    ) -> Result<Vec<Effect>> {
        if !self.workers.contains_key(&worker) {
            return Err(RuntimeError::UnknownWorker(worker));
        }
        let mut effects = Vec::new();
        if let Some((succeeded, err)) = prev_outcome {
            let prev_task = self.workers.get_mut(&worker).unwrap().current_task.take();
            if let Some(op) = prev_task {
                effects.extend(self.finish_task(op, succeeded, err)?);
            }
        }
        let w = self.workers.get_mut(&worker).unwrap();
        w.state = WorkerState::Idle;
        w.current_task = None;
        effects.extend(self.run_scheduling_pass());
        Ok(effects)
    }

    pub fn scheduler_info(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            workers: self.workers.values().cloned().collect(),
            objstores: self.objstores.values().cloned().collect(),
            queued_tasks: self.queue.len(),
            pending_dispatch_tasks: self.pending_dispatch.len(),
        }
    }

    pub fn task_info(&self, op: OperationId) -> Result<TaskRecord> {
        self.tasks
            .get(&op)
            .cloned()
            .ok_or(RuntimeError::UnknownOperation(op))
    }

    /// Called by the `rt-scheduler` binary's effect executor when an outbound
    /// `StartDelivery` it issued failed at the transport level (§5: "retries
    /// `StartDelivery` a bounded number of times with a different source
    /// store if one exists; exhausting sources fails the dependent task").
    pub fn transfer_failed(&mut self, dest: ObjStoreId, objref: ObjRefId, failed_source: ObjStoreId) -> Vec<Effect> {
        let state = self.in_flight.entry((dest, objref)).or_default();
        state.failed_sources.insert(failed_source);
        state.attempts += 1;
        let attempts = state.attempts;
        let failed_sources = state.failed_sources.clone();

        let locations = self.objrefs.locations(objref).unwrap_or_default();
        let candidate = locations
            .iter()
            .copied()
            .filter(|s| *s != dest && !failed_sources.contains(s))
            .min();

        if attempts <= self.start_delivery_retries {
            if let Some(src) = candidate {
                if let (Some(dst_rec), Some(src_rec)) = (self.objstores.get(&dest), self.objstores.get(&src)) {
                    return vec![Effect::StartDelivery {
                        dest,
                        dest_addr: dst_rec.objstore_address.clone(),
                        src_addr: src_rec.objstore_address.clone(),
                        objref,
                    }];
                }
            }
        }

        self.in_flight.remove(&(dest, objref));
        self.fail_pending_on_transfer(dest, objref)
    }

    // ---- internals ---------------------------------------------------------

    fn fail_pending_on_transfer(&mut self, dest: ObjStoreId, objref: ObjRefId) -> Vec<Effect> {
        let mut effects = Vec::new();
        let ops: Vec<OperationId> = self
            .pending_dispatch
            .iter()
            .filter(|(_, pd)| {
                self.workers.get(&pd.worker).map(|w| w.objstore_id) == Some(dest) && pd.remaining.contains(&objref)
            })
            .map(|(op, _)| *op)
            .collect();

        for op in ops {
            if let Some(pd) = self.pending_dispatch.remove(&op) {
                self.reserved_workers.remove(&pd.worker);
            }
            if let Some(task) = self.tasks.get_mut(&op) {
                task.status = TaskStatus::Failed;
                task.error_message = Some(
                    RuntimeError::TransferFailure { objref, dest }.to_string(),
                );
                let arg_refs: Vec<ObjRefId> = task.objref_args().collect();
                if let Ok(retired) = self.objrefs.decrement(&arg_refs) {
                    effects.extend(self.retired_to_effects(retired));
                }
            }
        }
        effects.extend(self.run_scheduling_pass());
        effects
    }

    fn advance_pending_dispatch(&mut self, canonical: ObjRefId, store: ObjStoreId) -> Vec<Effect> {
        let mut effects = Vec::new();
        let ops: Vec<OperationId> = self
            .pending_dispatch
            .iter()
            .filter(|(_, pd)| self.workers.get(&pd.worker).map(|w| w.objstore_id) == Some(store))
            .map(|(op, _)| *op)
            .collect();

        for op in ops {
            if let Some(pd) = self.pending_dispatch.get_mut(&op) {
                pd.remaining.remove(&canonical);
                self.in_flight.remove(&(store, canonical));
                if pd.remaining.is_empty() {
                    let worker = pd.worker;
                    self.pending_dispatch.remove(&op);
                    self.reserved_workers.remove(&worker);
                    effects.push(self.dispatch(op, worker));
                }
            }
        }
        effects
    }

    fn finish_task(&mut self, op: OperationId, succeeded: bool, err: Option<String>) -> Result<Vec<Effect>> {
        let task = self
            .tasks
            .get(&op)
            .cloned()
            .ok_or(RuntimeError::UnknownOperation(op))?;
        let arg_refs: Vec<ObjRefId> = task.objref_args().collect();

        if let Some(t) = self.tasks.get_mut(&op) {
            t.status = if succeeded { TaskStatus::Succeeded } else { TaskStatus::Failed };
            t.error_message = err;
        }

        let retired = self.objrefs.decrement(&arg_refs)?;
        Ok(self.retired_to_effects(retired))
    }

    fn retired_to_effects(&self, retired: Vec<crate::objref::RetireEffect>) -> Vec<Effect> {
        let mut effects = Vec::new();
        for r in retired {
            for store in r.locations {
                if let Some(rec) = self.objstores.get(&store) {
                    effects.push(Effect::DeallocateObject {
                        store,
                        store_addr: rec.objstore_address.clone(),
                        canonical: r.canonical,
                    });
                }
            }
        }
        effects
    }

    fn locality_score(&mut self, w: WorkerId, canonical_args: &[ObjRefId]) -> usize {
        let store = self.workers[&w].objstore_id;
        canonical_args
            .iter()
            .filter(|c| self.objrefs.locations(**c).map(|l| l.contains(&store)).unwrap_or(false))
            .count()
    }

    fn dispatch(&mut self, op: OperationId, worker: WorkerId) -> Effect {
        let worker_addr = self.workers[&worker].worker_address.clone();
        {
            let w = self.workers.get_mut(&worker).unwrap();
            w.state = WorkerState::Busy;
            w.current_task = Some(op);
        }
        let task = self.tasks.get_mut(&op).unwrap();
        task.status = TaskStatus::Running;
        task.assigned_worker = Some(worker);
        Effect::ExecuteTask {
            worker,
            worker_addr,
            task: TaskDispatch {
                operation_id: op,
                function_name: task.function_name.clone(),
                args: task.args.clone(),
                result_objrefs: task.result_objrefs.clone(),
            },
        }
    }

    /// spec.md §4.1.1: the scheduling pass. Runs on every event that could
    /// create a (queued task, idle worker) match.
    fn run_scheduling_pass(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        let candidates: Vec<OperationId> = self.queue.iter().collect();

        for op in candidates {
            let task = match self.tasks.get(&op) {
                Some(t) => t.clone(),
                None => continue,
            };
            if task.status != TaskStatus::Queued {
                self.queue.remove(op);
                continue;
            }

            let objref_args: Vec<ObjRefId> = task.objref_args().collect();
            let mut canonical_args = Vec::with_capacity(objref_args.len());
            let mut all_ready = true;
            for r in &objref_args {
                match self.objrefs.is_ready(*r) {
                    Ok(true) => canonical_args.push(self.objrefs.canonical_of(*r).unwrap()),
                    _ => {
                        all_ready = false;
                        break;
                    }
                }
            }
            if !all_ready {
                continue;
            }

            let Some(entry) = self.functions.get(&task.function_name) else {
                continue;
            };
            let mut idle_eligible: Vec<WorkerId> = entry
                .eligible_workers
                .iter()
                .copied()
                .filter(|w| {
                    matches!(self.workers.get(w).map(|r| r.state), Some(WorkerState::Idle))
                        && !self.reserved_workers.contains(w)
                })
                .collect();
            if idle_eligible.is_empty() {
                continue;
            }
            idle_eligible.sort();

            let mut chosen = idle_eligible[0];
            let mut chosen_score = self.locality_score(chosen, &canonical_args);
            for &w in &idle_eligible[1..] {
                let score = self.locality_score(w, &canonical_args);
                if score > chosen_score {
                    chosen = w;
                    chosen_score = score;
                }
            }

            let dest = self.workers[&chosen].objstore_id;
            let mut missing = Vec::new();
            for &c in &canonical_args {
                let locs = self.objrefs.locations(c).unwrap_or_default();
                if !locs.contains(&dest) {
                    missing.push(c);
                }
            }

            self.queue.remove(op);

            if missing.is_empty() {
                effects.push(self.dispatch(op, chosen));
            } else {
                for &c in &missing {
                    if self.in_flight.contains_key(&(dest, c)) {
                        continue;
                    }
                    let locs = self.objrefs.locations(c).unwrap_or_default();
                    if let Some(&src) = locs.iter().filter(|s| **s != dest).min() {
                        self.in_flight.insert((dest, c), TransferState::default());
                        let dest_addr = self.objstores[&dest].objstore_address.clone();
                        let src_addr = self.objstores[&src].objstore_address.clone();
                        effects.push(Effect::StartDelivery {
                            dest,
                            dest_addr,
                            src_addr,
                            objref: c,
                        });
                    }
                }
                self.reserved_workers.insert(chosen);
                self.pending_dispatch.insert(
                    op,
                    PendingDispatch {
                        worker: chosen,
                        remaining: missing.into_iter().collect(),
                    },
                );
            }
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_single_node() -> (Scheduler, ObjStoreId, WorkerId) {
        let mut s = Scheduler::new(3);
        let store = s.register_objstore("store-1:9001".into());
        let worker = s.register_worker("worker-1:9101".into(), store).unwrap();
        s.register_function(worker, "id", 1).unwrap();
        s.ready_for_new_task(worker, None).unwrap();
        (s, store, worker)
    }

    /// spec.md §8 scenario 1: single node, identity task.
    #[test]
    fn single_node_identity_task() {
        let (mut s, store, worker) = setup_single_node();

        let r1 = s.push_obj();
        let effects = s.obj_ready(r1, store).unwrap();
        assert!(effects.is_empty(), "no task queued yet");

        let (results, registered, effects) = s.submit_task("id", vec![TaskArg::Ref(r1)]).unwrap();
        assert!(registered);
        assert_eq!(results.len(), 1);
        assert_eq!(
            effects.len(),
            1,
            "argument already local, single idle worker -> immediate dispatch"
        );
        match &effects[0] {
            Effect::ExecuteTask { worker: w, .. } => assert_eq!(*w, worker),
            other => panic!("expected ExecuteTask, got {other:?}"),
        }
    }

    /// spec.md §8 scenario 2: cross-node transfer.
    #[test]
    fn cross_node_transfer_before_dispatch() {
        let mut s = Scheduler::new(3);
        let s1 = s.register_objstore("store-1:9001".into());
        let s2 = s.register_objstore("store-2:9001".into());
        let w2 = s.register_worker("worker-2:9101".into(), s2).unwrap();
        s.register_function(w2, "id", 1).unwrap();
        s.ready_for_new_task(w2, None).unwrap();

        let r1 = s.push_obj();
        s.obj_ready(r1, s1).unwrap();

        let (_, registered, effects) = s.submit_task("id", vec![TaskArg::Ref(r1)]).unwrap();
        assert!(registered);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::StartDelivery { dest, .. } if dest == s2));

        // transfer completes
        let effects = s.obj_ready(r1, s2).unwrap();
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::ExecuteTask { worker, .. } if worker == w2));
    }

    /// spec.md §8 scenario 6: unknown function.
    #[test]
    fn unknown_function_does_not_enqueue() {
        let mut s = Scheduler::new(3);
        let (results, registered, effects) = s.submit_task("bogus", vec![]).unwrap();
        assert!(!registered);
        assert!(results.is_empty());
        assert!(effects.is_empty());
        assert_eq!(s.scheduler_info().queued_tasks, 0);
    }

    /// spec.md §8 scenario 5: failed task.
    #[test]
    fn failed_task_is_recorded_and_releases_arg_holds() {
        let (mut s, store, worker) = setup_single_node();
        let r1 = s.push_obj();
        s.obj_ready(r1, store).unwrap();
        let (results, _, _) = s.submit_task("id", vec![TaskArg::Ref(r1)]).unwrap();
        let op = {
            let info = s.scheduler_info();
            assert_eq!(info.pending_dispatch_tasks, 0);
            // recover the operation id by looking at the dispatched task through worker state
            s.workers.get(&worker).unwrap().current_task.unwrap()
        };

        s.ready_for_new_task(worker, Some((false, Some("boom".into())))).unwrap();

        let task = s.task_info(op).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("boom"));
        assert_eq!(task.result_objrefs, results);
    }

    /// spec.md §4.1.3: a failed `StartDelivery` retries against a different
    /// source store when one exists, rather than failing the task outright.
    #[test]
    fn transfer_failed_retries_with_a_different_source() {
        let mut s = Scheduler::new(3);
        let s1 = s.register_objstore("store-1:9001".into());
        let s2 = s.register_objstore("store-2:9001".into());
        let s3 = s.register_objstore("store-3:9001".into());
        let w3 = s.register_worker("worker-3:9101".into(), s3).unwrap();
        s.register_function(w3, "id", 1).unwrap();
        s.ready_for_new_task(w3, None).unwrap();

        let r1 = s.push_obj();
        s.obj_ready(r1, s1).unwrap();
        s.obj_ready(r1, s2).unwrap();

        let (_, registered, effects) = s.submit_task("id", vec![TaskArg::Ref(r1)]).unwrap();
        assert!(registered);
        assert_eq!(effects.len(), 1);
        let first_src = match &effects[0] {
            Effect::StartDelivery { dest, src_addr, .. } => {
                assert_eq!(*dest, s3);
                src_addr.clone()
            }
            other => panic!("expected StartDelivery, got {other:?}"),
        };

        let effects = s.transfer_failed(s3, r1, if first_src == "store-1:9001" { s1 } else { s2 });
        assert_eq!(effects.len(), 1, "retries against the remaining source");
        match &effects[0] {
            Effect::StartDelivery { dest, src_addr, .. } => {
                assert_eq!(*dest, s3);
                assert_ne!(*src_addr, first_src);
            }
            other => panic!("expected StartDelivery, got {other:?}"),
        }
    }

    /// spec.md §4.1.3: exhausting every candidate source fails the dependent
    /// task rather than retrying forever.
    #[test]
    fn transfer_failed_exhausting_sources_fails_the_task() {
        let mut s = Scheduler::new(3);
        let s1 = s.register_objstore("store-1:9001".into());
        let s2 = s.register_objstore("store-2:9001".into());
        let w2 = s.register_worker("worker-2:9101".into(), s2).unwrap();
        s.register_function(w2, "id", 1).unwrap();
        s.ready_for_new_task(w2, None).unwrap();

        let r1 = s.push_obj();
        s.obj_ready(r1, s1).unwrap();

        let (results, _, effects) = s.submit_task("id", vec![TaskArg::Ref(r1)]).unwrap();
        assert_eq!(effects.len(), 1);
        let op = s
            .pending_dispatch
            .iter()
            .find(|(_, pd)| pd.worker == w2)
            .map(|(op, _)| *op)
            .expect("task pending on the transfer");

        // s1 is the only source; failing against it exhausts every candidate.
        s.transfer_failed(s2, r1, s1);

        let task = s.task_info(op).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.result_objrefs, results);
    }

    /// spec.md §8 P6: `SubmitTask` returns distinct, previously-unused refs.
    #[test]
    fn submit_task_allocates_distinct_refs() {
        let mut s = Scheduler::new(3);
        let store = s.register_objstore("s:1".into());
        let w = s.register_worker("w:1".into(), store).unwrap();
        s.register_function(w, "pair", 2).unwrap();
        let (r1, _, _) = s.submit_task("pair", vec![]).unwrap();
        let (r2, _, _) = s.submit_task("pair", vec![]).unwrap();
        let mut all = r1.clone();
        all.extend(r2.clone());
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }
}
