//! spec.md §3 "Worker record".

use crate::ids::{ObjStoreId, OperationId, WorkerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Registering,
    Idle,
    Busy,
}

#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub worker_id: WorkerId,
    pub worker_address: String,
    pub objstore_id: ObjStoreId,
    pub state: WorkerState,
    pub current_task: Option<OperationId>,
}

impl WorkerRecord {
    pub fn new(worker_id: WorkerId, worker_address: String, objstore_id: ObjStoreId) -> Self {
        Self {
            worker_id,
            worker_address,
            objstore_id,
            state: WorkerState::Registering,
            current_task: None,
        }
    }
}
