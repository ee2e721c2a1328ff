//! The error kinds of spec.md §7, as a structured enum callers can branch on.
//!
//! Invariant violations (I1-I5 in spec.md §3) are not represented here: per §7
//! they are fatal bugs in the scheduler, not recoverable caller errors, and are
//! raised as panics at the point of detection.

use crate::ids::{ObjRefId, ObjStoreId, OperationId, WorkerId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("function {name:?} registered with arity {existing}, worker {worker} attempted {attempted}")]
    ArityMismatch {
        name: String,
        existing: u32,
        attempted: u32,
        worker: WorkerId,
    },

    #[error("aliasing {alias} to {target} would create a cycle through {through}")]
    AliasCycle {
        alias: ObjRefId,
        target: ObjRefId,
        through: ObjRefId,
    },

    #[error("objref {0} has been retired")]
    RetiredObjRef(ObjRefId),

    #[error("task {operation} failed: {message}")]
    TaskFailure {
        operation: OperationId,
        message: String,
    },

    #[error("transfer of {objref} to store {dest} failed after exhausting candidate sources")]
    TransferFailure {
        objref: ObjRefId,
        dest: ObjStoreId,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),

    #[error("unknown object store {0}")]
    UnknownObjStore(ObjStoreId),

    #[error("unknown operation {0}")]
    UnknownOperation(OperationId),

    #[error("unknown objref {0}")]
    UnknownObjRef(ObjRefId),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
