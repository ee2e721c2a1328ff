//! Core state machines shared by the `rt-scheduler`, `rt-objstore` and
//! `rt-worker` binaries: the object reference / refcount graph, the function
//! table, the task queue, the scheduler itself, and per-node object store
//! state. Pure logic only — no gRPC, no sockets; `rt-proto` and the binary
//! crates own the network surface.

pub mod config;
pub mod error;
pub mod function_table;
pub mod ids;
pub mod objref;
pub mod objstore_rec;
pub mod objstore_state;
pub mod payload;
pub mod scheduler;
pub mod task;
pub mod worker;

pub use error::{Result, RuntimeError};
