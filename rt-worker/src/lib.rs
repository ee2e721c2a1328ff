//! `rt-worker` hosts the `WorkerService` gRPC service (spec.md §4.3, §6) and
//! drives the worker loop as a client of both `Scheduler` and its co-located
//! `ObjStore`. Split into a library so `tests/integration.rs` can exercise
//! `functions`/`loop_` directly, mirroring the teacher's crate layout.

pub mod client;
pub mod functions;
pub mod grpc;
pub mod loop_;
