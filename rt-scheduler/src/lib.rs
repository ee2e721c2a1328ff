//! `rt-scheduler` hosts the `Scheduler` gRPC service (spec.md §6) over the
//! `rt_core::scheduler::Scheduler` state machine. Split into a library so
//! `tests/integration.rs` can exercise `grpc`/`client` directly, mirroring the
//! teacher's `bpmn-lite-server` crate layout.

pub mod client;
pub mod grpc;
