//! `rt-objstore` hosts the `ObjStore` gRPC service (spec.md §4.2, §6) over an
//! `rt_core::objstore_state::ObjectStoreBackend`. Split into a library so
//! `tests/integration.rs` can exercise `grpc`/`client` directly, mirroring the
//! teacher's `bpmn-lite-server` crate layout.

pub mod client;
pub mod grpc;
