//! Generated protobuf/tonic code for the three wire services (SPEC_FULL.md §B).

#[allow(clippy::enum_variant_names)]
pub mod scheduler {
    tonic::include_proto!("rt.scheduler.v1");
}

#[allow(clippy::enum_variant_names)]
pub mod objstore {
    tonic::include_proto!("rt.objstore.v1");
}

#[allow(clippy::enum_variant_names)]
pub mod worker {
    tonic::include_proto!("rt.worker.v1");
}
