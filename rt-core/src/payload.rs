//! spec.md §3 "Object payload (in object store)".

/// `metadata_offset` partitions `bytes` into a serialized-object prefix and a
/// binary-buffer suffix; the store itself treats both halves opaquely (§3).
#[derive(Debug, Clone)]
pub struct Payload {
    pub total_size: u64,
    pub metadata_offset: u64,
    pub bytes: Vec<u8>,
    pub finalized: bool,
}

impl Payload {
    /// A payload written in one shot (e.g. via `PutObj`, §B of SPEC_FULL.md):
    /// immediately finalized (L1: finalized payloads are immutable).
    pub fn whole(total_size: u64, metadata_offset: u64, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len() as u64, total_size);
        Self {
            total_size,
            metadata_offset,
            bytes,
            finalized: true,
        }
    }

    /// Preallocates a buffer for a streamed delivery whose first chunk carries
    /// `total_size`/`metadata_offset` (spec.md §4.2 `StartDelivery`).
    pub fn preallocate(total_size: u64, metadata_offset: u64) -> Self {
        Self {
            total_size,
            metadata_offset,
            bytes: vec![0u8; total_size as usize],
            finalized: false,
        }
    }
}
