//! Per-node object store state (spec.md §4.2), grounded on the teacher's
//! `ProcessStore` trait / `InMemoryProcessStore` split: a trait for the
//! operations an object store backend must support, plus the one in-memory
//! implementation this repo ships, guarded by a single `tokio::sync::RwLock`
//! the way the teacher guards its `Inner`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, RuntimeError};
use crate::ids::ObjRefId;
use crate::payload::Payload;

#[derive(Debug, Clone, Default)]
pub struct ObjStoreSnapshot {
    pub object_count: usize,
    pub bytes_stored: u64,
    pub in_flight_deliveries: usize,
}

/// The operations `rt-objstore`'s gRPC layer drives against local state.
/// `async_trait` so a future backend (e.g. spill-to-disk) can be swapped in
/// without touching the service layer, the way the teacher's `grpc.rs` only
/// ever talks to `Arc<dyn ProcessStore>`.
#[async_trait]
pub trait ObjectStoreBackend: Send + Sync {
    /// One-shot write (`PutObj`, SPEC_FULL.md §B). Errors if `objref` already
    /// has a finalized payload (L1: finalized payloads are immutable).
    async fn put_obj(&self, objref: ObjRefId, metadata_offset: u64, bytes: Vec<u8>) -> Result<()>;

    /// `GetObj` (SPEC_FULL.md §B): resolves any locally-known alias first, then
    /// returns the payload. Missing or not-yet-finalized is surfaced the same
    /// way: a task that never wrote its result leaves its ref permanently
    /// absent here, which is how a caller discovers a failed task's ref is
    /// unreadable (spec.md §8 scenario 5) without the store tracking tasks.
    async fn get_obj(&self, objref: ObjRefId) -> Result<Payload>;

    /// Begins a streamed delivery (`StartDelivery`). Returns `false` if a
    /// delivery for `objref` is already in flight or the object is already
    /// present, in which case the caller must not start a second transfer
    /// (spec.md §8: "two consecutive StartDelivery ... cause exactly one").
    async fn begin_delivery(&self, objref: ObjRefId, total_size: u64, metadata_offset: u64) -> Result<bool>;

    /// Applies one chunk of an in-progress delivery (`StreamObjTo`'s receive
    /// side). `offset` is relative to the payload's `bytes` buffer.
    async fn write_chunk(&self, objref: ObjRefId, offset: u64, data: &[u8]) -> Result<()>;

    /// Finalizes a delivery once every chunk has arrived; the caller is then
    /// responsible for reporting `ObjReady` to the scheduler.
    async fn finalize_delivery(&self, objref: ObjRefId) -> Result<()>;

    /// Reads out a whole local payload for the sending side of `StreamObjTo`.
    async fn read_for_transfer(&self, objref: ObjRefId) -> Result<Payload>;

    /// `NotifyAlias`: records `alias -> canonical` in this store's local alias
    /// mirror so future `GetObj(alias)` calls resolve to `canonical`'s bytes.
    async fn notify_alias(&self, alias: ObjRefId, canonical: ObjRefId);

    /// `DeallocateObject`: frees the local payload for a retired canonical ref.
    async fn deallocate(&self, canonical: ObjRefId);

    async fn snapshot(&self) -> ObjStoreSnapshot;
}

#[derive(Default)]
struct Inner {
    payloads: HashMap<ObjRefId, Payload>,
    aliases: HashMap<ObjRefId, ObjRefId>,
    in_flight: HashSet<ObjRefId>,
}

impl Inner {
    fn resolve_local(&self, r: ObjRefId) -> ObjRefId {
        let mut cur = r;
        let mut seen = HashSet::new();
        while let Some(&next) = self.aliases.get(&cur) {
            if !seen.insert(cur) {
                break; // local mirror out of sync; avoid spinning forever
            }
            cur = next;
        }
        cur
    }
}

pub struct InMemoryObjectStore {
    inner: RwLock<Inner>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStoreBackend for InMemoryObjectStore {
    async fn put_obj(&self, objref: ObjRefId, metadata_offset: u64, bytes: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.payloads.get(&objref).map(|p| p.finalized).unwrap_or(false) {
            return Err(RuntimeError::ProtocolViolation(format!(
                "objref {objref} already has a finalized payload"
            )));
        }
        let total_size = bytes.len() as u64;
        inner.payloads.insert(objref, Payload::whole(total_size, metadata_offset, bytes));
        Ok(())
    }

    async fn get_obj(&self, objref: ObjRefId) -> Result<Payload> {
        let inner = self.inner.read().await;
        let local = inner.resolve_local(objref);
        inner
            .payloads
            .get(&local)
            .filter(|p| p.finalized)
            .cloned()
            .ok_or(RuntimeError::UnknownObjRef(objref))
    }

    async fn begin_delivery(&self, objref: ObjRefId, total_size: u64, metadata_offset: u64) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.payloads.get(&objref).map(|p| p.finalized).unwrap_or(false) {
            return Ok(false);
        }
        if !inner.in_flight.insert(objref) {
            return Ok(false);
        }
        inner
            .payloads
            .entry(objref)
            .or_insert_with(|| Payload::preallocate(total_size, metadata_offset));
        Ok(true)
    }

    async fn write_chunk(&self, objref: ObjRefId, offset: u64, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().await;
        let payload = inner
            .payloads
            .get_mut(&objref)
            .ok_or(RuntimeError::UnknownObjRef(objref))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > payload.bytes.len() {
            return Err(RuntimeError::ProtocolViolation(format!(
                "chunk for {objref} overruns preallocated buffer"
            )));
        }
        payload.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    async fn finalize_delivery(&self, objref: ObjRefId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.in_flight.remove(&objref);
        let payload = inner
            .payloads
            .get_mut(&objref)
            .ok_or(RuntimeError::UnknownObjRef(objref))?;
        payload.finalized = true;
        Ok(())
    }

    async fn read_for_transfer(&self, objref: ObjRefId) -> Result<Payload> {
        let inner = self.inner.read().await;
        let local = inner.resolve_local(objref);
        inner
            .payloads
            .get(&local)
            .filter(|p| p.finalized)
            .cloned()
            .ok_or(RuntimeError::UnknownObjRef(objref))
    }

    async fn notify_alias(&self, alias: ObjRefId, canonical: ObjRefId) {
        let mut inner = self.inner.write().await;
        inner.aliases.insert(alias, canonical);
    }

    async fn deallocate(&self, canonical: ObjRefId) {
        let mut inner = self.inner.write().await;
        inner.payloads.remove(&canonical);
        inner.aliases.retain(|_, v| *v != canonical);
    }

    async fn snapshot(&self) -> ObjStoreSnapshot {
        let inner = self.inner.read().await;
        ObjStoreSnapshot {
            object_count: inner.payloads.len(),
            bytes_stored: inner.payloads.values().map(|p| p.total_size).sum(),
            in_flight_deliveries: inner.in_flight.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryObjectStore::new();
        store.put_obj(ObjRefId(1), 4, vec![1, 2, 3, 4]).await.unwrap();
        let payload = store.get_obj(ObjRefId(1)).await.unwrap();
        assert_eq!(payload.bytes, vec![1, 2, 3, 4]);
        assert_eq!(payload.metadata_offset, 4);
    }

    #[tokio::test]
    async fn put_twice_is_rejected() {
        let store = InMemoryObjectStore::new();
        store.put_obj(ObjRefId(1), 0, vec![1]).await.unwrap();
        let err = store.put_obj(ObjRefId(1), 0, vec![2]).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn streamed_delivery_then_finalize() {
        let store = InMemoryObjectStore::new();
        assert!(store.begin_delivery(ObjRefId(1), 4, 0).await.unwrap());
        // a second StartDelivery for the same ref is a no-op.
        assert!(!store.begin_delivery(ObjRefId(1), 4, 0).await.unwrap());

        store.write_chunk(ObjRefId(1), 0, &[9, 9]).await.unwrap();
        store.write_chunk(ObjRefId(1), 2, &[9, 9]).await.unwrap();
        assert!(store.get_obj(ObjRefId(1)).await.is_err(), "not finalized yet");

        store.finalize_delivery(ObjRefId(1)).await.unwrap();
        let payload = store.get_obj(ObjRefId(1)).await.unwrap();
        assert_eq!(payload.bytes, vec![9, 9, 9, 9]);
    }

    #[tokio::test]
    async fn alias_resolves_to_canonical_bytes() {
        let store = InMemoryObjectStore::new();
        store.put_obj(ObjRefId(2), 0, vec![7]).await.unwrap();
        store.notify_alias(ObjRefId(1), ObjRefId(2)).await;
        let payload = store.get_obj(ObjRefId(1)).await.unwrap();
        assert_eq!(payload.bytes, vec![7]);
    }

    #[tokio::test]
    async fn deallocate_frees_payload_and_aliases() {
        let store = InMemoryObjectStore::new();
        store.put_obj(ObjRefId(2), 0, vec![7]).await.unwrap();
        store.notify_alias(ObjRefId(1), ObjRefId(2)).await;
        store.deallocate(ObjRefId(2)).await;
        assert!(store.get_obj(ObjRefId(2)).await.is_err());
        assert!(store.get_obj(ObjRefId(1)).await.is_err());
    }
}
