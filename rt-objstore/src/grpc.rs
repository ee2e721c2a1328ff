use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use rt_core::ids::{ObjRefId, ObjStoreId};
use rt_core::objstore_state::ObjectStoreBackend;
use rt_core::RuntimeError;
use tokio::sync::Mutex;
use tonic::{Request, Response, Status};

use crate::client::{PeerClients, SchedulerHandle};

#[allow(clippy::enum_variant_names)]
pub mod proto {
    pub use rt_proto::objstore::*;
}

use proto::obj_store_client::ObjStoreClient;
use proto::obj_store_server::ObjStore;
use proto::*;

fn runtime_err(e: RuntimeError) -> Status {
    match e {
        RuntimeError::UnknownObjRef(_) => Status::not_found(e.to_string()),
        RuntimeError::ProtocolViolation(_) => Status::failed_precondition(e.to_string()),
        _ => Status::internal(e.to_string()),
    }
}

pub struct ObjStoreService {
    pub objstore_id: ObjStoreId,
    pub backend: Arc<dyn ObjectStoreBackend>,
    pub scheduler: Arc<SchedulerHandle>,
    pub peers: Arc<PeerClients>,
    pub chunk_size: usize,
    /// Dedups concurrent `StartDelivery` calls for the same ref (spec.md §8:
    /// "two consecutive StartDelivery ... cause exactly one transfer"). Keyed
    /// independently of the backend's own in-flight tracking because the
    /// backend only learns `total_size` from the first chunk of the pull this
    /// very call would start. The entry is removed once the spawned pull
    /// settles, success or failure, so a retried `StartDelivery` for the same
    /// ref isn't permanently swallowed as a no-op.
    in_flight_pulls: Arc<Mutex<HashSet<ObjRefId>>>,
}

impl ObjStoreService {
    pub fn new(
        objstore_id: ObjStoreId,
        backend: Arc<dyn ObjectStoreBackend>,
        scheduler: Arc<SchedulerHandle>,
        peers: Arc<PeerClients>,
        chunk_size: usize,
    ) -> Self {
        Self {
            objstore_id,
            backend,
            scheduler,
            peers,
            chunk_size,
            in_flight_pulls: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

/// Pulls `objref`'s bytes from `src_addr` via `StreamObjTo`, validating that
/// `total_size`/`metadata_offset` stay invariant across chunks (§6, §9), then
/// finalizes the local payload.
async fn run_pull(
    backend: &Arc<dyn ObjectStoreBackend>,
    peers: &Arc<PeerClients>,
    objref: ObjRefId,
    src_addr: &str,
) -> anyhow::Result<()> {
    let mut client: ObjStoreClient<_> = peers.objstore_client(src_addr).await?;
    let mut stream = client
        .stream_obj_to(StreamObjToRequest { objref_id: objref.0 })
        .await?
        .into_inner();

    let mut expected: Option<(u64, u64)> = None;
    while let Some(chunk) = stream.message().await? {
        match expected {
            None => {
                expected = Some((chunk.total_size, chunk.metadata_offset));
                backend.begin_delivery(objref, chunk.total_size, chunk.metadata_offset).await?;
            }
            Some((total_size, metadata_offset)) => {
                if chunk.total_size != total_size || chunk.metadata_offset != metadata_offset {
                    anyhow::bail!(
                        "chunk for {objref} changed total_size/metadata_offset mid-stream"
                    );
                }
            }
        }
        if !chunk.data.is_empty() {
            backend.write_chunk(objref, chunk.offset, &chunk.data).await?;
        }
    }
    backend.finalize_delivery(objref).await?;
    Ok(())
}

#[tonic::async_trait]
impl ObjStore for ObjStoreService {
    async fn start_delivery(&self, request: Request<StartDeliveryRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let objref = ObjRefId(req.objref_id);

        {
            let mut inflight = self.in_flight_pulls.lock().await;
            if !inflight.insert(objref) {
                return Ok(Response::new(Empty {})); // already pulling; no-op
            }
        }

        let backend = self.backend.clone();
        let peers = self.peers.clone();
        let scheduler = self.scheduler.clone();
        let objstore_id = self.objstore_id;
        let src_addr = req.src_address;
        let in_flight_pulls = self.in_flight_pulls.clone();

        tokio::spawn(async move {
            let result = run_pull(&backend, &peers, objref, &src_addr).await;
            in_flight_pulls.lock().await.remove(&objref);
            match result {
                Ok(()) => {
                    if let Err(err) = scheduler.obj_ready(objref, objstore_id).await {
                        tracing::error!(%objref, %err, "failed to report ObjReady after delivery");
                    }
                }
                Err(err) => {
                    tracing::warn!(%objref, src = %src_addr, %err, "StartDelivery pull failed");
                    if let Err(report_err) = scheduler.transfer_failed(objref, objstore_id, &src_addr).await {
                        tracing::error!(%objref, %report_err, "failed to report TransferFailed");
                    }
                }
            }
        });

        Ok(Response::new(Empty {}))
    }

    type StreamObjToStream = Pin<Box<dyn Stream<Item = Result<ObjChunk, Status>> + Send + 'static>>;

    async fn stream_obj_to(
        &self,
        request: Request<StreamObjToRequest>,
    ) -> Result<Response<Self::StreamObjToStream>, Status> {
        let objref = ObjRefId(request.into_inner().objref_id);
        let payload = self.backend.read_for_transfer(objref).await.map_err(runtime_err)?;

        let chunk_size = self.chunk_size.max(1);
        let (tx, rx) = tokio::sync::mpsc::channel(4);

        tokio::spawn(async move {
            let total_size = payload.total_size;
            let metadata_offset = payload.metadata_offset;
            let bytes = payload.bytes;
            if bytes.is_empty() {
                let _ = tx
                    .send(Ok(ObjChunk {
                        offset: 0,
                        data: Vec::new(),
                        total_size,
                        metadata_offset,
                    }))
                    .await;
                return;
            }
            let mut offset = 0usize;
            while offset < bytes.len() {
                let end = (offset + chunk_size).min(bytes.len());
                let chunk = ObjChunk {
                    offset: offset as u64,
                    data: bytes[offset..end].to_vec(),
                    total_size,
                    metadata_offset,
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
                offset = end;
            }
        });

        Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))))
    }

    async fn notify_alias(&self, request: Request<NotifyAliasRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.backend
            .notify_alias(ObjRefId(req.alias_id), ObjRefId(req.canonical_id))
            .await;
        Ok(Response::new(Empty {}))
    }

    async fn deallocate_object(&self, request: Request<DeallocateObjectRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.backend.deallocate(ObjRefId(req.canonical_id)).await;
        Ok(Response::new(Empty {}))
    }

    async fn obj_store_info(&self, _request: Request<Empty>) -> Result<Response<ObjStoreInfoResponse>, Status> {
        let snapshot = self.backend.snapshot().await;
        Ok(Response::new(ObjStoreInfoResponse {
            object_count: snapshot.object_count as u64,
            bytes_stored: snapshot.bytes_stored,
            in_flight_deliveries: snapshot.in_flight_deliveries as u64,
        }))
    }

    async fn put_obj(&self, request: Request<PutObjRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let objref = ObjRefId(req.objref_id);
        self.backend
            .put_obj(objref, req.metadata_offset, req.bytes)
            .await
            .map_err(runtime_err)?;
        if let Err(err) = self.scheduler.obj_ready(objref, self.objstore_id).await {
            tracing::error!(%objref, %err, "failed to report ObjReady after PutObj");
        }
        Ok(Response::new(Empty {}))
    }

    async fn get_obj(&self, request: Request<GetObjRequest>) -> Result<Response<GetObjResponse>, Status> {
        let objref = ObjRefId(request.into_inner().objref_id);
        let payload = self.backend.get_obj(objref).await.map_err(runtime_err)?;
        Ok(Response::new(GetObjResponse {
            metadata_offset: payload.metadata_offset,
            bytes: payload.bytes,
        }))
    }
}
