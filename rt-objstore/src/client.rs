//! Outbound calls an object store process makes: pulling chunks from a peer
//! store's `StreamObjTo` during a delivery, and reporting `ObjReady` back to
//! the scheduler once a payload is finalized locally. Connections are cached
//! by address, matching `rt-scheduler`'s `client::PeerClients`.

use std::collections::HashMap;

use rt_core::ids::{ObjRefId, ObjStoreId};
use rt_proto::objstore::obj_store_client::ObjStoreClient;
use rt_proto::scheduler::scheduler_client::SchedulerClient;
use rt_proto::scheduler::{ObjReadyRequest, TransferFailedRequest};
use tokio::sync::Mutex;
use tonic::transport::Channel;

#[derive(Default)]
pub struct PeerClients {
    channels: Mutex<HashMap<String, Channel>>,
}

impl PeerClients {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, addr: &str) -> anyhow::Result<Channel> {
        {
            let channels = self.channels.lock().await;
            if let Some(c) = channels.get(addr) {
                return Ok(c.clone());
            }
        }
        let endpoint = tonic::transport::Endpoint::from_shared(format!("http://{addr}"))?;
        let channel = endpoint.connect().await?;
        self.channels.lock().await.insert(addr.to_string(), channel.clone());
        Ok(channel)
    }

    pub async fn objstore_client(&self, addr: &str) -> anyhow::Result<ObjStoreClient<Channel>> {
        Ok(ObjStoreClient::new(self.channel(addr).await?))
    }
}

/// A lazily-connected, cached client to the single cluster scheduler.
pub struct SchedulerHandle {
    addr: String,
    client: Mutex<Option<SchedulerClient<Channel>>>,
}

impl SchedulerHandle {
    pub fn new(addr: String) -> Self {
        Self {
            addr,
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> anyhow::Result<SchedulerClient<Channel>> {
        let mut slot = self.client.lock().await;
        if let Some(c) = slot.as_ref() {
            return Ok(c.clone());
        }
        let client = SchedulerClient::connect(format!("http://{}", self.addr)).await?;
        *slot = Some(client.clone());
        Ok(client)
    }

    /// spec.md §4.2 `StartDelivery`: "on completion ... calls the scheduler's
    /// `ObjReady(objref, self)`"; also used by `PutObj` (SPEC_FULL.md §B),
    /// which finalizes a payload the same way a completed delivery does.
    pub async fn obj_ready(&self, objref: ObjRefId, store: ObjStoreId) -> anyhow::Result<()> {
        let mut client = self.client().await?;
        client
            .obj_ready(ObjReadyRequest {
                objref_id: objref.0,
                objstore_id: store.0,
            })
            .await?;
        Ok(())
    }

    /// Reports a background `StartDelivery` pull that failed against its
    /// source, so `Scheduler::transfer_failed` (spec.md §4.1.3) can retry
    /// against a different source or fail the dependent task.
    pub async fn transfer_failed(&self, objref: ObjRefId, dest: ObjStoreId, src_address: &str) -> anyhow::Result<()> {
        let mut client = self.client().await?;
        client
            .transfer_failed(TransferFailedRequest {
                objref_id: objref.0,
                dest_objstore_id: dest.0,
                src_address: src_address.to_string(),
            })
            .await?;
        Ok(())
    }
}
