//! Outbound calls the worker process makes: to its co-located object store
//! (`GetObj`/`PutObj`) and to the scheduler (`ReadyForNewTask`). Both clients
//! are connected once at startup and held for the life of the process, the
//! way a long-lived worker naturally would.

use rt_core::ids::{ObjRefId, WorkerId};
use rt_proto::objstore::obj_store_client::ObjStoreClient;
use rt_proto::objstore::{GetObjRequest, PutObjRequest};
use rt_proto::scheduler::scheduler_client::SchedulerClient;
use rt_proto::scheduler::{ReadyForNewTaskRequest, TaskOutcome};
use tonic::transport::Channel;

#[derive(Clone)]
pub struct ObjStoreHandle {
    client: ObjStoreClient<Channel>,
}

impl ObjStoreHandle {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let client = ObjStoreClient::connect(format!("http://{addr}")).await?;
        Ok(Self { client })
    }

    /// spec.md §4.3: "for each `ObjRef` argument call local-store `GetObj`".
    /// The scheduler only dispatches once every argument is local (§4.1.1
    /// P2), so this should not need to wait; it is still a plain RPC call
    /// rather than a busy-loop, so a genuinely late arrival just surfaces as
    /// an RPC error the caller can retry a bounded number of times.
    pub async fn get_obj(&mut self, objref: ObjRefId) -> anyhow::Result<(u64, Vec<u8>)> {
        let resp = self
            .client
            .get_obj(GetObjRequest { objref_id: objref.0 })
            .await?
            .into_inner();
        Ok((resp.metadata_offset, resp.bytes))
    }

    /// spec.md §4.3: "write the payload to the local store". The store
    /// itself reports `ObjReady` to the scheduler once the payload is
    /// finalized (SPEC_FULL.md §B `PutObj`), so the worker does not call
    /// `ObjReady` directly.
    pub async fn put_obj(&mut self, objref: ObjRefId, metadata_offset: u64, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .put_obj(PutObjRequest {
                objref_id: objref.0,
                metadata_offset,
                bytes,
            })
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SchedulerHandle {
    client: SchedulerClient<Channel>,
}

impl SchedulerHandle {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let client = SchedulerClient::connect(format!("http://{addr}")).await?;
        Ok(Self { client })
    }

    pub fn client(&self) -> SchedulerClient<Channel> {
        self.client.clone()
    }

    /// spec.md's `ReadyForNewTask`: resolves the previous task's outcome (if
    /// any) and marks this worker idle, triggering a scheduling pass.
    pub async fn ready_for_new_task(
        &mut self,
        worker: WorkerId,
        prev_outcome: Option<(bool, Option<String>)>,
    ) -> anyhow::Result<()> {
        self.client
            .ready_for_new_task(ReadyForNewTaskRequest {
                worker_id: worker.0,
                prev_outcome: prev_outcome.map(|(succeeded, error_message)| TaskOutcome {
                    succeeded,
                    error_message: error_message.unwrap_or_default(),
                }),
            })
            .await?;
        Ok(())
    }
}
