//! Outbound calls the scheduler makes to carry out `rt_core::scheduler::Effect`
//! values against peer object stores and workers, once the lock guarding the
//! `Scheduler` has been released. Connections are cached by address the way a
//! long-lived server process naturally would; nothing here is part of the
//! core state machine (rt-core stays free of any networking concern).

use std::collections::HashMap;
use std::sync::Arc;

use rt_core::scheduler::{Effect, Scheduler};
use rt_core::task::TaskArg as CoreTaskArg;
use rt_proto::objstore::obj_store_client::ObjStoreClient;
use rt_proto::objstore::{DeallocateObjectRequest, NotifyAliasRequest, StartDeliveryRequest};
use rt_proto::worker::worker_service_client::WorkerServiceClient;
use rt_proto::worker::{task_arg::Value as ProtoArgValue, ExecuteTaskRequest, TaskArg as ProtoTaskArg};
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

    async fn objstore_client(&self, addr: &str) -> anyhow::Result<ObjStoreClient<Channel>> {
        Ok(ObjStoreClient::new(self.channel(addr).await?))
    }

    async fn worker_client(&self, addr: &str) -> anyhow::Result<WorkerServiceClient<Channel>> {
        Ok(WorkerServiceClient::new(self.channel(addr).await?))
    }
}

fn task_arg_to_proto(a: &CoreTaskArg) -> ProtoTaskArg {
    match a {
        CoreTaskArg::Literal(bytes) => ProtoTaskArg {
            value: Some(ProtoArgValue::Literal(bytes.clone())),
        },
        CoreTaskArg::Ref(r) => ProtoTaskArg {
            value: Some(ProtoArgValue::ObjrefId(r.0)),
        },
    }
}

/// Carries out every effect from a `Scheduler` call. `StartDelivery` failures
/// are fed back into the scheduler's retry logic (spec.md §5): the source
/// store that failed is excluded from the next attempt, and whatever new
/// effects that produces (another `StartDelivery`, or failing the dependent
/// task) are carried out in turn.
pub fn execute_effects<'a>(
    scheduler: &'a Arc<Mutex<Scheduler>>,
    peers: &'a Arc<PeerClients>,
    effects: Vec<Effect>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        for effect in effects {
            match effect {
                Effect::StartDelivery { dest, dest_addr, src_addr, objref } => {
                    let result = (|| async {
                        let mut client = peers.objstore_client(&dest_addr).await?;
                        client
                            .start_delivery(StartDeliveryRequest {
                                objref_id: objref.0,
                                total_size: 0,
                                metadata_offset: 0,
                                src_address: src_addr.clone(),
                            })
                            .await?;
                        Ok::<(), anyhow::Error>(())
                    })()
                    .await;

                    if let Err(err) = result {
                        tracing::warn!(%objref, dest = %dest, src = %src_addr, %err, "StartDelivery failed");
                        let failed_source = find_objstore_id(scheduler, &src_addr).await;
                        if let Some(failed_source) = failed_source {
                            let retry_effects = {
                                let mut guard = scheduler.lock().await;
                                guard.transfer_failed(dest, objref, failed_source)
                            };
                            execute_effects(scheduler, peers, retry_effects).await;
                        }
                    }
                }
                Effect::ExecuteTask { worker_addr, task, .. } => {
                    let result = (|| async {
                        let mut client = peers.worker_client(&worker_addr).await?;
                        client
                            .execute_task(ExecuteTaskRequest {
                                operation_id: task.operation_id.0,
                                function_name: task.function_name.clone(),
                                args: task.args.iter().map(task_arg_to_proto).collect(),
                                result_objref_ids: task.result_objrefs.iter().map(|r| r.0).collect(),
                            })
                            .await?;
                        Ok::<(), anyhow::Error>(())
                    })()
                    .await;
                    if let Err(err) = result {
                        tracing::error!(worker_addr = %worker_addr, %err, "ExecuteTask dispatch failed");
                    }
                }
                Effect::DeallocateObject { store_addr, canonical, .. } => {
                    if let Ok(mut client) = peers.objstore_client(&store_addr).await {
                        let _ = client
                            .deallocate_object(DeallocateObjectRequest { canonical_id: canonical.0 })
                            .await;
                    }
                }
                Effect::NotifyAlias { store_addr, alias, canonical, .. } => {
                    if let Ok(mut client) = peers.objstore_client(&store_addr).await {
                        let _ = client
                            .notify_alias(NotifyAliasRequest {
                                alias_id: alias.0,
                                canonical_id: canonical.0,
                            })
                            .await;
                    }
                }
            }
        }
    })
}

/// `transfer_failed` is keyed by `ObjStoreId`, but client.rs only has the
/// address it tried to reach; look the id back up from the scheduler's own
/// bookkeeping rather than threading it through every `Effect`.
async fn find_objstore_id(scheduler: &Arc<Mutex<Scheduler>>, addr: &str) -> Option<rt_core::ids::ObjStoreId> {
    let guard = scheduler.lock().await;
    guard
        .scheduler_info()
        .objstores
        .into_iter()
        .find(|o| o.objstore_address == addr)
        .map(|o| o.objstore_id)
}
