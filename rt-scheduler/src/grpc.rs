use std::sync::Arc;

use rt_core::ids::{ObjRefId, ObjStoreId, OperationId, WorkerId};
use rt_core::scheduler::Scheduler;
use rt_core::task::TaskArg as CoreTaskArg;
use rt_core::RuntimeError;
use tokio::sync::Mutex;
use tonic::{Request, Response, Status};

use crate::client::{execute_effects, PeerClients};

#[allow(clippy::enum_variant_names)]
pub mod proto {
    pub use rt_proto::scheduler::*;
}

use proto::scheduler_server::Scheduler as SchedulerRpc;
use proto::*;

pub struct SchedulerService {
    pub state: Arc<Mutex<Scheduler>>,
    pub peers: Arc<PeerClients>,
}

fn runtime_err(e: RuntimeError) -> Status {
    match e {
        RuntimeError::UnknownWorker(_)
        | RuntimeError::UnknownObjStore(_)
        | RuntimeError::UnknownOperation(_)
        | RuntimeError::UnknownObjRef(_) => Status::not_found(e.to_string()),
        RuntimeError::ArityMismatch { .. } | RuntimeError::AliasCycle { .. } => {
            Status::invalid_argument(e.to_string())
        }
        RuntimeError::RetiredObjRef(_) => Status::failed_precondition(e.to_string()),
        _ => Status::internal(e.to_string()),
    }
}

fn task_arg_from_proto(a: &TaskArg) -> CoreTaskArg {
    match &a.value {
        Some(task_arg::Value::Literal(bytes)) => CoreTaskArg::Literal(bytes.clone()),
        Some(task_arg::Value::ObjrefId(id)) => CoreTaskArg::Ref(ObjRefId(*id)),
        None => CoreTaskArg::Literal(Vec::new()),
    }
}

#[tonic::async_trait]
impl SchedulerRpc for SchedulerService {
    async fn register_obj_store(
        &self,
        request: Request<RegisterObjStoreRequest>,
    ) -> Result<Response<RegisterObjStoreResponse>, Status> {
        let req = request.into_inner();
        let mut state = self.state.lock().await;
        let id = state.register_objstore(req.objstore_address);
        Ok(Response::new(RegisterObjStoreResponse { objstore_id: id.0 }))
    }

    async fn register_worker(
        &self,
        request: Request<RegisterWorkerRequest>,
    ) -> Result<Response<RegisterWorkerResponse>, Status> {
        let req = request.into_inner();
        let mut state = self.state.lock().await;
        let id = state
            .register_worker(req.worker_address, ObjStoreId(req.objstore_id))
            .map_err(runtime_err)?;
        Ok(Response::new(RegisterWorkerResponse {
            worker_id: id.0,
            objstore_id: req.objstore_id,
        }))
    }

    async fn register_function(
        &self,
        request: Request<RegisterFunctionRequest>,
    ) -> Result<Response<RegisterFunctionResponse>, Status> {
        let req = request.into_inner();
        let effects = {
            let mut state = self.state.lock().await;
            state
                .register_function(WorkerId(req.worker_id), &req.function_name, req.arity)
                .map_err(runtime_err)?
        };
        execute_effects(&self.state, &self.peers, effects).await;
        Ok(Response::new(RegisterFunctionResponse {}))
    }

    async fn submit_task(
        &self,
        request: Request<SubmitTaskRequest>,
    ) -> Result<Response<SubmitTaskResponse>, Status> {
        let req = request.into_inner();
        let args: Vec<CoreTaskArg> = req.args.iter().map(task_arg_from_proto).collect();
        let (result_objrefs, registered, effects) = {
            let mut state = self.state.lock().await;
            state.submit_task(&req.function_name, args).map_err(runtime_err)?
        };
        execute_effects(&self.state, &self.peers, effects).await;
        Ok(Response::new(SubmitTaskResponse {
            result_objref_ids: result_objrefs.into_iter().map(|r| r.0).collect(),
            function_registered: registered,
        }))
    }

    async fn push_obj(&self, _request: Request<PushObjRequest>) -> Result<Response<PushObjResponse>, Status> {
        let mut state = self.state.lock().await;
        let id = state.push_obj();
        Ok(Response::new(PushObjResponse { objref_id: id.0 }))
    }

    async fn request_obj(&self, request: Request<RequestObjRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let effects = {
            let mut state = self.state.lock().await;
            state
                .request_obj(WorkerId(req.worker_id), ObjRefId(req.objref_id))
                .map_err(runtime_err)?
        };
        execute_effects(&self.state, &self.peers, effects).await;
        Ok(Response::new(Empty {}))
    }

    async fn alias_obj_refs(&self, request: Request<AliasObjRefsRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let effects = {
            let mut state = self.state.lock().await;
            state
                .alias_objrefs(ObjRefId(req.alias_id), ObjRefId(req.target_id))
                .map_err(runtime_err)?
        };
        execute_effects(&self.state, &self.peers, effects).await;
        Ok(Response::new(Empty {}))
    }

    async fn obj_ready(&self, request: Request<ObjReadyRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let effects = {
            let mut state = self.state.lock().await;
            state
                .obj_ready(ObjRefId(req.objref_id), ObjStoreId(req.objstore_id))
                .map_err(runtime_err)?
        };
        execute_effects(&self.state, &self.peers, effects).await;
        Ok(Response::new(Empty {}))
    }

    async fn increment_ref_count(&self, request: Request<RefCountRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let refs: Vec<ObjRefId> = req.objref_ids.into_iter().map(ObjRefId).collect();
        let mut state = self.state.lock().await;
        state.increment_ref_count(&refs).map_err(runtime_err)?;
        Ok(Response::new(Empty {}))
    }

    async fn decrement_ref_count(&self, request: Request<RefCountRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let refs: Vec<ObjRefId> = req.objref_ids.into_iter().map(ObjRefId).collect();
        let effects = {
            let mut state = self.state.lock().await;
            state.decrement_ref_count(&refs).map_err(runtime_err)?
        };
        execute_effects(&self.state, &self.peers, effects).await;
        Ok(Response::new(Empty {}))
    }

    async fn add_contained_obj_refs(
        &self,
        request: Request<AddContainedObjRefsRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let contained: Vec<ObjRefId> = req.contained_ids.into_iter().map(ObjRefId).collect();
        let mut state = self.state.lock().await;
        state
            .add_contained_objrefs(ObjRefId(req.container_id), contained)
            .map_err(runtime_err)?;
        Ok(Response::new(Empty {}))
    }

    async fn transfer_failed(
        &self,
        request: Request<TransferFailedRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let objref = ObjRefId(req.objref_id);
        let dest = ObjStoreId(req.dest_objstore_id);

        let effects = {
            let mut state = self.state.lock().await;
            let failed_source = state
                .scheduler_info()
                .objstores
                .into_iter()
                .find(|o| o.objstore_address == req.src_address)
                .map(|o| o.objstore_id)
                .ok_or_else(|| Status::not_found(format!("no objstore registered at {}", req.src_address)))?;
            state.transfer_failed(dest, objref, failed_source)
        };
        execute_effects(&self.state, &self.peers, effects).await;
        Ok(Response::new(Empty {}))
    }

    async fn ready_for_new_task(
        &self,
        request: Request<ReadyForNewTaskRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let prev_outcome = req.prev_outcome.map(|o| {
            (
                o.succeeded,
                if o.error_message.is_empty() { None } else { Some(o.error_message) },
            )
        });
        let effects = {
            let mut state = self.state.lock().await;
            state
                .ready_for_new_task(WorkerId(req.worker_id), prev_outcome)
                .map_err(runtime_err)?
        };
        execute_effects(&self.state, &self.peers, effects).await;
        Ok(Response::new(Empty {}))
    }

    async fn scheduler_info(&self, _request: Request<Empty>) -> Result<Response<SchedulerInfoResponse>, Status> {
        let state = self.state.lock().await;
        let snapshot = state.scheduler_info();
        Ok(Response::new(SchedulerInfoResponse {
            workers: snapshot
                .workers
                .into_iter()
                .map(|w| WorkerInfo {
                    worker_id: w.worker_id.0,
                    worker_address: w.worker_address,
                    objstore_id: w.objstore_id.0,
                    state: format!("{:?}", w.state),
                })
                .collect(),
            objstores: snapshot
                .objstores
                .into_iter()
                .map(|o| proto::ObjStoreInfo {
                    objstore_id: o.objstore_id.0,
                    objstore_address: o.objstore_address,
                })
                .collect(),
            queued_tasks: snapshot.queued_tasks as u64,
            pending_dispatch_tasks: snapshot.pending_dispatch_tasks as u64,
        }))
    }

    async fn task_info(&self, request: Request<TaskInfoRequest>) -> Result<Response<TaskInfoResponse>, Status> {
        let req = request.into_inner();
        let state = self.state.lock().await;
        let task = state.task_info(OperationId(req.operation_id)).map_err(runtime_err)?;
        Ok(Response::new(TaskInfoResponse {
            operation_id: task.operation_id.0,
            function_name: task.function_name,
            result_objref_ids: task.result_objrefs.into_iter().map(|r| r.0).collect(),
            assigned_worker_id: task.assigned_worker.map(|w| w.0).unwrap_or(0),
            status: format!("{:?}", task.status),
            error_message: task.error_message.unwrap_or_default(),
        }))
    }
}
