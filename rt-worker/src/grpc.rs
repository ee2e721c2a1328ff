use std::sync::Arc;

use rt_core::ids::{ObjRefId, OperationId};
use rt_core::task::TaskArg as CoreTaskArg;
use tonic::{Request, Response, Status};

use crate::loop_::WorkerRuntime;

#[allow(clippy::enum_variant_names)]
pub mod proto {
    pub use rt_proto::worker::*;
}

use proto::worker_service_server::WorkerService;
use proto::*;

fn task_arg_from_proto(a: &TaskArg) -> CoreTaskArg {
    match &a.value {
        Some(task_arg::Value::Literal(bytes)) => CoreTaskArg::Literal(bytes.clone()),
        Some(task_arg::Value::ObjrefId(id)) => CoreTaskArg::Ref(ObjRefId(*id)),
        None => CoreTaskArg::Literal(Vec::new()),
    }
}

pub struct WorkerGrpcService {
    pub runtime: Arc<WorkerRuntime>,
}

/// spec.md §6: "Exposed by every worker process. The scheduler is the only
/// caller." `ExecuteTask` acks immediately and runs the task in the
/// background (§5: "ExecuteTask may ... block pending network I/O"); the
/// scheduler learns the outcome through the worker's next `ReadyForNewTask`,
/// not through this RPC's response.
#[tonic::async_trait]
impl WorkerService for WorkerGrpcService {
    async fn execute_task(&self, request: Request<ExecuteTaskRequest>) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        let op = OperationId(req.operation_id);
        let function_name = req.function_name;
        let args: Vec<CoreTaskArg> = req.args.iter().map(task_arg_from_proto).collect();
        let result_objrefs: Vec<ObjRefId> = req.result_objref_ids.into_iter().map(ObjRefId).collect();

        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            WorkerRuntime::run_task(runtime, op, function_name, args, result_objrefs).await;
        });

        Ok(Response::new(Empty {}))
    }
}
