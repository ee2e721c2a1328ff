//! The worker loop of spec.md §4.3: resolve each `ObjRef` argument through
//! the local object store, execute the named function, write each output
//! back to the local store under its pre-allocated result ref, then report
//! the outcome to the scheduler so it can dispatch the worker's next task.

use std::sync::Arc;

use rt_core::ids::{ObjRefId, OperationId, WorkerId};
use rt_core::task::TaskArg;

use crate::client::{ObjStoreHandle, SchedulerHandle};
use crate::functions::FunctionRegistry;

pub struct WorkerRuntime {
    pub worker_id: WorkerId,
    pub objstore: ObjStoreHandle,
    pub scheduler: SchedulerHandle,
    pub functions: Arc<FunctionRegistry>,
}

impl WorkerRuntime {
    /// Runs one dispatched task to completion and reports the outcome via
    /// `ReadyForNewTask`. A task that fails (unknown function, wrong arity,
    /// a store RPC error) still reports — its result refs are left without a
    /// payload, so readers of them hit `UnknownObjRef`/`TaskFailure` the way
    /// spec.md §4.3 describes ("the result refs are still allocated and
    /// marked failed; readers fail on access").
    pub async fn run_task(
        self_: Arc<Self>,
        op: OperationId,
        function_name: String,
        args: Vec<TaskArg>,
        result_objrefs: Vec<ObjRefId>,
    ) {
        let outcome = self_.execute(&function_name, &args, &result_objrefs).await;
        let (succeeded, error_message) = match outcome {
            Ok(()) => (true, None),
            Err(message) => {
                tracing::warn!(%op, function = %function_name, %message, "task failed");
                (false, Some(message))
            }
        };

        let mut scheduler = self_.scheduler.clone();
        if let Err(err) = scheduler.ready_for_new_task(self_.worker_id, Some((succeeded, error_message))).await {
            tracing::error!(%op, %err, "failed to report ReadyForNewTask");
        }
    }

    async fn execute(
        &self,
        function_name: &str,
        args: &[TaskArg],
        result_objrefs: &[ObjRefId],
    ) -> Result<(), String> {
        let mut objstore = self.objstore.clone();

        let mut resolved = Vec::with_capacity(args.len());
        for arg in args {
            let bytes = match arg {
                TaskArg::Literal(bytes) => bytes.clone(),
                TaskArg::Ref(r) => {
                    let (_, bytes) = objstore
                        .get_obj(*r)
                        .await
                        .map_err(|e| format!("GetObj({r}) failed: {e}"))?;
                    bytes
                }
            };
            resolved.push(bytes);
        }

        let outputs = self.functions.call(function_name, &resolved)?;
        if outputs.len() != result_objrefs.len() {
            return Err(format!(
                "{function_name} produced {} output(s), expected {} (result arity)",
                outputs.len(),
                result_objrefs.len()
            ));
        }

        for (objref, bytes) in result_objrefs.iter().zip(outputs) {
            objstore
                .put_obj(*objref, 0, bytes)
                .await
                .map_err(|e| format!("PutObj({objref}) failed: {e}"))?;
        }
        Ok(())
    }
}
