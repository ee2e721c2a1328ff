use std::sync::Arc;

use rt_core::config::RuntimeConfig;
use rt_core::ids::{ObjStoreId, WorkerId};
use rt_proto::scheduler::scheduler_client::SchedulerClient;
use rt_proto::scheduler::{RegisterFunctionRequest, RegisterWorkerRequest};
use rt_proto::worker::worker_service_server::WorkerServiceServer;
use rt_worker::client::{ObjStoreHandle, SchedulerHandle};
use rt_worker::functions::FunctionRegistry;
use rt_worker::grpc::WorkerGrpcService;
use rt_worker::loop_::WorkerRuntime;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = RuntimeConfig::from_env("0.0.0.0:50070");
    let addr = config.bind_addr.parse()?;
    let scheduler_addr = config
        .scheduler_addr
        .clone()
        .expect("rt-worker requires --scheduler / RT_SCHEDULER_ADDR");
    let objstore_addr = config
        .objstore_addr
        .clone()
        .expect("rt-worker requires --objstore / RT_OBJSTORE_ADDR");

    let mut registrar = SchedulerClient::connect(format!("http://{scheduler_addr}")).await?;

    // The wire protocol has no "which objstore am I colocated with" field on
    // RegisterWorker beyond the id, so we resolve our own objstore_id by
    // asking the scheduler which address it already knows and matching it
    // against our configured --objstore address.
    let info = registrar.scheduler_info(rt_proto::scheduler::Empty {}).await?.into_inner();
    let objstore_id = info
        .objstores
        .iter()
        .find(|o| o.objstore_address == objstore_addr)
        .map(|o| ObjStoreId(o.objstore_id))
        .ok_or_else(|| format!("objstore {objstore_addr:?} is not registered with the scheduler yet"))?;

    let registered = registrar
        .register_worker(RegisterWorkerRequest {
            worker_address: config.bind_addr.clone(),
            objstore_id: objstore_id.0,
        })
        .await?
        .into_inner();
    let worker_id = WorkerId(registered.worker_id);
    tracing::info!(worker_id = registered.worker_id, objstore_id = objstore_id.0, %addr, "rt-worker registered with scheduler");

    let functions = Arc::new(FunctionRegistry::with_builtins());
    for (name, arity) in functions.iter() {
        registrar
            .register_function(RegisterFunctionRequest {
                worker_id: worker_id.0,
                function_name: name.to_string(),
                arity,
            })
            .await?;
        tracing::info!(function = name, arity, "registered builtin function");
    }

    let objstore = ObjStoreHandle::connect(&objstore_addr).await?;
    let scheduler = SchedulerHandle::connect(&scheduler_addr).await?;

    let runtime = Arc::new(WorkerRuntime {
        worker_id,
        objstore,
        scheduler: scheduler.clone(),
        functions,
    });

    // First ReadyForNewTask after registration carries no prev_outcome
    // (scheduler.proto: "absent on the first call after registration").
    scheduler.clone().ready_for_new_task(worker_id, None).await?;

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter.set_serving::<WorkerServiceServer<WorkerGrpcService>>().await;

    let service = WorkerGrpcService { runtime };

    Server::builder()
        .add_service(health_service)
        .add_service(WorkerServiceServer::new(service))
        .serve(addr)
        .await?;

    Ok(())
}
