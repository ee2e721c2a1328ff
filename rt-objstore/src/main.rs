use std::sync::Arc;

use rt_core::config::RuntimeConfig;
use rt_core::ids::ObjStoreId;
use rt_core::objstore_state::{InMemoryObjectStore, ObjectStoreBackend};
use rt_objstore::client::{PeerClients, SchedulerHandle};
use rt_objstore::grpc::proto::obj_store_server::ObjStoreServer;
use rt_objstore::grpc::ObjStoreService;
use rt_proto::scheduler::scheduler_client::SchedulerClient;
use rt_proto::scheduler::RegisterObjStoreRequest;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = RuntimeConfig::from_env("0.0.0.0:50060");
    let addr = config.bind_addr.parse()?;
    let scheduler_addr = config
        .scheduler_addr
        .clone()
        .expect("rt-objstore requires --scheduler / RT_SCHEDULER_ADDR");

    let mut registrar = SchedulerClient::connect(format!("http://{scheduler_addr}")).await?;
    let registered = registrar
        .register_obj_store(RegisterObjStoreRequest {
            objstore_address: config.bind_addr.clone(),
        })
        .await?
        .into_inner();
    let objstore_id = ObjStoreId(registered.objstore_id);
    tracing::info!(objstore_id = registered.objstore_id, %addr, "rt-objstore registered with scheduler");

    let backend: Arc<dyn ObjectStoreBackend> = Arc::new(InMemoryObjectStore::new());
    let scheduler = Arc::new(SchedulerHandle::new(scheduler_addr));
    let peers = Arc::new(PeerClients::new());

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter.set_serving::<ObjStoreServer<ObjStoreService>>().await;

    let service = ObjStoreService::new(objstore_id, backend, scheduler, peers, config.chunk_size);

    Server::builder()
        .add_service(health_service)
        .add_service(ObjStoreServer::new(service))
        .serve(addr)
        .await?;

    Ok(())
}
