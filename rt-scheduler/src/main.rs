use std::sync::Arc;

use rt_core::config::RuntimeConfig;
use rt_core::scheduler::Scheduler;
use rt_proto::scheduler::scheduler_server::SchedulerServer;
use rt_scheduler::client::PeerClients;
use rt_scheduler::grpc::SchedulerService;
use tokio::sync::Mutex;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = RuntimeConfig::from_env("0.0.0.0:50050");
    let addr = config.bind_addr.parse()?;

    let state = Arc::new(Mutex::new(Scheduler::new(config.start_delivery_retries)));
    let peers = Arc::new(PeerClients::new());

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<SchedulerServer<SchedulerService>>()
        .await;

    tracing::info!(%addr, "rt-scheduler listening");

    let service = SchedulerService { state, peers };

    Server::builder()
        .add_service(health_service)
        .add_service(SchedulerServer::new(service))
        .serve(addr)
        .await?;

    Ok(())
}
