mod util;

use log::{error, info};
use plenuslb_shared::os::env_var::{ActualEnvVarQuery, EnvVarQuery};
use plenuslb_shared::os::signal;
use plenuslb_shared::plenuslb::metrics::{run_metrics_server, HealthState};
use std::sync::Arc;
use util::interface_store::InterfaceStore;
use util::kernel::{Kernel, RtnetlinkKernel};
use util::observer;
use util::rpc_server::NodeAgentService;

/// Port the controller dials every node agent on (§6).
const NODE_AGENT_PORT: u16 = 10000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    env_logger::try_init()?;
    info!("plenuslb node agent starting");

    let env = ActualEnvVarQuery {};
    let node_name = env.get_env_var("MY_NODE_NAME")?;
    let health_port = env.get_env_var("HEALTH_PORT")?;
    if std::env::var("METRICS_PORT").is_err() {
        std::env::set_var("METRICS_PORT", &health_port);
    }
    info!("running on node {node_name}");

    let health = HealthState::new();
    let mut tasks = Vec::new();
    tasks.push(tokio::spawn({
        let health = health.clone();
        async move {
            if let Err(e) = run_metrics_server(health).await {
                error!("metrics server exited: {e}");
            }
        }
    }));

    let store = Arc::new(InterfaceStore::new());
    let kernel: Arc<dyn Kernel> = Arc::new(RtnetlinkKernel::new()?);

    tasks.push(tokio::spawn({
        let store = store.clone();
        let kernel = kernel.clone();
        async move {
            if let Err(e) = observer::run(store, kernel).await {
                error!("observer loop exited fatally: {e}");
                std::process::exit(1);
            }
        }
    }));

    let addr = format!("0.0.0.0:{NODE_AGENT_PORT}").parse()?;
    let service = NodeAgentService::new(store, kernel);
    health.set_ready(true);
    info!("node agent RPC server listening on {addr}");
    tonic::transport::Server::builder()
        .add_service(plenuslb_agent_proto::node_agent_server::NodeAgentServer::new(service))
        .serve_with_shutdown(addr, signal::shutdown())
        .await?;

    futures::future::join_all(tasks).await;
    info!("plenuslb node agent stopped");
    Ok(())
}
