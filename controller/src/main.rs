mod util;

use log::{error, info, warn};
use plenuslb_shared::k8s::KubeImpl;
use plenuslb_shared::os::env_var::{ActualEnvVarQuery, EnvVarQuery};
use plenuslb_shared::os::signal;
use plenuslb_shared::plenuslb::metrics::{run_metrics_server, HealthState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use util::agent_registry::AgentRegistry;
use util::controller_ctx::{ControllerContext, ControllerKubeClient};
use util::lock_registry::LockRegistry;
use util::pool_tracker::PoolTracker;
use util::reconcile_allocation::ErrorProcessingSet;
use util::{leader, reconcile_allocation, reconcile_node_agent, reconcile_pool, reconcile_workload};

/// This is the entry point for the controller.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    env_logger::try_init()?;
    info!("plenuslb controller starting");

    let env = ActualEnvVarQuery {};
    let pod_name = env.get_env_var("MY_POD_NAME")?;
    let pod_namespace = env.get_env_var("MY_POD_NAMESPACE")?;
    let _operator_image = env.get_env_var("OPERATOR_IMAGE")?;
    let _operator_pull_secret = env.get_env_var("OPERATOR_PULL_SECRET").ok();
    let cluster_name = env
        .get_env_var("CLUSTER_NAME")
        .unwrap_or_else(|_| "default".to_string());

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

    let client = kube::Client::try_default().await?;
    let kube_client: Arc<dyn ControllerKubeClient> = Arc::new(KubeImpl::from_client(client.clone()));
    let error_set = Arc::new(ErrorProcessingSet::new());

    let shutdown = CancellationToken::new();
    tasks.push(tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal::shutdown().await;
            info!("shutdown signal received");
            shutdown.cancel();
        }
    }));

    let leader_health = health.clone();
    leader::run(client, pod_namespace, pod_name, shutdown.clone(), move |scope| {
        let kube_client = kube_client.clone();
        let cluster_name = cluster_name.clone();
        let error_set = error_set.clone();
        let health = leader_health.clone();
        tokio::spawn(async move {
            let ctx = Arc::new(ControllerContext {
                client: kube_client,
                pool_tracker: Arc::new(PoolTracker::new()),
                locks: Arc::new(LockRegistry::new()),
                agents: Arc::new(AgentRegistry::new()),
                cancellation: scope,
                cluster_name,
            });

            if let Err(e) = reconcile_pool::warm_up(&ctx).await {
                warn!("pool availability warm-up failed: {e}");
            }
            health.set_ready(true);

            let mut leader_tasks = Vec::new();
            leader_tasks.push(tokio::spawn(reconcile_workload::run(ctx.clone())));
            leader_tasks.push(tokio::spawn(reconcile_allocation::run(
                ctx.clone(),
                error_set.clone(),
            )));
            leader_tasks.push(tokio::spawn(reconcile_pool::run(ctx.clone())));
            leader_tasks.push(tokio::spawn(reconcile_node_agent::run(ctx.clone())));
            let _ = futures::future::join_all(leader_tasks).await;

            health.set_ready(false);
        })
    })
    .await;

    futures::future::join_all(tasks).await;
    info!("plenuslb controller stopped");
    Ok(())
}
