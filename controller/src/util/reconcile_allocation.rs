//! Allocation State Machine (§4.2, §4.4): the core reconciler. Dispatches on
//! `status.state`, running the allocator for `Pending`, relocating on
//! `NodeError`, joining the bounded Error-retry loop on `Error`, and
//! treating `AddrDeleted` as a transient marker that re-derives on the next
//! pass.
//!
//! Grounded on `pkg/controller/allocator/allocator.go` (side-effect table),
//! `pkg/controller/operatorSpeaker/speaker.go` (node-agent fan-out), and
//! `pkg/clouds/clouds.go` (cloud adapter dispatch); lock discipline grounded
//! on `pkg/controller/allocationsLock/lock.go`.

use super::agent_speaker;
use super::controller_ctx::ControllerContext;
use super::reconcile_workload::write_ingress;
use super::{ControllerError, Result};
use futures::StreamExt;
use kube::runtime::{
    controller::{Action, Controller},
    finalizer::{finalizer, Event},
    watcher::Config,
};
use kube::ResourceExt;
use log::{info, trace, warn};
use plenuslb_shared::error::FailureKind;
use plenuslb_shared::plenuslb::allocation::{
    AddrBinding, AllocationState, IPAllocation, IpType,
};
use plenuslb_shared::plenuslb::pool::{HostNetworkInterfaceOptions, PersistentIpPoolSpec};
use plenuslb_shared::plenuslb::retry::Backoff;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub static ALLOCATION_FINALIZER: &str = "plenus.io/allocation";

/// Dedups concurrent Error-retry loops for the same Allocation (§3
/// "Error-Processing Set").
#[derive(Default)]
pub struct ErrorProcessingSet {
    inner: Mutex<HashSet<(String, String)>>,
}

impl ErrorProcessingSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_enter(&self, key: (String, String)) -> bool {
        self.inner.lock().unwrap().insert(key)
    }

    fn leave(&self, key: &(String, String)) {
        self.inner.lock().unwrap().remove(key);
    }
}

pub async fn run(ctx: Arc<ControllerContext>, error_set: Arc<ErrorProcessingSet>) {
    let api = ctx.allocations_all().as_inner();
    Controller::new(api, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new((ctx, error_set)))
        .filter_map(|res| async move { std::result::Result::ok(res) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

type Ctx = (Arc<ControllerContext>, Arc<ErrorProcessingSet>);

fn error_policy(_alloc: Arc<IPAllocation>, error: &ControllerError, _ctx: Arc<Ctx>) -> Action {
    warn!("allocation reconcile failed: {error}");
    Action::requeue(Duration::from_secs(10))
}

async fn reconcile(alloc: Arc<IPAllocation>, ctx: Arc<Ctx>) -> Result<Action> {
    let namespace = alloc.namespace().unwrap_or_default();
    let api = ctx.0.allocations(&namespace);
    finalizer(&api.as_inner(), ALLOCATION_FINALIZER, alloc, |event| {
        reconcile_inner(event, ctx.clone())
    })
    .await
    .map_err(|e| ControllerError::Finalizer(Box::new(e)))
}

async fn reconcile_inner(event: Event<IPAllocation>, ctx: Arc<Ctx>) -> Result<Action> {
    match event {
        Event::Apply(alloc) => dispatch(&alloc, ctx).await,
        Event::Cleanup(alloc) => {
            trace!("allocation {} cleaned up; nothing further to release here since the \
                     workload reconciler already released pool addresses", alloc.name_any());
            Ok(Action::await_change())
        }
    }
}

async fn dispatch(alloc: &IPAllocation, ctx: Arc<Ctx>) -> Result<Action> {
    let namespace = alloc.namespace().unwrap_or_default();
    let name = alloc.name_any();
    let state = alloc.status.as_ref().and_then(|s| s.state);

    match state {
        None => Ok(Action::await_change()),
        Some(AllocationState::Pending) => {
            let Some(_lock) = ctx
                .0
                .locks
                .acquire(&namespace, &name, "reconcile_allocation::pending")
                .await
            else {
                warn!("lock contended for {namespace}/{name}; requeuing");
                return Ok(Action::requeue(Duration::from_secs(5)));
            };
            run_allocator(&namespace, &name, ctx.0.clone()).await
        }
        Some(AllocationState::Success) => {
            // Success is a steady state with no action of its own. Drift is
            // driven back in here by other reconcilers re-marking the
            // allocation: reconcile_workload re-pends on externalIPs changes,
            // reconcile_pool re-pends/marks AddrDeleted on pool changes, and
            // reconcile_node_agent marks NodeError on agent loss.
            Ok(Action::await_change())
        }
        Some(AllocationState::NodeError) => {
            let Some(_lock) = ctx
                .0
                .locks
                .acquire(&namespace, &name, "reconcile_allocation::node_error")
                .await
            else {
                warn!("lock contended for {namespace}/{name}; requeuing");
                return Ok(Action::requeue(Duration::from_secs(5)));
            };
            relocate(&namespace, &name, ctx.0.clone()).await
        }
        Some(AllocationState::Error) => {
            let key = (namespace.clone(), name.clone());
            if ctx.1.try_enter(key.clone()) {
                let ctx0 = ctx.0.clone();
                let error_set = ctx.1.clone();
                tokio::spawn(async move {
                    run_error_retry_loop(namespace, name, ctx0).await;
                    error_set.leave(&key);
                });
            }
            Ok(Action::await_change())
        }
        Some(AllocationState::Failed) => {
            warn!("allocation {namespace}/{name} is Failed and requires human intervention");
            Ok(Action::await_change())
        }
        Some(AllocationState::AddressDeletedFromPool) => {
            let Some(_lock) = ctx
                .0
                .locks
                .acquire(&namespace, &name, "reconcile_allocation::addr_deleted")
                .await
            else {
                warn!("lock contended for {namespace}/{name}; requeuing");
                return Ok(Action::requeue(Duration::from_secs(5)));
            };
            drop_deleted_bindings_and_repend(&namespace, &name, ctx.0.clone()).await
        }
    }
}

/// Drops any binding whose address is no longer resolvable against its pool
/// and moves the allocation back to Pending so the allocator re-derives it.
async fn drop_deleted_bindings_and_repend(
    namespace: &str,
    name: &str,
    ctx: Arc<ControllerContext>,
) -> Result<Action> {
    let api = ctx.allocations(namespace);
    let Some(mut current) = api.get(name).await? else {
        return Ok(Action::await_change());
    };
    current.spec.allocations.retain(|b| b.pool.is_some() || current.spec.ip_type == IpType::Ephemeral);
    let mut status = current.status.take().unwrap_or_default();
    status.state = Some(AllocationState::Pending);
    status.message = "re-deriving after address removal".to_string();
    current.status = Some(status);
    write_with_retry(&api, current).await?;
    Ok(Action::await_change())
}

/// §4.4 Allocator: runs the side-effect table for every binding of a
/// Pending allocation.
async fn run_allocator(namespace: &str, name: &str, ctx: Arc<ControllerContext>) -> Result<Action> {
    let api = ctx.allocations(namespace);
    let Some(mut current) = api.get(name).await? else {
        return Ok(Action::await_change());
    };

    let result = allocate_all_bindings(namespace, &mut current, ctx.clone()).await;
    let mut status = current.status.take().unwrap_or_default();
    match result {
        Ok(()) => {
            status.state = Some(AllocationState::Success);
            status.message = String::new();
            current.status = Some(status);
            write_with_retry(&api, current.clone()).await?;
            if current.spec.ip_type == IpType::Ephemeral {
                if let Some(binding) = current.spec.allocations.first() {
                    write_ingress_for(namespace, name, vec![binding.address.clone()], ctx).await?;
                }
            }
        }
        Err(e) => {
            let next_state = match e.classify() {
                FailureKind::NodeUnreachable => AllocationState::NodeError,
                _ => AllocationState::Error,
            };
            warn!("allocator failed for {namespace}/{name}: {e}");
            status.state = Some(next_state);
            status.message = e.to_string();
            current.status = Some(status);
            write_with_retry(&api, current).await?;
        }
    }
    Ok(Action::await_change())
}

async fn allocate_all_bindings(
    namespace: &str,
    alloc: &mut IPAllocation,
    ctx: Arc<ControllerContext>,
) -> std::result::Result<(), plenuslb_shared::error::SharedError> {
    match alloc.spec.ip_type {
        IpType::Persistent => {
            let mut resolved = Vec::with_capacity(alloc.spec.allocations.len());
            for binding in alloc.spec.allocations.clone() {
                resolved.push(allocate_persistent_binding(namespace, binding, ctx.clone()).await?);
            }
            alloc.spec.allocations = resolved;
        }
        IpType::Ephemeral => {
            let binding = alloc.spec.allocations.first().cloned().unwrap_or_default();
            let resolved = allocate_ephemeral_binding(namespace, binding, ctx.clone()).await?;
            alloc.spec.allocations = vec![resolved];
        }
    }
    Ok(())
}

async fn allocate_persistent_binding(
    namespace: &str,
    mut binding: AddrBinding,
    ctx: Arc<ControllerContext>,
) -> std::result::Result<AddrBinding, plenuslb_shared::error::SharedError> {
    use plenuslb_shared::error::SharedError;

    let pool_name = match ctx.pool_tracker.use_ip(namespace, &binding.address) {
        Some(p) => p,
        None => {
            return Err(SharedError::DataInvariantViolated(format!(
                "address {} is not available in any pool allowing namespace {namespace}",
                binding.address
            )))
        }
    };
    ctx.pool_tracker
        .ensure_address_is_not_available(&pool_name, &binding.address);
    binding.pool = Some(pool_name.clone());

    let pool = ctx
        .persistent_pools()
        .get(&pool_name)
        .await?
        .ok_or_else(|| SharedError::DataInvariantViolated(format!("pool {pool_name} vanished")))?;

    apply_pool_options(&mut binding, namespace, &pool.spec, ctx).await?;
    Ok(binding)
}

async fn allocate_ephemeral_binding(
    namespace: &str,
    mut binding: AddrBinding,
    ctx: Arc<ControllerContext>,
) -> std::result::Result<AddrBinding, plenuslb_shared::error::SharedError> {
    use plenuslb_shared::error::SharedError;

    let pool_name = binding
        .pool
        .clone()
        .ok_or_else(|| SharedError::DataInvariantViolated("ephemeral binding missing pool reference".into()))?;
    let pool = ctx
        .ephemeral_pools()
        .get(&pool_name)
        .await?
        .ok_or_else(|| SharedError::DataInvariantViolated(format!("pool {pool_name} vanished")))?;

    let node_name = pick_node(&pool.spec.host_interface(), ctx.clone()).await?;
    binding.node_name = Some(node_name.clone());

    let adapter = plenuslb_shared::cloud::resolve(&pool.spec.cloud_integration)
        .ok_or_else(|| SharedError::DataInvariantViolated("no cloud provider configured".into()))?;
    if binding.address.is_empty() {
        let minted = adapter
            .get_and_assign_new(&node_name, &format!("{namespace}"))
            .await?;
        binding.address = minted;
    } else {
        adapter.assign_to_server(&binding.address, &node_name).await?;
    }
    binding.cloud_provider = pool.spec.cloud_integration.provider_name().map(str::to_string);

    if let Some(hi) = pool.spec.host_interface() {
        binding.interface_name = Some(hi.interface_name.clone());
        agent_speaker::ensure_ip_allocation_on_node(&ctx.agents, &node_name, &hi.interface_name, &binding.address)
            .await?;
    }
    Ok(binding)
}

/// Applies §4.4's side-effect table for a Persistent binding whose pool is
/// already resolved.
async fn apply_pool_options(
    binding: &mut AddrBinding,
    _namespace: &str,
    pool: &PersistentIpPoolSpec,
    ctx: Arc<ControllerContext>,
) -> std::result::Result<(), plenuslb_shared::error::SharedError> {
    let host_interface = pool.host_interface();
    let cloud = pool.cloud_integration.as_ref().and_then(plenuslb_shared::cloud::resolve);

    let node_name = pick_node(&host_interface, ctx.clone()).await?;
    binding.node_name = Some(node_name.clone());

    if let Some(hi) = host_interface {
        binding.interface_name = Some(hi.interface_name.clone());
        agent_speaker::ensure_ip_allocation_on_node(&ctx.agents, &node_name, &hi.interface_name, &binding.address)
            .await?;
    }
    if let Some(adapter) = cloud {
        adapter.assign_to_server(&binding.address, &node_name).await?;
        binding.cloud_provider = pool.cloud_integration.as_ref().and_then(|c| c.provider_name()).map(str::to_string);
    }
    Ok(())
}

/// §4.4 Node picking: host-interface pools pick a ready agent; cloud-only
/// pools pick a node from the orchestrator's node list.
async fn pick_node(
    host_interface: &Option<&HostNetworkInterfaceOptions>,
    ctx: Arc<ControllerContext>,
) -> std::result::Result<String, plenuslb_shared::error::SharedError> {
    use plenuslb_shared::error::SharedError;

    if host_interface.is_some() {
        let agent = ctx.agents.pick_ready_random().await.ok_or_else(|| {
            SharedError::Rpc(tonic::Status::unavailable("no ready node agent available"))
        })?;
        return Ok(agent.node_name);
    }
    let nodes = ctx.nodes().list().await?;
    let backoff = Backoff::NODE_PICK;
    if let Some(node) = pick_random_node(&nodes.items) {
        return Ok(node);
    }
    for (_, delay) in backoff.steps() {
        tokio::time::sleep(delay).await;
        let nodes = ctx.nodes().list().await?;
        if let Some(node) = pick_random_node(&nodes.items) {
            return Ok(node);
        }
    }
    Err(SharedError::DataInvariantViolated("no cluster nodes available to route to".into()))
}

fn pick_random_node(nodes: &[k8s_openapi::api::core::v1::Node]) -> Option<String> {
    use rand::seq::SliceRandom;
    nodes
        .iter()
        .map(|n| n.name_any())
        .collect::<Vec<_>>()
        .choose(&mut rand::thread_rng())
        .cloned()
}

/// §4.4 "Relocation": pick a new node for every binding, then move back to
/// Pending so the allocator runs against it. The old node's binding is left
/// for the Cleanup sweep to reconcile if the node returns.
async fn relocate(namespace: &str, name: &str, ctx: Arc<ControllerContext>) -> Result<Action> {
    let api = ctx.allocations(namespace);
    let Some(mut current) = api.get(name).await? else {
        return Ok(Action::await_change());
    };
    for binding in &mut current.spec.allocations {
        binding.node_name = None;
    }
    let mut status = current.status.take().unwrap_or_default();
    status.state = Some(AllocationState::Pending);
    status.message = "relocating after node loss".to_string();
    current.status = Some(status);
    write_with_retry(&api, current).await?;
    Ok(Action::await_change())
}

/// §4.2 Error-retry loop: `{initial=1s, factor=1.2, jitter=0.2, cap=5min,
/// steps=552}`, re-fetching and re-attempting allocation each iteration.
async fn run_error_retry_loop(namespace: String, name: String, ctx: Arc<ControllerContext>) {
    let backoff = Backoff::ERROR_RETRY;
    let done = AtomicBool::new(false);
    for (step, delay) in backoff.steps() {
        if done.load(Ordering::Relaxed) {
            break;
        }
        tokio::time::sleep(delay).await;
        let Some(_lock) = ctx
            .locks
            .acquire(&namespace, &name, "reconcile_allocation::error_retry")
            .await
        else {
            warn!("lock contended for {namespace}/{name} at error-retry step {step}; trying again next step");
            continue;
        };
        let api = ctx.allocations(&namespace);
        let Ok(Some(current)) = api.get(&name).await else {
            break;
        };
        if current.status.as_ref().and_then(|s| s.state) != Some(AllocationState::Error) {
            trace!("allocation {namespace}/{name} left Error state; ending retry loop at step {step}");
            break;
        }
        match run_allocator(&namespace, &name, ctx.clone()).await {
            Ok(_) => {
                if let Ok(Some(after)) = ctx.allocations(&namespace).get(&name).await {
                    if after.status.as_ref().and_then(|s| s.state) != Some(AllocationState::Error) {
                        done.store(true, Ordering::Relaxed);
                    }
                }
            }
            Err(e) => warn!("error-retry step {step} for {namespace}/{name} failed: {e}"),
        }
    }
    if !done.load(Ordering::Relaxed) {
        if let Ok(Some(mut current)) = ctx.allocations(&namespace).get(&name).await {
            if current.status.as_ref().and_then(|s| s.state) == Some(AllocationState::Error) {
                info!("allocation {namespace}/{name} exhausted its error-retry budget; marking Failed");
                let mut status = current.status.take().unwrap_or_default();
                status.state = Some(AllocationState::Failed);
                status.message = "error-retry budget exhausted".to_string();
                current.status = Some(status);
                let _ = ctx.allocations(&namespace).apply(current, "plenuslb-controller").await;
            }
        }
    }
}

/// Writes an IPAllocation's status with optimistic-concurrency retry per
/// §4.2 ("All writes to the Allocation use the external store's
/// resource-version check and retry on conflict").
async fn write_with_retry(
    api: &Box<dyn plenuslb_shared::k8s::api::Api<IPAllocation>>,
    obj: IPAllocation,
) -> Result<()> {
    let backoff = Backoff::OPTIMISTIC_CONCURRENCY;
    let name = obj.name_any();
    let mut attempt = obj;
    match api.apply(attempt.clone(), "plenuslb-controller").await {
        Ok(_) => return Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => {}
        Err(e) => return Err(e.into()),
    }
    for (_, delay) in backoff.steps() {
        tokio::time::sleep(delay).await;
        let Some(latest) = api.get(&name).await? else {
            return Ok(());
        };
        attempt = IPAllocation {
            status: attempt.status.clone(),
            ..latest
        };
        match api.apply(attempt.clone(), "plenuslb-controller").await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ControllerError::DataInvariantViolated(format!(
        "could not write {name} after exhausting optimistic-concurrency retries"
    )))
}

async fn write_ingress_for(
    namespace: &str,
    name: &str,
    addresses: Vec<String>,
    ctx: Arc<ControllerContext>,
) -> Result<()> {
    let Some(svc) = ctx.services(namespace).get(name).await? else {
        return Ok(());
    };
    write_ingress(&svc, ctx, addresses).await
}
