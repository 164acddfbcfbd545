//! Pool Watcher (§4.1 "For a Pool modification event" / "For a Pool
//! deletion event"): keeps the in-memory [`super::pool_tracker::PoolTracker`]
//! in sync with `PersistentIPPool`/`EphemeralIPPool` objects and marks
//! bindings that lose their backing address as `AddrDeleted`.
//!
//! Grounded on `pkg/controller/persistentips/poolsManager.go`'s
//! pool-modified/pool-deleted handlers.

use super::controller_ctx::ControllerContext;
use super::pool_tracker::bound_addresses;
use super::Result;
use futures::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use log::{info, warn};
use plenuslb_shared::plenuslb::allocation::{AllocationState, IPAllocation};
use plenuslb_shared::plenuslb::pool::{EphemeralIPPool, PersistentIPPool};
use std::sync::Arc;

/// Seeds the availability tracker from the cluster's current
/// `PersistentIPPool`s and `IPAllocation`s (§5 "pool availability warm-up"),
/// run once after acquiring leadership and before starting any watch.
pub async fn warm_up(ctx: &ControllerContext) -> Result<()> {
    let pools = ctx.persistent_pools().list().await?.items;
    let allocations = ctx.allocations_all().list().await?.items;
    let bound = bound_addresses(
        allocations
            .iter()
            .flat_map(|a| a.spec.allocations.iter())
            .filter(|b| b.pool.is_some()),
    );
    let pool_count = pools.len();
    let entries = pools.into_iter().map(|p| (p.name_any(), p.spec));
    ctx.pool_tracker.warm_up(entries, &bound);
    info!("pool availability tracker warmed up from {pool_count} pool(s)");
    Ok(())
}

/// Runs the PersistentIPPool and EphemeralIPPool watches side by side; each
/// only updates shared state (tracker, allocation statuses) and never
/// competes with the other for locks.
pub async fn run(ctx: Arc<ControllerContext>) {
    let persistent = watch_persistent(ctx.clone());
    let ephemeral = watch_ephemeral(ctx.clone());
    tokio::select! {
        _ = persistent => {}
        _ = ephemeral => {}
        _ = ctx.cancellation.cancelled() => {}
    }
}

async fn watch_persistent(ctx: Arc<ControllerContext>) {
    let api = ctx.persistent_pools().as_inner();
    let mut stream = Box::pin(watcher::watcher(api, watcher::Config::default()).default_backoff());
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(pool)) => {
                if let Err(e) = on_persistent_modified(&pool, ctx.clone()).await {
                    warn!("persistent pool {} modify handling failed: {e}", pool.name_any());
                }
            }
            Ok(watcher::Event::Delete(pool)) => {
                if let Err(e) = on_persistent_deleted(&pool, ctx.clone()).await {
                    warn!("persistent pool {} delete handling failed: {e}", pool.name_any());
                }
            }
            Ok(watcher::Event::InitApply(pool)) => {
                if let Err(e) = on_persistent_modified(&pool, ctx.clone()).await {
                    warn!("persistent pool {} warm-up failed: {e}", pool.name_any());
                }
            }
            Ok(_) => {}
            Err(e) => warn!("persistent pool watch error: {e}"),
        }
    }
}

async fn watch_ephemeral(ctx: Arc<ControllerContext>) {
    let api = ctx.ephemeral_pools().as_inner();
    let mut stream = Box::pin(watcher::watcher(api, watcher::Config::default()).default_backoff());
    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(pool)) => {
                if let Err(e) = on_ephemeral_modified(&pool, ctx.clone()).await {
                    warn!("ephemeral pool {} modify handling failed: {e}", pool.name_any());
                }
            }
            Ok(watcher::Event::Delete(pool)) => {
                on_ephemeral_deleted(&pool);
            }
            Ok(_) => {}
            Err(e) => warn!("ephemeral pool watch error: {e}"),
        }
    }
}

/// Recomputes availability for a created/modified persistent pool, and marks
/// any Allocation binding an address no longer present as `AddrDeleted`.
async fn on_persistent_modified(pool: &PersistentIPPool, ctx: Arc<ControllerContext>) -> Result<()> {
    let name = pool.name_any();
    let all = list_allocations(ctx.clone()).await?;

    let bound: std::collections::HashSet<String> = bound_addresses(
        all.iter()
            .flat_map(|a| a.spec.allocations.iter())
            .filter(|b| b.pool.as_deref() == Some(name.as_str())),
    );
    ctx.pool_tracker
        .process_ip_availability(&name, pool.spec.clone(), &bound);

    for allocation in &all {
        for binding in &allocation.spec.allocations {
            if binding.pool.as_deref() != Some(name.as_str()) {
                continue;
            }
            if !pool.spec.addresses.contains(&binding.address) {
                mark_addr_deleted(allocation, ctx.clone()).await?;
            }
        }
    }
    Ok(())
}

async fn on_persistent_deleted(pool: &PersistentIPPool, ctx: Arc<ControllerContext>) -> Result<()> {
    let name = pool.name_any();
    info!("persistent pool {name} deleted; dropping its allocations' bindings");
    let all = list_allocations(ctx.clone()).await?;
    for allocation in &all {
        if allocation
            .spec
            .allocations
            .iter()
            .any(|b| b.pool.as_deref() == Some(name.as_str()))
        {
            mark_addr_deleted(allocation, ctx.clone()).await?;
        }
    }
    Ok(())
}

/// Ephemeral pools carry no availability tracker entry (§3); a shape change
/// (e.g. host-interface option toggled) re-pends every allocation drawing
/// from this pool so the allocator re-applies the pool's current options.
async fn on_ephemeral_modified(pool: &EphemeralIPPool, ctx: Arc<ControllerContext>) -> Result<()> {
    let name = pool.name_any();
    let all = list_allocations(ctx.clone()).await?;
    let mut re_pended = 0;
    for allocation in &all {
        if allocation
            .spec
            .allocations
            .iter()
            .any(|b| b.pool.as_deref() == Some(name.as_str()))
        {
            re_pend_for_pool_change(allocation, ctx.clone()).await?;
            re_pended += 1;
        }
    }
    info!("ephemeral pool {name} modified; re-pended {re_pended} allocation(s) to re-patch");
    Ok(())
}

/// Moves an allocation drawing from a modified ephemeral pool back to
/// `Pending`, keeping its existing binding as a hint so the allocator
/// re-assigns against the pool's current options instead of minting fresh.
async fn re_pend_for_pool_change(allocation: &IPAllocation, ctx: Arc<ControllerContext>) -> Result<()> {
    let namespace = allocation.namespace().unwrap_or_default();
    let name = allocation.name_any();
    let Some(_lock) = ctx.locks.acquire(&namespace, &name, "reconcile_pool").await else {
        warn!("lock contended for {namespace}/{name}; skipping, the next pool event will retry");
        return Ok(());
    };
    let api = ctx.allocations(&namespace);
    if let Some(mut current) = api.get(&name).await? {
        let mut status = current.status.take().unwrap_or_default();
        status.state = Some(AllocationState::Pending);
        status.message = "re-deriving after ephemeral pool change".to_string();
        current.status = Some(status);
        api.apply(current, "plenuslb-controller").await?;
    }
    Ok(())
}

fn on_ephemeral_deleted(pool: &EphemeralIPPool) {
    info!(
        "ephemeral pool {} deleted; allocations referencing it will fail allocation and retry",
        pool.name_any()
    );
}

async fn mark_addr_deleted(allocation: &IPAllocation, ctx: Arc<ControllerContext>) -> Result<()> {
    let namespace = allocation.namespace().unwrap_or_default();
    let name = allocation.name_any();
    let Some(_lock) = ctx.locks.acquire(&namespace, &name, "reconcile_pool").await else {
        warn!("lock contended for {namespace}/{name}; skipping, the next pool event will retry");
        return Ok(());
    };
    let api = ctx.allocations(&namespace);
    if let Some(mut current) = api.get(&name).await? {
        let mut status = current.status.take().unwrap_or_default();
        status.state = Some(AllocationState::AddressDeletedFromPool);
        status.message = "address removed from backing pool".to_string();
        current.status = Some(status);
        api.apply(current, "plenuslb-controller").await?;
    }
    Ok(())
}

async fn list_allocations(ctx: Arc<ControllerContext>) -> Result<Vec<IPAllocation>> {
    Ok(ctx.allocations_all().list().await?.items)
}
