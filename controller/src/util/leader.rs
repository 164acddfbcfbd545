//! Leader election against a single cluster-wide Lease (§5 "Leader
//! election"). Only the leader starts watches, the allocation state
//! machine, and pool warm-up; losing the lease cancels the root
//! [`tokio_util::sync::CancellationToken`] and the process exits.
//!
//! Grounded on `pkg/controller/leader/election.go`'s acquire/renew/retry
//! loop; the concrete Lease read/write is delegated to `kube-leader-election`
//! rather than hand-rolled, as seen elsewhere in the example pack.

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

pub const LEASE_NAME: &str = "plenus.io-leader-lease";
pub const LEASE_DURATION: std::time::Duration = std::time::Duration::from_secs(60);
pub const RENEW_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15);
pub const RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Runs the acquire/renew loop forever. Invokes `on_acquired` exactly once
/// per leadership span, passing it the root cancellation token; `on_acquired`
/// is expected to spawn the controller's watches and return a handle the
/// caller can abort when leadership is lost. Returns once `shutdown` fires.
pub async fn run<F>(
    client: Client,
    namespace: String,
    holder_id: String,
    shutdown: CancellationToken,
    mut on_acquired: F,
) where
    F: FnMut(CancellationToken) -> tokio::task::JoinHandle<()>,
{
    let lock = LeaseLock::new(
        client,
        &namespace,
        LeaseLockParams {
            holder_id,
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_DURATION,
        },
    );

    let mut leading: Option<(CancellationToken, tokio::task::JoinHandle<()>)> = None;
    let mut tick = tokio::time::interval(RENEW_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some((scope, task)) = leading.take() {
                    scope.cancel();
                    task.abort();
                }
                break;
            }
            _ = tick.tick() => {}
        }

        match lock.try_acquire_or_renew().await {
            Ok(LeaseLockResult::Acquired(_)) => {
                if leading.is_none() {
                    info!("acquired leadership on lease {LEASE_NAME}");
                    let scope = shutdown.child_token();
                    let task = on_acquired(scope.clone());
                    leading = Some((scope, task));
                }
            }
            Ok(_) => {
                if let Some((scope, task)) = leading.take() {
                    warn!("lost leadership on lease {LEASE_NAME}; tearing down");
                    scope.cancel();
                    task.abort();
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                error!("leader election acquire/renew failed: {e}");
                if let Some((scope, task)) = leading.take() {
                    scope.cancel();
                    task.abort();
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}
