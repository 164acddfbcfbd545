//! Observer loop, per §4.5: waits for kernel address-update notifications
//! and re-asserts every tracked binding on each one. A reconciliation pass
//! that doesn't finish within [`DEADLINE`] is treated as fatal, since it
//! means the kernel or this agent's own state has drifted in a way a retry
//! cannot fix.

use crate::util::interface_store::InterfaceStore;
use crate::util::kernel::Kernel;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

const DEADLINE: Duration = Duration::from_secs(5);

/// Runs until a reconciliation pass misses [`DEADLINE`] or the kernel
/// notification stream errors out; either is unrecoverable and the caller
/// should exit the process.
pub async fn run(store: Arc<InterfaceStore>, kernel: Arc<dyn Kernel>) -> anyhow::Result<()> {
    info!("observer loop starting");
    loop {
        kernel.wait_for_address_update().await?;
        match tokio::time::timeout(DEADLINE, store.reassert_all(kernel.as_ref())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("observer reconciliation failed: {e}");
                return Err(e);
            }
            Err(_) => {
                error!("observer reconciliation missed its {DEADLINE:?} deadline");
                anyhow::bail!("observer reconciliation deadline exceeded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::kernel::MockKernel;

    #[tokio::test]
    async fn notification_stream_error_propagates() {
        let store = Arc::new(InterfaceStore::new());
        let mut kernel = MockKernel::new();
        kernel
            .expect_wait_for_address_update()
            .returning(|| Err(anyhow::anyhow!("netlink socket closed")));
        let kernel: Arc<dyn Kernel> = Arc::new(kernel);

        let result = run(store, kernel).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reconciliation_failure_is_returned() {
        let mut kernel = MockKernel::new();
        kernel.expect_add_address().returning(|_, _| Ok(()));
        let store = Arc::new(InterfaceStore::new());
        store
            .add_address(&kernel, "eth0", "10.0.0.1")
            .await
            .unwrap();

        let mut kernel = MockKernel::new();
        kernel.expect_wait_for_address_update().returning(|| Ok(()));
        kernel
            .expect_add_address()
            .returning(|_, _| Err(anyhow::anyhow!("interface vanished")));
        let kernel: Arc<dyn Kernel> = Arc::new(kernel);

        let result = run(store, kernel).await;
        assert!(result.is_err());
    }
}
