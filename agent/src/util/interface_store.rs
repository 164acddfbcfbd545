//! In-memory record of every address this agent has bound, per §4.5.
//!
//! `InterfaceStore` owns the single mutex guarding `assignedAddresses`. It
//! never talks to the kernel directly; callers pass in the [`Kernel`] so the
//! same store can be driven by RPC handlers and by the observer loop.

use crate::util::kernel::Kernel;
use log::info;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// `(interface, address)`, ordered so `Cleanup` diffs are deterministic.
pub type Assigned = (String, String);

pub struct InterfaceStore {
    assigned: Mutex<BTreeSet<Assigned>>,
}

impl Default for InterfaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceStore {
    pub fn new() -> Self {
        Self {
            assigned: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn snapshot(&self) -> Vec<Assigned> {
        self.assigned.lock().unwrap().iter().cloned().collect()
    }

    /// Calls the kernel to add `(interface, address)`; inserts into the set
    /// only once the kernel call succeeds. Idempotent: re-adding an address
    /// already in the set still re-asserts it in the kernel.
    pub async fn add_address(
        &self,
        kernel: &dyn Kernel,
        interface: &str,
        address: &str,
    ) -> anyhow::Result<()> {
        kernel.add_address(interface, address).await?;
        let mut guard = self.assigned.lock().unwrap();
        guard.insert((interface.to_string(), address.to_string()));
        info!("bound {address} on {interface}");
        Ok(())
    }

    /// Calls the kernel to remove `(interface, address)`; drops it from the
    /// set only once the kernel call succeeds. Removing an address that was
    /// never assigned is a no-op success.
    pub async fn remove_address(
        &self,
        kernel: &dyn Kernel,
        interface: &str,
        address: &str,
    ) -> anyhow::Result<()> {
        kernel.remove_address(interface, address).await?;
        let mut guard = self.assigned.lock().unwrap();
        guard.remove(&(interface.to_string(), address.to_string()));
        info!("unbound {address} from {interface}");
        Ok(())
    }

    /// Re-asserts every currently assigned address with the kernel. Called
    /// by the observer loop after a kernel notification, under the
    /// assumption that something on the interface may have reverted one of
    /// this agent's bindings.
    pub async fn reassert_all(&self, kernel: &dyn Kernel) -> anyhow::Result<()> {
        let snapshot = self.snapshot();
        for (interface, address) in &snapshot {
            kernel.add_address(interface, address).await?;
        }
        Ok(())
    }

    /// Replaces the whole set with `keep_these`: deletes every kernel address
    /// not in `keep_these`, then re-asserts every entry in `keep_these`
    /// (idempotent). On any kernel error the set is left untouched and the
    /// error is returned; only full success swaps in the new set.
    pub async fn cleanup(&self, kernel: &dyn Kernel, keep_these: Vec<Assigned>) -> anyhow::Result<()> {
        let keep: BTreeSet<Assigned> = keep_these.into_iter().collect();
        let current = kernel.list_bound_addresses().await?;

        for (interface, address) in current.iter() {
            if !keep.contains(&(interface.clone(), address.clone())) {
                kernel.remove_address(interface, address).await?;
            }
        }
        for (interface, address) in keep.iter() {
            kernel.add_address(interface, address).await?;
        }

        let mut guard = self.assigned.lock().unwrap();
        *guard = keep;
        info!("cleanup complete, {} address(es) retained", guard.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::kernel::MockKernel;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn add_address_inserts_only_after_kernel_succeeds() {
        let mut kernel = MockKernel::new();
        kernel
            .expect_add_address()
            .with(eq("eth0"), eq("10.0.0.1"))
            .returning(|_, _| Ok(()));

        let store = InterfaceStore::new();
        store.add_address(&kernel, "eth0", "10.0.0.1").await.unwrap();
        assert_eq!(
            store.snapshot(),
            vec![("eth0".to_string(), "10.0.0.1".to_string())]
        );
    }

    #[tokio::test]
    async fn add_address_does_not_insert_on_kernel_failure() {
        let mut kernel = MockKernel::new();
        kernel
            .expect_add_address()
            .returning(|_, _| Err(anyhow::anyhow!("netlink error")));

        let store = InterfaceStore::new();
        assert!(store.add_address(&kernel, "eth0", "10.0.0.1").await.is_err());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn remove_address_drops_from_set() {
        let mut kernel = MockKernel::new();
        kernel.expect_add_address().returning(|_, _| Ok(()));
        kernel.expect_remove_address().returning(|_, _| Ok(()));

        let store = InterfaceStore::new();
        store.add_address(&kernel, "eth0", "10.0.0.1").await.unwrap();
        store.remove_address(&kernel, "eth0", "10.0.0.1").await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn reassert_all_readds_every_entry_without_mutating_the_set() {
        let mut kernel = MockKernel::new();
        kernel.expect_add_address().times(4).returning(|_, _| Ok(()));

        let store = InterfaceStore::new();
        store.add_address(&kernel, "eth0", "10.0.0.1").await.unwrap();
        store.add_address(&kernel, "eth1", "10.0.0.2").await.unwrap();
        let before = store.snapshot();
        store.reassert_all(&kernel).await.unwrap();
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn cleanup_deletes_untracked_and_readds_kept() {
        let mut kernel = MockKernel::new();
        kernel.expect_list_bound_addresses().returning(|| {
            Ok(vec![
                ("eth0".to_string(), "10.0.0.1".to_string()),
                ("eth0".to_string(), "10.0.0.2".to_string()),
            ])
        });
        kernel
            .expect_remove_address()
            .with(eq("eth0"), eq("10.0.0.2"))
            .returning(|_, _| Ok(()));
        kernel
            .expect_add_address()
            .with(eq("eth0"), eq("10.0.0.1"))
            .returning(|_, _| Ok(()));

        let store = InterfaceStore::new();
        let keep = vec![("eth0".to_string(), "10.0.0.1".to_string())];
        store.cleanup(&kernel, keep.clone()).await.unwrap();
        assert_eq!(store.snapshot(), keep);
    }

    #[tokio::test]
    async fn cleanup_leaves_set_untouched_on_kernel_error() {
        let mut kernel = MockKernel::new();
        kernel.expect_add_address().returning(|_, _| Ok(()));
        kernel
            .expect_list_bound_addresses()
            .returning(|| Err(anyhow::anyhow!("netlink dump failed")));

        let store = InterfaceStore::new();
        store.add_address(&kernel, "eth0", "10.0.0.1").await.unwrap();
        let before = store.snapshot();
        assert!(store.cleanup(&kernel, vec![]).await.is_err());
        assert_eq!(store.snapshot(), before);
    }
}
