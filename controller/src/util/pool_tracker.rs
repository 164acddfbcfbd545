//! In-memory Persistent Pool Availability Tracker (§4.3).
//!
//! Grounded on `pkg/controller/persistentips/poolsManager.go`'s map of pool
//! name to remaining addresses, guarded here by a single `Mutex` rather than
//! a `sync.Map` since the contention domain is small and all ops are short.

use log::{trace, warn};
use plenuslb_shared::plenuslb::allocation::AddrBinding;
use plenuslb_shared::plenuslb::pool::PersistentIpPoolSpec;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Clone, Debug)]
struct TrackedPool {
    spec: PersistentIpPoolSpec,
    remaining: VecDeque<String>,
}

pub struct PoolTracker {
    pools: Mutex<HashMap<String, TrackedPool>>,
}

impl Default for PoolTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolTracker {
    pub fn new() -> Self {
        PoolTracker {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Warm-up: `remaining = pool.addresses \ sum(existing allocation bindings)`.
    pub fn warm_up(
        &self,
        pools: impl IntoIterator<Item = (String, PersistentIpPoolSpec)>,
        bound_addresses: &std::collections::HashSet<String>,
    ) {
        let mut guard = self.pools.lock().unwrap();
        guard.clear();
        for (name, spec) in pools {
            let remaining: VecDeque<String> = spec
                .addresses
                .iter()
                .filter(|a| !bound_addresses.contains(*a))
                .cloned()
                .collect();
            if remaining.is_empty() {
                continue;
            }
            guard.insert(name, TrackedPool { spec, remaining });
        }
    }

    /// Finds the pool owning `address` and whose ACL allows `namespace`;
    /// removes the address from its remaining list. Empties out the entry if
    /// its remaining list becomes empty (§4.3: "pool present with empty list
    /// is not representable").
    pub fn use_ip(&self, namespace: &str, address: &str) -> Option<String> {
        let mut guard = self.pools.lock().unwrap();
        let pool_name = guard
            .iter()
            .find(|(_, p)| p.remaining.contains(&address.to_string()) && p.spec.allows_namespace(namespace))
            .map(|(name, _)| name.clone())?;
        let pool = guard.get_mut(&pool_name).unwrap();
        pool.remaining.retain(|a| a != address);
        trace!("use_ip: took {address} from pool {pool_name}, {} remaining", pool.remaining.len());
        if pool.remaining.is_empty() {
            guard.remove(&pool_name);
        }
        Some(pool_name)
    }

    /// Idempotent: re-adds `address` to `pool_name`'s remaining list,
    /// recreating the entry from `spec` if the pool had been emptied out.
    pub fn release_ip(&self, pool_name: &str, address: &str, spec: Option<&PersistentIpPoolSpec>) {
        let mut guard = self.pools.lock().unwrap();
        match guard.get_mut(pool_name) {
            Some(pool) => {
                if !pool.remaining.contains(&address.to_string()) {
                    pool.remaining.push_back(address.to_string());
                }
            }
            None => {
                let Some(spec) = spec else {
                    warn!(
                        "release_ip: pool {pool_name} not tracked and no spec supplied; \
                         address {address} dropped"
                    );
                    return;
                };
                let mut remaining = VecDeque::new();
                remaining.push_back(address.to_string());
                guard.insert(
                    pool_name.to_string(),
                    TrackedPool {
                        spec: spec.clone(),
                        remaining,
                    },
                );
            }
        }
    }

    /// Defensive removal used at allocator entry: drops `address` from
    /// `pool_name`'s remaining list if present, logging (not erroring) if the
    /// pool has disappeared.
    pub fn ensure_address_is_not_available(&self, pool_name: &str, address: &str) {
        let mut guard = self.pools.lock().unwrap();
        match guard.get_mut(pool_name) {
            Some(pool) => {
                pool.remaining.retain(|a| a != address);
                if pool.remaining.is_empty() {
                    guard.remove(pool_name);
                }
            }
            None => trace!("ensure_address_is_not_available: pool {pool_name} already gone"),
        }
    }

    /// Idempotent replace used on pool modification: recomputes `remaining`
    /// from `spec.addresses \ bound` and replaces the tracked entry.
    pub fn process_ip_availability(
        &self,
        pool_name: &str,
        spec: PersistentIpPoolSpec,
        bound_addresses: &std::collections::HashSet<String>,
    ) {
        let mut guard = self.pools.lock().unwrap();
        let remaining: VecDeque<String> = spec
            .addresses
            .iter()
            .filter(|a| !bound_addresses.contains(*a))
            .cloned()
            .collect();
        if remaining.is_empty() {
            guard.remove(pool_name);
        } else {
            guard.insert(pool_name.to_string(), TrackedPool { spec, remaining });
        }
    }

    #[cfg(test)]
    pub fn remaining_count(&self, pool_name: &str) -> usize {
        self.pools
            .lock()
            .unwrap()
            .get(pool_name)
            .map(|p| p.remaining.len())
            .unwrap_or(0)
    }
}

/// Collects every address currently bound by an Ephemeral or Persistent
/// allocation, used both for warm-up and for `process_ip_availability`'s
/// "already bound" filter.
pub fn bound_addresses<'a>(bindings: impl IntoIterator<Item = &'a AddrBinding>) -> std::collections::HashSet<String> {
    bindings.into_iter().map(|b| b.address.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn spec(addresses: &[&str]) -> PersistentIpPoolSpec {
        PersistentIpPoolSpec {
            addresses: addresses.iter().map(|s| s.to_string()).collect(),
            allowed_namespaces: BTreeSet::new(),
            cloud_integration: None,
            options: None,
        }
    }

    #[test]
    fn use_ip_removes_and_empties_pool() {
        let tracker = PoolTracker::new();
        tracker.warm_up(
            [("pool-a".to_string(), spec(&["1.2.3.4"]))],
            &Default::default(),
        );
        assert_eq!(tracker.use_ip("ns1", "1.2.3.4"), Some("pool-a".to_string()));
        assert_eq!(tracker.remaining_count("pool-a"), 0);
        assert_eq!(tracker.use_ip("ns1", "1.2.3.4"), None);
    }

    #[test]
    fn release_ip_recreates_emptied_pool() {
        let tracker = PoolTracker::new();
        let s = spec(&["1.2.3.4"]);
        tracker.warm_up([("pool-a".to_string(), s.clone())], &Default::default());
        tracker.use_ip("ns1", "1.2.3.4");
        tracker.release_ip("pool-a", "1.2.3.4", Some(&s));
        assert_eq!(tracker.remaining_count("pool-a"), 1);
    }

    #[test]
    fn acl_rejects_disallowed_namespace() {
        let tracker = PoolTracker::new();
        let mut s = spec(&["1.2.3.4"]);
        s.allowed_namespaces.insert("only-this".to_string());
        tracker.warm_up([("pool-a".to_string(), s)], &Default::default());
        assert_eq!(tracker.use_ip("other-ns", "1.2.3.4"), None);
        assert_eq!(tracker.use_ip("only-this", "1.2.3.4"), Some("pool-a".to_string()));
    }

    #[test]
    fn warm_up_excludes_already_bound_addresses() {
        let tracker = PoolTracker::new();
        let bound = ["1.2.3.4".to_string()].into_iter().collect();
        tracker.warm_up([("pool-a".to_string(), spec(&["1.2.3.4", "1.2.3.5"]))], &bound);
        assert_eq!(tracker.remaining_count("pool-a"), 1);
    }
}
