//! Registry of known node-agent pods (§2, §4.4 "Node picking").
//!
//! Grounded on `pkg/controller/operator/operatorslist.go`'s in-memory pod
//! store and `GetRandomOperatorNode`/`SearchOperatorByClusterNodeName`.

use log::trace;
use plenuslb_shared::plenuslb::retry::Backoff;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::RwLock;

pub const NODE_AGENT_PORT: u16 = 10000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentInfo {
    pub pod_ip: String,
    pub node_name: String,
    pub ready: bool,
}

impl AgentInfo {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.pod_ip, NODE_AGENT_PORT)
    }
}

/// Keyed by pod name, kept current by the node-agent-pod reconciler
/// ([`super::reconcile_node_agent`]).
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentInfo>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        AgentRegistry {
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, pod_name: String, info: AgentInfo) {
        self.agents.write().unwrap().insert(pod_name, info);
    }

    pub fn remove(&self, pod_name: &str) -> Option<AgentInfo> {
        self.agents.write().unwrap().remove(pod_name)
    }

    pub fn by_node_name(&self, node_name: &str) -> Option<AgentInfo> {
        self.agents
            .read()
            .unwrap()
            .values()
            .find(|a| a.node_name == node_name)
            .cloned()
    }

    pub fn all(&self) -> Vec<AgentInfo> {
        self.agents.read().unwrap().values().cloned().collect()
    }

    /// Every agent except the one on `node_name`, ready or not (§4.4
    /// `EnsureIPAllocationOnNode`'s "remove from every other ready agent").
    pub fn all_except(&self, node_name: &str) -> Vec<AgentInfo> {
        self.agents
            .read()
            .unwrap()
            .values()
            .filter(|a| a.node_name != node_name)
            .cloned()
            .collect()
    }

    /// Picks a random ready agent, retrying with [`Backoff::NODE_PICK`] while
    /// none is ready.
    pub async fn pick_ready_random(&self) -> Option<AgentInfo> {
        let backoff = Backoff::NODE_PICK;
        if let Some(agent) = self.pick_ready_once() {
            return Some(agent);
        }
        for (_step, delay) in backoff.steps() {
            tokio::time::sleep(delay).await;
            if let Some(agent) = self.pick_ready_once() {
                return Some(agent);
            }
        }
        trace!("pick_ready_random: exhausted node-pick back-off with no ready agent");
        None
    }

    fn pick_ready_once(&self) -> Option<AgentInfo> {
        let guard = self.agents.read().unwrap();
        let ready: Vec<&AgentInfo> = guard.values().filter(|a| a.ready).collect();
        ready.choose(&mut rand::thread_rng()).map(|a| (*a).clone())
    }

    pub fn count(&self) -> usize {
        self.agents.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(node: &str, ready: bool) -> AgentInfo {
        AgentInfo {
            pod_ip: "10.0.0.1".to_string(),
            node_name: node.to_string(),
            ready,
        }
    }

    #[test]
    fn by_node_name_finds_registered_agent() {
        let registry = AgentRegistry::new();
        registry.upsert("pod-a".to_string(), agent("node-a", true));
        assert!(registry.by_node_name("node-a").is_some());
        assert!(registry.by_node_name("node-b").is_none());
    }

    #[test]
    fn all_except_excludes_only_the_named_node() {
        let registry = AgentRegistry::new();
        registry.upsert("pod-a".to_string(), agent("node-a", true));
        registry.upsert("pod-b".to_string(), agent("node-b", true));
        let others = registry.all_except("node-a");
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].node_name, "node-b");
    }

    #[tokio::test]
    async fn pick_ready_random_skips_not_ready_agents() {
        let registry = AgentRegistry::new();
        registry.upsert("pod-a".to_string(), agent("node-a", false));
        registry.upsert("pod-b".to_string(), agent("node-b", true));
        let picked = registry.pick_ready_random().await.unwrap();
        assert_eq!(picked.node_name, "node-b");
    }
}
