use kube::CustomResource;
use schemars::JsonSchema;
use std::collections::BTreeSet;

/// `HostNetworkInterfaceOptions` tells the allocator to bind addresses
/// directly on a node's network interface via the node agent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostNetworkInterfaceOptions {
    pub add_addresses_to_interface: bool,
    pub interface_name: String,
}

/// `PoolOptions` is shared between the two pool kinds.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_network_interface: Option<HostNetworkInterfaceOptions>,
}

/// Hetzner Cloud Floating IP integration. The only concrete cloud provider
/// this system ships; `CloudIntegrations` is deliberately a struct-of-options
/// (first non-empty field wins) so adding a second provider is additive.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HetznerCloud {
    pub token: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudIntegrations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hetzner: Option<HetznerCloud>,
}

impl CloudIntegrations {
    /// First-non-empty-field provider name, used to resolve the concrete
    /// [`crate::cloud::CloudAdapter`] implementation for a pool.
    pub fn provider_name(&self) -> Option<&'static str> {
        if self.hetzner.is_some() {
            return Some("hetzner");
        }
        None
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpPoolStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub message: String,
}

/// `PersistentIPPool` is a cluster-scoped set of administrator-declared
/// addresses. Allocations draw addresses from it via the availability
/// tracker; it is read-only to the core outside of that in-memory ledger.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "plenus.io",
    version = "v1alpha1",
    kind = "PersistentIPPool",
    status = "IpPoolStatus",
    printcolumn = r#"{"name":"Addresses", "type":"integer", "jsonPath":".spec.addresses.length"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PersistentIpPoolSpec {
    pub addresses: BTreeSet<String>,
    pub allowed_namespaces: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_integration: Option<CloudIntegrations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PoolOptions>,
}

impl PersistentIpPoolSpec {
    /// A pool's namespace ACL is universal when `allowedNamespaces` is empty.
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.allowed_namespaces.is_empty() || self.allowed_namespaces.contains(namespace)
    }

    pub fn host_interface(&self) -> Option<&HostNetworkInterfaceOptions> {
        self.options
            .as_ref()
            .and_then(|o| o.host_network_interface.as_ref())
            .filter(|hi| hi.add_addresses_to_interface)
    }
}

/// `EphemeralIPPool` mints addresses on demand from a cloud provider; it has
/// no pre-declared address set and therefore no availability tracker entry.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "plenus.io",
    version = "v1alpha1",
    kind = "EphemeralIPPool",
    status = "IpPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralIpPoolSpec {
    pub allowed_namespaces: BTreeSet<String>,
    pub cloud_integration: CloudIntegrations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PoolOptions>,
}

impl EphemeralIpPoolSpec {
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.allowed_namespaces.is_empty() || self.allowed_namespaces.contains(namespace)
    }

    pub fn host_interface(&self) -> Option<&HostNetworkInterfaceOptions> {
        self.options
            .as_ref()
            .and_then(|o| o.host_network_interface.as_ref())
            .filter(|hi| hi.add_addresses_to_interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_acl_is_empty_allowed_namespaces() {
        let spec = PersistentIpPoolSpec {
            addresses: BTreeSet::new(),
            allowed_namespaces: BTreeSet::new(),
            cloud_integration: None,
            options: None,
        };
        assert!(spec.allows_namespace("any-namespace"));
    }

    #[test]
    fn acl_rejects_namespace_not_listed() {
        let mut allowed = BTreeSet::new();
        allowed.insert("ns1".to_string());
        let spec = PersistentIpPoolSpec {
            addresses: BTreeSet::new(),
            allowed_namespaces: allowed,
            cloud_integration: None,
            options: None,
        };
        assert!(spec.allows_namespace("ns1"));
        assert!(!spec.allows_namespace("ns2"));
    }

    #[test]
    fn provider_name_resolves_hetzner() {
        let integ = CloudIntegrations {
            hetzner: Some(HetznerCloud {
                token: "t".to_string(),
            }),
        };
        assert_eq!(integ.provider_name(), Some("hetzner"));
        assert_eq!(CloudIntegrations::default().provider_name(), None);
    }
}
