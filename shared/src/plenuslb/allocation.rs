use kube::CustomResource;
use schemars::JsonSchema;

/// Kind of an allocation: whether its addresses are drawn from a
/// pre-declared pool or minted on demand from a cloud provider.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    Persistent,
    Ephemeral,
}

/// One bound address within an allocation.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddrBinding {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<String>,
}

/// Status states in the Allocation lifecycle (§4.2 of the design).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    Pending,
    Success,
    Error,
    NodeError,
    Failed,
    AddressDeletedFromPool,
}

impl std::fmt::Display for AllocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AllocationState::Pending => "pending",
            AllocationState::Success => "success",
            AllocationState::Error => "error",
            AllocationState::NodeError => "node_error",
            AllocationState::Failed => "failed",
            AllocationState::AddressDeletedFromPool => "address_deleted_from_pool",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IpAllocationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AllocationState>,
    #[serde(default)]
    pub message: String,
}

/// `IPAllocation` is the controller-owned, per-workload record. Created by
/// the reconciler, mutated only by the allocation state machine; never
/// written by administrators.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "plenus.io",
    version = "v1alpha1",
    kind = "IPAllocation",
    namespaced,
    status = "IpAllocationStatus",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IpAllocationSpec {
    #[serde(rename = "type")]
    pub ip_type: IpType,
    pub allocations: Vec<AddrBinding>,
}

impl IpAllocationSpec {
    /// §3 invariant: Ephemeral ⇒ len(bindings) ≤ 1.
    pub fn is_well_formed(&self) -> bool {
        match self.ip_type {
            IpType::Ephemeral => self.allocations.len() <= 1,
            IpType::Persistent => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_with_more_than_one_binding_is_malformed() {
        let spec = IpAllocationSpec {
            ip_type: IpType::Ephemeral,
            allocations: vec![
                AddrBinding {
                    address: "1.2.3.4".into(),
                    ..Default::default()
                },
                AddrBinding {
                    address: "1.2.3.5".into(),
                    ..Default::default()
                },
            ],
        };
        assert!(!spec.is_well_formed());
    }

    #[test]
    fn persistent_allows_multiple_bindings() {
        let spec = IpAllocationSpec {
            ip_type: IpType::Persistent,
            allocations: vec![
                AddrBinding {
                    address: "1.2.3.4".into(),
                    ..Default::default()
                },
                AddrBinding {
                    address: "1.2.3.5".into(),
                    ..Default::default()
                },
            ],
        };
        assert!(spec.is_well_formed());
    }

    #[test]
    fn state_display_matches_wire_format() {
        assert_eq!(AllocationState::NodeError.to_string(), "node_error");
        assert_eq!(
            AllocationState::AddressDeletedFromPool.to_string(),
            "address_deleted_from_pool"
        );
    }
}
