//! Cloud-provider integration for ephemeral and host-interface pools.
//!
//! [`CloudAdapter`] is the trait the controller's allocator talks to; one
//! concrete implementation ships today ([`hetzner::HetznerAdapter`]).
//! [`resolve`] picks the adapter from a pool's [`crate::plenuslb::pool::CloudIntegrations`].

pub mod hetzner;

use crate::error::SharedError;
use crate::plenuslb::pool::CloudIntegrations;
use async_trait::async_trait;
use mockall::automock;

/// The four operations the allocator needs from any cloud provider.
#[automock]
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    /// Assigns an existing address to a server.
    async fn assign_to_server(&self, address: &str, server_name: &str) -> Result<(), SharedError>;
    /// Unassigns an address from whatever server currently holds it.
    async fn unassign(&self, address: &str) -> Result<(), SharedError>;
    /// Mints a new address, named `ip_name`, and assigns it to `server_name`.
    async fn get_and_assign_new(
        &self,
        server_name: &str,
        ip_name: &str,
    ) -> Result<String, SharedError>;
    /// Permanently deletes a minted address.
    async fn delete(&self, address: &str) -> Result<(), SharedError>;
}

/// Resolves the concrete adapter for a pool's cloud integration, or `None`
/// when the pool carries no integration at all.
pub fn resolve(integrations: &CloudIntegrations) -> Option<Box<dyn CloudAdapter>> {
    if let Some(hz) = &integrations.hetzner {
        return Some(Box::new(hetzner::HetznerAdapter::new(hz.token.clone())));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plenuslb::pool::HetznerCloud;

    #[test]
    fn resolve_picks_hetzner_when_present() {
        let integ = CloudIntegrations {
            hetzner: Some(HetznerCloud {
                token: "t".to_string(),
            }),
        };
        assert!(resolve(&integ).is_some());
    }

    #[test]
    fn resolve_returns_none_for_empty_integration() {
        assert!(resolve(&CloudIntegrations::default()).is_none());
    }
}
