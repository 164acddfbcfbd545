//! Kernel-facing address operations, per §4.5. Every address this agent
//! binds carries the `<interface>:pllb` label and `RT_SCOPE_LINK` scope so
//! `Cleanup` can tell plenuslb-owned addresses apart from anything else on
//! the interface.
//!
//! [`Kernel`] is mockable the way `plenuslb_shared::os::env_var::EnvVarQuery`
//! is: a thin trait over the real syscalls, with a concrete implementation
//! backed by `rtnetlink`.

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mockall::automock;
use netlink_packet_route::address::{AddressAttribute, AddressMessage, AddressScope};
use rtnetlink::Handle;
use std::net::Ipv4Addr;

/// Suffix applied to every address label this agent manages, so `Cleanup`
/// can distinguish plenuslb-owned addresses from ones it must leave alone.
pub const LABEL_SUFFIX: &str = ":pllb";

#[automock]
#[async_trait]
pub trait Kernel: Send + Sync {
    /// Adds `address` (bare IPv4, no mask) to `interface` with a `/32` mask,
    /// the `<interface>:pllb` label, and `RT_SCOPE_LINK` scope. Idempotent:
    /// re-adding an address the kernel already carries is not an error.
    async fn add_address(&self, interface: &str, address: &str) -> anyhow::Result<()>;

    /// Removes `address` from `interface`. Removing an address the kernel
    /// does not carry is not an error.
    async fn remove_address(&self, interface: &str, address: &str) -> anyhow::Result<()>;

    /// Lists every `(interface, address)` currently carrying the
    /// `:pllb` label, across every interface on the host.
    async fn list_bound_addresses(&self) -> anyhow::Result<Vec<(String, String)>>;

    /// Blocks until the kernel reports an address change on any interface.
    /// The observer loop calls this in a loop; each return is one
    /// reconciliation pass.
    async fn wait_for_address_update(&self) -> anyhow::Result<()>;
}

pub struct RtnetlinkKernel {
    handle: Handle,
}

impl RtnetlinkKernel {
    /// Opens the netlink route socket used for add/remove/list. Notification
    /// subscription uses its own socket, opened lazily on first
    /// `wait_for_address_update` call.
    pub fn new() -> anyhow::Result<Self> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);
        Ok(Self { handle })
    }

    fn label_for(interface: &str) -> String {
        format!("{interface}{LABEL_SUFFIX}")
    }

    async fn link_index(&self, interface: &str) -> anyhow::Result<u32> {
        let mut links = self.handle.link().get().match_name(interface.to_string()).execute();
        let link = links
            .try_next()
            .await?
            .ok_or_else(|| anyhow::anyhow!("no such interface: {interface}"))?;
        Ok(link.header.index)
    }
}

#[async_trait]
impl Kernel for RtnetlinkKernel {
    async fn add_address(&self, interface: &str, address: &str) -> anyhow::Result<()> {
        let index = self.link_index(interface).await?;
        let addr: Ipv4Addr = address.parse()?;
        let mut request = self.handle.address().add(index, addr.into(), 32);
        let message = request.message_mut();
        message.header.scope = AddressScope::Link;
        message
            .attributes
            .push(AddressAttribute::Label(Self::label_for(interface)));
        match request.execute().await {
            Ok(()) => Ok(()),
            Err(rtnetlink::Error::NetlinkError(e)) if e.raw_code() == -libc::EEXIST => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_address(&self, interface: &str, address: &str) -> anyhow::Result<()> {
        let index = self.link_index(interface).await?;
        let addr: Ipv4Addr = address.parse()?;
        let mut addresses = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .execute();
        while let Some(msg) = addresses.try_next().await? {
            if message_address(&msg) == Some(addr) {
                return match self.handle.address().del(msg).execute().await {
                    Ok(()) => Ok(()),
                    Err(rtnetlink::Error::NetlinkError(e)) if e.raw_code() == -libc::EADDRNOTAVAIL => Ok(()),
                    Err(e) => Err(e.into()),
                };
            }
        }
        Ok(())
    }

    async fn list_bound_addresses(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut links = self.handle.link().get().execute();
        let mut by_index = std::collections::HashMap::new();
        while let Some(link) = links.try_next().await? {
            let name = link
                .attributes
                .iter()
                .find_map(|a| match a {
                    netlink_packet_route::link::LinkAttribute::IfName(name) => Some(name.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            by_index.insert(link.header.index, name);
        }

        let mut out = Vec::new();
        let mut addresses = self.handle.address().get().execute();
        while let Some(msg) = addresses.try_next().await? {
            let has_label = msg.attributes.iter().any(|a| {
                matches!(a, AddressAttribute::Label(label) if label.ends_with(LABEL_SUFFIX))
            });
            if !has_label {
                continue;
            }
            if let (Some(interface), Some(addr)) =
                (by_index.get(&msg.header.index), message_address(&msg))
            {
                out.push((interface.clone(), addr.to_string()));
            }
        }
        Ok(out)
    }

    async fn wait_for_address_update(&self) -> anyhow::Result<()> {
        use netlink_sys::{protocols::NETLINK_ROUTE, AsyncSocket, SocketAddr, TokioSocket};

        // RTNLGRP_IPV4_IFADDR (5) and RTNLGRP_IPV6_IFADDR (9), as bitmasks.
        let groups = (1 << (5 - 1)) | (1 << (9 - 1));
        let mut socket = TokioSocket::new(NETLINK_ROUTE)?;
        socket.bind(&SocketAddr::new(0, groups))?;
        let mut buf = vec![0u8; 4096];
        socket.recv(&mut buf).await?;
        Ok(())
    }
}

fn message_address(msg: &AddressMessage) -> Option<Ipv4Addr> {
    msg.attributes.iter().find_map(|a| match a {
        AddressAttribute::Address(std::net::IpAddr::V4(addr)) => Some(*addr),
        _ => None,
    })
}
