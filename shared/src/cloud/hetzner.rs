//! Hetzner Cloud Floating IP adapter.
//!
//! Mirrors the upstream Hetzner Cloud REST API
//! (<https://docs.hetzner.cloud/#floating-ips>): list/assign/unassign/create/delete
//! on `/floating_ips`, server lookup by name on `/servers`.

use crate::cloud::CloudAdapter;
use crate::error::SharedError;
use async_trait::async_trait;
use log::{error, info, warn};
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://api.hetzner.cloud/v1";

pub struct HetznerAdapter {
    token: String,
    client: reqwest::Client,
}

impl HetznerAdapter {
    pub fn new(token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");
        Self { token, client }
    }

    async fn find_floating_ip_id(&self, address: &str) -> Result<u64, SharedError> {
        let resp: FloatingIpListResponse = self
            .client
            .get(format!("{BASE_URL}/floating_ips"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resp.floating_ips
            .into_iter()
            .find(|ip| ip.ip == address)
            .map(|ip| ip.id)
            .ok_or_else(|| SharedError::CloudRejected {
                status: 404,
                message: format!("floating IP {address} not found"),
            })
    }

    async fn find_server_id(&self, server_name: &str) -> Result<u64, SharedError> {
        let resp: ServerListResponse = self
            .client
            .get(format!("{BASE_URL}/servers"))
            .bearer_auth(&self.token)
            .query(&[("name", server_name)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resp.servers
            .into_iter()
            .find(|s| s.name == server_name)
            .map(|s| s.id)
            .ok_or_else(|| SharedError::CloudRejected {
                status: 404,
                message: format!("hetzner cloud node {server_name} not found"),
            })
    }

    fn log_rate_limit(resp: &reqwest::Response) {
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let (limit, remaining) = match (header("ratelimit-limit"), header("ratelimit-remaining")) {
            (Some(l), Some(r)) => (l, r),
            _ => return,
        };
        let (Ok(limit_n), Ok(remaining_n)) = (limit.parse::<i64>(), remaining.parse::<i64>())
        else {
            return;
        };
        if limit_n == 0 {
            return;
        }
        let pct = remaining_n * 100 / limit_n;
        let msg = format!("hetzner API remaining calls is {remaining}/{limit}");
        if pct < 20 {
            error!("{msg}");
        } else if pct < 50 {
            warn!("{msg}");
        } else {
            info!("{msg}");
        }
    }
}

#[async_trait]
impl CloudAdapter for HetznerAdapter {
    async fn assign_to_server(&self, address: &str, server_name: &str) -> Result<(), SharedError> {
        info!("assigning address {address} to hetzner cloud server {server_name}");
        let ip_id = self.find_floating_ip_id(address).await?;
        let server_id = self.find_server_id(server_name).await?;
        let resp = self
            .client
            .post(format!("{BASE_URL}/floating_ips/{ip_id}/actions/assign"))
            .bearer_auth(&self.token)
            .json(&AssignRequest { server: server_id })
            .send()
            .await?;
        Self::log_rate_limit(&resp);
        resp.error_for_status()?;
        Ok(())
    }

    async fn unassign(&self, address: &str) -> Result<(), SharedError> {
        info!("unassigning address {address} from hetzner cloud");
        let ip_id = self.find_floating_ip_id(address).await?;
        let resp = self
            .client
            .post(format!("{BASE_URL}/floating_ips/{ip_id}/actions/unassign"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::log_rate_limit(&resp);
        resp.error_for_status()?;
        Ok(())
    }

    async fn get_and_assign_new(
        &self,
        server_name: &str,
        ip_name: &str,
    ) -> Result<String, SharedError> {
        info!("getting new address from hetzner cloud, name: {ip_name}");
        let server_id = self.find_server_id(server_name).await?;
        let req = CreateRequest {
            r#type: "ipv4",
            server: server_id,
            name: ip_name.to_string(),
            labels: [("managed-by".to_string(), "plenuslb".to_string())].into(),
        };
        let resp = self
            .client
            .post(format!("{BASE_URL}/floating_ips"))
            .bearer_auth(&self.token)
            .json(&req)
            .send()
            .await?;
        Self::log_rate_limit(&resp);
        let created: CreateResponse = resp.error_for_status()?.json().await?;
        info!("got new address {} (floating ip {})", created.floating_ip.ip, created.floating_ip.id);
        Ok(created.floating_ip.ip)
    }

    async fn delete(&self, address: &str) -> Result<(), SharedError> {
        info!("deleting address {address} from hetzner cloud");
        let ip_id = self.find_floating_ip_id(address).await?;
        let resp = self
            .client
            .delete(format!("{BASE_URL}/floating_ips/{ip_id}"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::log_rate_limit(&resp);
        resp.error_for_status()?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct FloatingIpListResponse {
    floating_ips: Vec<FloatingIp>,
}

#[derive(Deserialize)]
struct FloatingIp {
    id: u64,
    ip: String,
}

#[derive(Deserialize)]
struct ServerListResponse {
    servers: Vec<Server>,
}

#[derive(Deserialize)]
struct Server {
    id: u64,
    name: String,
}

#[derive(serde::Serialize)]
struct AssignRequest {
    server: u64,
}

#[derive(serde::Serialize)]
struct CreateRequest {
    r#type: &'static str,
    server: u64,
    name: String,
    labels: std::collections::HashMap<String, String>,
}

#[derive(Deserialize)]
struct CreateResponse {
    floating_ip: CreatedFloatingIp,
}

#[derive(Deserialize)]
struct CreatedFloatingIp {
    id: u64,
    ip: String,
}
