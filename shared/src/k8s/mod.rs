use kube::Client;

pub mod api;

/// Thin wrapper around a `kube::Client` so call sites depend on
/// [`api::IntoApi`] rather than directly on `kube::Client`, keeping the
/// door open for a non-cluster client in tests.
#[derive(Clone)]
pub struct KubeImpl {
    client: Client,
}

impl KubeImpl {
    /// Create a new client from the in-cluster or local kubeconfig.
    pub async fn try_default() -> Result<Self, anyhow::Error> {
        Ok(KubeImpl {
            client: Client::try_default().await?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        KubeImpl { client }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }
}
