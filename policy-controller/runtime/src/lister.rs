use crate::k8s::{Configuration, Namespace, Policy};
use anyhow::Result;
use kube::api::{Api, ListParams};

/// Fetches the cluster objects governance decisions are made over.
#[async_trait::async_trait]
pub trait Lister: Send + Sync {
    /// Lists configurations in `namespace`, or in all namespaces.
    async fn configurations(&self, namespace: Option<&str>) -> Result<Vec<Configuration>>;

    async fn policies(&self) -> Result<Vec<Policy>>;

    async fn namespace(&self, name: &str) -> Result<Option<Namespace>>;
}

#[async_trait::async_trait]
impl Lister for kube::Client {
    async fn configurations(&self, namespace: Option<&str>) -> Result<Vec<Configuration>> {
        let api = match namespace {
            Some(ns) => Api::<Configuration>::namespaced(self.clone(), ns),
            None => Api::<Configuration>::all(self.clone()),
        };
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn policies(&self) -> Result<Vec<Policy>> {
        let list = Api::<Policy>::all(self.clone())
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let ns = Api::<Namespace>::all(self.clone()).get_opt(name).await?;
        Ok(ns)
    }
}
