//! Access to Harvester resources.
//!
//! [`ResourceApi`] is the seam the reconciler works against. The live
//! implementation talks to the Harvester cluster through `kube`; tests supply
//! an in-memory fake.

use std::path::Path;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::resources::{OrphanKind, OrphanResource};

/// Operations the reconciler needs against the Harvester API.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// List every resource of `kind` in `namespace`.
    async fn list(&self, kind: OrphanKind, namespace: &str) -> Result<Vec<OrphanResource>, ReconcileError>;

    /// Merge-patch `metadata.finalizers` to null.
    async fn strip_finalizers(&self, kind: OrphanKind, namespace: &str, name: &str) -> Result<(), ReconcileError>;

    /// Request deletion with background propagation. Does not wait for the
    /// object to disappear. A missing object is success.
    async fn delete(&self, kind: OrphanKind, namespace: &str, name: &str) -> Result<(), ReconcileError>;
}

#[async_trait]
impl<T: ResourceApi + ?Sized> ResourceApi for &T {
    async fn list(&self, kind: OrphanKind, namespace: &str) -> Result<Vec<OrphanResource>, ReconcileError> {
        (**self).list(kind, namespace).await
    }

    async fn strip_finalizers(&self, kind: OrphanKind, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        (**self).strip_finalizers(kind, namespace, name).await
    }

    async fn delete(&self, kind: OrphanKind, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        (**self).delete(kind, namespace, name).await
    }
}

/// [`ResourceApi`] backed by a `kube` client.
#[derive(Clone)]
pub struct KubeResourceApi {
    client: Client,
}

impl KubeResourceApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an explicit kubeconfig, or the default inference chain
    /// when `kubeconfig` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kubeconfig cannot be read or the client cannot
    /// be built.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, ReconcileError> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        Ok(Self::new(client))
    }

    fn api(&self, kind: OrphanKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }
}

#[async_trait]
impl ResourceApi for KubeResourceApi {
    async fn list(&self, kind: OrphanKind, namespace: &str) -> Result<Vec<OrphanResource>, ReconcileError> {
        let list = self.api(kind, namespace).list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|obj| obj.metadata.name)
            .map(|name| OrphanResource::new(kind, name, namespace))
            .collect())
    }

    async fn strip_finalizers(&self, kind: OrphanKind, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": null
            }
        });
        self.api(kind, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!(%kind, namespace, name, "Finalizers removed");
        Ok(())
    }

    async fn delete(&self, kind: OrphanKind, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        match self.api(kind, namespace).delete(name, &DeleteParams::background()).await {
            Ok(_) => {
                debug!(%kind, namespace, name, "Delete requested");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!(%kind, namespace, name, "Already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Wraps another [`ResourceApi`]: reads pass through, mutations are only
/// logged.
pub struct DryRunApi<A> {
    inner: A,
}

impl<A> DryRunApi<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<A: ResourceApi> ResourceApi for DryRunApi<A> {
    async fn list(&self, kind: OrphanKind, namespace: &str) -> Result<Vec<OrphanResource>, ReconcileError> {
        self.inner.list(kind, namespace).await
    }

    async fn strip_finalizers(&self, kind: OrphanKind, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        info!(%kind, namespace, name, "[dry-run] Would remove finalizers");
        Ok(())
    }

    async fn delete(&self, kind: OrphanKind, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        info!(%kind, namespace, name, "[dry-run] Would delete");
        Ok(())
    }
}
