use thiserror::Error;

/// Errors raised while talking to the Harvester API.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Kubernetes API call failed.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The Harvester kubeconfig could not be loaded.
    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
}

impl ReconcileError {
    /// Whether the object is already gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(resp)) if resp.code == 404)
    }
}
