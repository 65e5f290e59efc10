use crate::wait::WaitError;

/// Errors produced by the harness fixtures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The Kubernetes API rejected or failed a request.
    #[error("Kube error: {source}")]
    Kube {
        /// Underlying client error.
        #[from]
        source: kube::Error,
    },
    /// The kubeconfig could not be read or resolved.
    #[error("Kubeconfig error: {source}")]
    Kubeconfig {
        /// Underlying kubeconfig error.
        #[from]
        source: kube::config::KubeconfigError,
    },
    /// A resource did not become ready in time.
    #[error(transparent)]
    Wait(#[from] WaitError),
    /// App configuration values could not be rendered to YAML.
    #[error("failed to render values for app {app}: {source}")]
    Values {
        /// Name of the app the values belong to.
        app: String,
        /// Underlying serialization error.
        source: serde_yaml::Error,
    },
}

impl Error {
    /// HTTP status code reported by the API server, if the error came from one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(response),
            } => Some(response.code),
            _ => None,
        }
    }

    /// Whether the error means the resource already exists.
    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }
}
