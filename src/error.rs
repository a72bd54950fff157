use std::time::Duration;

use kube::Error as KubeError;
use thiserror::Error;

/// Result type used by every operation of the access layer.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by discovery, the dynamic gateway, the schema converter
/// and the prompt driver.
///
/// Server messages are kept verbatim so verbs can print them as-is.
#[derive(Debug, Error)]
pub enum Error {
    /// No version of the `(group, resource)` pair is advertised by the cluster.
    #[error("the server doesn't have a resource type \"{resource}\" in group \"{group}\"")]
    NotServed { group: String, resource: String },

    #[error("{0}")]
    NotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("transport failure: {0}")]
    Transport(#[source] KubeError),

    /// The cluster served an object that does not fit the requested typed shape.
    #[error("unexpected object shape: {0}")]
    ShapeMismatch(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The user interrupted an interactive prompt.
    #[error("interrupt")]
    Interrupted,

    /// The terminal could not be read or written while prompting.
    #[error("prompt failed: {0}")]
    Prompt(#[source] std::io::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }

    pub(crate) fn shape(err: serde_json::Error) -> Self {
        Error::ShapeMismatch(err.to_string())
    }
}

impl From<KubeError> for Error {
    fn from(err: KubeError) -> Self {
        let KubeError::Api(status) = &err else {
            return Error::Transport(err);
        };
        let message = status.message.clone();
        match status.code {
            404 => Error::NotFound(message),
            409 if status.reason == "AlreadyExists" => Error::AlreadyExists(message),
            409 => Error::Conflict(message),
            400 | 422 => Error::Invalid(message),
            401 | 403 => Error::Forbidden(message),
            _ => Error::Transport(err),
        }
    }
}
