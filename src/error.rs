use thiserror::Error;

use crate::consts::{
    AUTH_FAILURE_MESSAGE, AUTH_FAILURE_SIGNATURE, CHAT_FAILURE_MESSAGE, MISSING_ARTIFACT_MESSAGE,
};

/// Failure reported by a remote capability.
///
/// `status` is the HTTP status when one was received, `code` the provider's
/// symbolic status (e.g. `NOT_FOUND`, `UNAUTHENTICATED`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Whether this failure means the credential is missing or was rejected.
    ///
    /// Structured signals win; the text signature is the fallback for
    /// providers that only report "Requested entity was not found".
    pub fn is_auth(&self) -> bool {
        if matches!(self.status, Some(401 | 403)) {
            return true;
        }

        if let Some(code) = self.code.as_deref() {
            if matches!(code, "UNAUTHENTICATED" | "PERMISSION_DENIED") {
                return true;
            }
        }

        self.message.contains(AUTH_FAILURE_SIGNATURE)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        let remote = RemoteError::new(err.to_string());
        match err.status() {
            Some(status) => remote.with_status(status.as_u16()),
            None => remote,
        }
    }
}

/// Errors surfaced by the studio workflows.
///
/// `Display` of every variant is safe to show to the user as a banner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("An API key must be selected before generating videos.")]
    CredentialRequired,

    #[error("{0}")]
    GenerationFailure(String),

    #[error("{}", AUTH_FAILURE_MESSAGE)]
    AuthFailure,

    #[error("{0}")]
    PollingFailure(String),

    #[error("{}", MISSING_ARTIFACT_MESSAGE)]
    ArtifactMissing,

    #[error("Failed to fetch video: {0}")]
    ArtifactFetchFailure(String),

    #[error("{}", CHAT_FAILURE_MESSAGE)]
    ChatFailure,

    #[error("Superseded by a newer request")]
    Superseded,
}
