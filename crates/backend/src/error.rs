use thiserror::Error;

/// Failure taxonomy for calls through the backend proxy.
///
/// Quota exhaustion is split from other API failures because the UI
/// treats it differently: nothing is appended to the transcript and the
/// settings panel opens so the user can supply their own key.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP 429 from the proxy: the daily free quota is used up.
    #[error("{detail}")]
    QuotaExceeded { detail: String },

    /// Any other non-success status.
    #[error("{detail}")]
    Api { status: u16, detail: String },

    /// The request never produced an HTTP response.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
