use core::error::Error;

use error_stack::Report;
use kube::error::ErrorResponse;

/// Errors that can occur while talking to the Kubernetes API.
#[derive(Debug, derive_more::Display)]
pub enum ClusterError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to list pods")]
    ListFailed,
    #[display("Failed to watch pods")]
    WatchFailed,
    #[display("Watch resource version expired: {message}")]
    CursorExpired { message: String },
    #[display("Kubernetes API returned {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },
    #[display("Failed to create event {name} in namespace {namespace}")]
    EventRejected { namespace: String, name: String },
    #[display("Malformed object: {message}")]
    MalformedObject { message: String },
    #[display("Cannot build a reference to pod {namespace}/{name}: {message}")]
    Reference {
        namespace: String,
        name: String,
        message: String,
    },
}

impl Error for ClusterError {}

impl ClusterError {
    /// Classifies an API status by its structured reason and code.
    ///
    /// The message text is never inspected.
    pub fn from_status(status: &ErrorResponse) -> Self {
        if status.reason == "Expired" || status.code == 410 {
            Self::CursorExpired {
                message: status.message.clone(),
            }
        } else {
            Self::Api {
                code: status.code,
                reason: status.reason.clone(),
                message: status.message.clone(),
            }
        }
    }

    pub fn is_cursor_expired(&self) -> bool {
        matches!(self, Self::CursorExpired { .. })
    }
}

/// Maps a client error to a report, keeping API statuses structured.
pub(crate) fn classify_kube_error(err: kube::Error, fallback: ClusterError) -> Report<ClusterError> {
    match err {
        kube::Error::Api(status) => Report::new(ClusterError::from_status(&status)),
        other => Report::new(other).change_context(fallback),
    }
}
