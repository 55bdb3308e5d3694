//! Crate-level error type.
//!
//! Every fallible operation in the library returns [`ClientError`]. The
//! variants follow the failure taxonomy the controllers care about: an
//! authentication redirect, a transport failure, a logical rejection reported
//! by the server, and a stale document target.

use thiserror::Error;

/// Errors produced by the API client, the controllers and the sync loop.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The action needs a logged-in user. `redirect` is the login URL carrying
    /// the current location as its return target.
    #[error("authentication required, redirecting to {redirect}")]
    AuthRequired { redirect: String },

    /// A TCP-level connection could not be established or was dropped.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The remote server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A response body could not be decoded into the expected JSON shape.
    #[error("could not decode {context}: {detail}")]
    Decode { context: String, detail: String },

    /// The server answered `success: false`.
    #[error("server rejected the request: {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { message: Option<String> },

    /// The document no longer contains the element an operation targets.
    #[error("{what} not found in document")]
    NotFound { what: String },

    /// The question is closed and no longer accepts AI responses.
    #[error("question is closed")]
    QuestionClosed,

    /// The user declined a confirmation step, or the triggering control was
    /// disabled while an earlier request is in flight.
    #[error("cancelled by user")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// True for failures that are never shown to the user: the auth redirect
    /// and stale-document aborts.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            ClientError::AuthRequired { .. } | ClientError::NotFound { .. } | ClientError::Cancelled
        )
    }

    /// Text for the notification surface. Server messages are shown verbatim;
    /// everything else falls back to `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Rejected { message: Some(m) } if !m.trim().is_empty() => m.clone(),
            ClientError::QuestionClosed => {
                "This question is closed and no longer accepts AI responses".to_string()
            }
            _ => fallback.to_string(),
        }
    }

    pub(crate) fn connect(url: &str, err: impl std::fmt::Display) -> Self {
        ClientError::Connect { url: url.to_string(), detail: err.to_string() }
    }

    pub(crate) fn decode(context: &str, err: impl std::fmt::Display) -> Self {
        ClientError::Decode { context: context.to_string(), detail: err.to_string() }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        ClientError::NotFound { what: what.into() }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
