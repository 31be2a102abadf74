/// Client-side error taxonomy.
///
/// Agent-level failures (`error`, `error_awaiting_input` events) are not
/// represented here: they are narrated into the transcript by the reconciler.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// Missing or malformed local input. Raised before any network call.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Upload, run-start, poll or connect request failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// Inbound frame did not parse as a known envelope.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Build a transport error from a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        if body.is_empty() {
            Self::Transport(format!("server returned {status}"))
        } else {
            Self::Transport(format!("server returned {status}: {body}"))
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
        }
    }

    /// Validation failures are the user's to fix; nothing was sent.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
