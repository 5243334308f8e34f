use std::error::Error as StdError;
use std::io;

/// Every way a client operation can fail.
///
/// Auth problems (bad credentials, missing or expired token) all collapse into
/// [`ClientError::Unauthenticated`] so the UI has one signal to force a re-login.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("no valid session")]
    Unauthenticated,

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    /// The owning state was closed before the call finished.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }

    /// Map a non-2xx status and its body text to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ClientError::Unauthenticated,
            _ => {
                let message = if body.trim().is_empty() {
                    "unknown server error".to_string()
                } else {
                    body.to_string()
                };
                ClientError::Server { status, message }
            }
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ClientError::Unauthenticated)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    /// Failures that happened on the wire rather than in the server's answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::ConnectionReset(_)
                | ClientError::Timeout
                | ClientError::Decode(_)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ClientError::Timeout;
        }
        if e.is_decode() {
            return ClientError::Decode(e.to_string());
        }
        if is_connection_reset(&e) {
            return ClientError::ConnectionReset(e.to_string());
        }
        ClientError::Transport(e.to_string())
    }
}

impl From<rusqlite::Error> for ClientError {
    fn from(e: rusqlite::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for ClientError {
    fn from(e: r2d2::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Walk the source chain looking for an io error that means the peer dropped
/// the connection after we started talking to it.
pub fn is_connection_reset(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}
