use crate::error::ClientError;

/// Result of a mutating operation, as seen by the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Loading,
    Success,
    /// The connection dropped after the request went out. The server may have
    /// accepted it; re-fetch before trusting this.
    Unconfirmed,
    Error(ClientError),
    /// Superseded by a newer request or aborted by logout/selection change.
    Cancelled,
}

impl Outcome {
    /// True for both confirmed and unconfirmed success.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::Unconfirmed)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn error(&self) -> Option<&ClientError> {
        match self {
            Outcome::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Combine two outcomes of parallel work. Errors win over cancellation,
    /// cancellation wins over success.
    pub fn and(self, other: Outcome) -> Outcome {
        match (self, other) {
            (Outcome::Error(e), _) | (_, Outcome::Error(e)) => Outcome::Error(e),
            (Outcome::Cancelled, _) | (_, Outcome::Cancelled) => Outcome::Cancelled,
            (Outcome::Loading, _) | (_, Outcome::Loading) => Outcome::Loading,
            (Outcome::Unconfirmed, _) | (_, Outcome::Unconfirmed) => Outcome::Unconfirmed,
            (Outcome::Success, Outcome::Success) => Outcome::Success,
        }
    }
}

impl From<ClientError> for Outcome {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Cancelled => Outcome::Cancelled,
            e => Outcome::Error(e),
        }
    }
}

impl<T> From<Result<T, ClientError>> for Outcome {
    fn from(r: Result<T, ClientError>) -> Self {
        match r {
            Ok(_) => Outcome::Success,
            Err(e) => e.into(),
        }
    }
}
