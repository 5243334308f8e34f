use std::fmt;
use std::sync::{Arc, Mutex};

use crate::auth::token_store::{TokenRepository, TOKEN_KEY};
use crate::error::{ClientError, ClientResult};

/// Opaque bearer credential issued at login/register.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep tokens out of logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(..{})", self.0.len())
    }
}

/// Holds the current token in memory, mirrored into a persisted slot.
pub struct SessionStore {
    repo: Arc<dyn TokenRepository>,
    namespace: String,
    current: Mutex<Option<SessionToken>>,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn TokenRepository>, namespace: impl Into<String>) -> Self {
        Self {
            repo,
            namespace: namespace.into(),
            current: Mutex::new(None),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Persist first, so memory never holds a token the slot doesn't.
    pub fn set_token(&self, token: &str) -> ClientResult<()> {
        if token.is_empty() {
            return Err(ClientError::validation("token must not be empty"));
        }
        self.repo.save(&self.namespace, TOKEN_KEY, token)?;
        *self.lock()? = Some(SessionToken::new(token));
        Ok(())
    }

    /// Current token, falling back to the persisted slot after a restart.
    pub fn token(&self) -> ClientResult<Option<SessionToken>> {
        let mut current = self.lock()?;
        if current.is_none() {
            *current = self
                .repo
                .load(&self.namespace, TOKEN_KEY)?
                .filter(|t| !t.is_empty())
                .map(SessionToken::new);
        }
        Ok(current.clone())
    }

    pub fn clear_token(&self) -> ClientResult<()> {
        *self.lock()? = None;
        self.repo.remove(&self.namespace, TOKEN_KEY)?;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.token(), Ok(Some(_)))
    }

    fn lock(&self) -> ClientResult<std::sync::MutexGuard<'_, Option<SessionToken>>> {
        self.current
            .lock()
            .map_err(|e| ClientError::Storage(e.to_string()))
    }
}
