pub mod session;
pub mod token_store;

pub use session::{SessionStore, SessionToken};
pub use token_store::{MemoryTokenRepository, SqliteTokenRepository, TokenRepository};
