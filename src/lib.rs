// Client core for TripTales: session handling, the REST gateway and the
// observable trip state that views render from.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod manager;
pub mod offline;
pub mod outcome;
pub mod posts;
pub mod scope;
pub mod state;

pub use error::{ClientError, ClientResult};
pub use manager::{Phase, Snapshot, TripManager};
pub use offline::OfflineState;
pub use outcome::Outcome;
pub use state::AppState;
