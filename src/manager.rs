use async_trait::async_trait;
use tokio::sync::watch;

use crate::api::{NewPost, Post, Trip, User};
use crate::outcome::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    LoggedOut,
    Authenticating,
    LoggedIn,
}

/// Everything the UI renders from. Collections are replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub current_user: Option<User>,
    pub trips: Vec<Trip>,
    pub selected_trip: Option<Trip>,
    pub posts: Vec<Post>,
    pub members: Vec<User>,
    /// Latest post submission, `None` until the first one or after a reset.
    pub post_result: Option<Outcome>,
}

impl Snapshot {
    pub fn is_logged_in(&self) -> bool {
        self.phase == Phase::LoggedIn
    }

    /// The trip a post belongs to: its own group, else the selected trip.
    pub fn group_of_post(&self, post_id: i64) -> Option<i64> {
        self.posts
            .iter()
            .find(|p| p.id == post_id)
            .and_then(|p| p.group_id)
            .or_else(|| self.selected_trip.as_ref().map(|t| t.id))
    }
}

/// The application state contract shared by the networked and offline
/// implementations. Every mutating call returns an [`Outcome`]; none panic.
#[async_trait]
pub trait TripManager: Send + Sync {
    /// Receiver that observes every published snapshot.
    fn subscribe(&self) -> watch::Receiver<Snapshot>;

    fn snapshot(&self) -> Snapshot;

    async fn login(&self, username: &str, password: &str) -> Outcome;

    async fn register(&self, username: &str, email: &str, password: &str) -> Outcome;

    /// Synchronous and infallible; safe to call repeatedly.
    fn logout(&self);

    async fn fetch_groups(&self) -> Outcome;

    async fn create_trip(&self, name: &str, description: &str) -> Outcome;

    /// Select a trip and load its posts and members.
    async fn select_trip(&self, trip: Trip) -> Outcome;

    async fn add_post(&self, post: NewPost) -> Outcome;

    fn reset_post_result(&self);

    async fn add_comment(&self, post_id: i64, content: &str) -> Outcome;

    async fn like_post(&self, post_id: i64) -> Outcome;

    async fn fetch_posts_for_group(&self, group_id: i64) -> Outcome;

    async fn fetch_group_members(&self, group_id: i64) -> Outcome;
}
