//! In-memory stand-in for [`AppState`](crate::state::AppState).
//!
//! No server exists in this mode, so it is the one place where the client
//! invents ids (from the clock). Likes and comments mutate the local copy.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use crate::api::{Comment, GeoPoint, NewPost, Post, Trip, User};
use crate::error::ClientError;
use crate::manager::{Phase, Snapshot, TripManager};
use crate::outcome::Outcome;

#[derive(Default)]
struct Fixtures {
    trips: Vec<Trip>,
    posts: HashMap<i64, Vec<Post>>,
    members: HashMap<i64, Vec<User>>,
    last_id: i64,
}

impl Fixtures {
    fn seeded() -> Self {
        let guide = User {
            id: "guide".into(),
            username: "guide".into(),
            email: "guide@triptales.local".into(),
            avatar_url: None,
            badges: vec![],
            likes_count: 0,
        };
        let now = Utc::now().timestamp_millis();
        let rome = Trip {
            id: 1,
            name: "Rome".into(),
            description: "Three days of ruins and gelato".into(),
            creator_id: guide.id.clone(),
            members: Some(vec![guide.id.clone()]),
            posts: None,
        };
        let colosseum = Post {
            id: 1,
            user_id: guide.id.clone(),
            username: guide.username.clone(),
            title: Some("Colosseum".into()),
            content: "Tickets booked for 9am".into(),
            image: None,
            location: Some(GeoPoint {
                latitude: 41.8902,
                longitude: 12.4922,
            }),
            location_name: Some("Colosseo".into()),
            timestamp: now,
            likes: 2,
            comments: vec![],
            group_id: Some(rome.id),
        };

        let mut fixtures = Self::default();
        fixtures.posts.insert(rome.id, vec![colosseum]);
        fixtures.members.insert(rome.id, vec![guide]);
        fixtures.trips.push(rome);
        fixtures
    }

    /// Millisecond clock, bumped so two ids in the same millisecond differ.
    fn next_id(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_id = now.max(self.last_id + 1);
        self.last_id
    }

    fn find_post_mut(&mut self, post_id: i64) -> Option<(i64, &mut Post)> {
        self.posts.iter_mut().find_map(|(group_id, posts)| {
            posts
                .iter_mut()
                .find(|p| p.id == post_id)
                .map(|p| (*group_id, p))
        })
    }
}

pub struct OfflineState {
    state: watch::Sender<Snapshot>,
    fixtures: Mutex<Fixtures>,
}

impl Default for OfflineState {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineState {
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(Snapshot::default());
        Self {
            state,
            fixtures: Mutex::new(Fixtures::seeded()),
        }
    }

    fn fixtures(&self) -> std::sync::MutexGuard<'_, Fixtures> {
        self.fixtures.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_user(&self) -> Option<User> {
        self.state.borrow().current_user.clone()
    }

    fn enter(&self, username: &str, email: &str) -> Outcome {
        let user = User {
            id: username.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            avatar_url: None,
            badges: vec![],
            likes_count: 0,
        };
        let trips = self.fixtures().trips.clone();
        self.state.send_modify(|s| {
            s.phase = Phase::LoggedIn;
            s.current_user = Some(user);
            s.trips = trips;
        });
        Outcome::Success
    }

    /// Republish posts if `group_id` is the selected trip.
    fn republish_posts(&self, group_id: i64) {
        let posts = self
            .fixtures()
            .posts
            .get(&group_id)
            .cloned()
            .unwrap_or_default();
        self.state.send_if_modified(|s| {
            if s.selected_trip.as_ref().map(|t| t.id) != Some(group_id) {
                return false;
            }
            s.posts = posts;
            true
        });
    }
}

#[async_trait]
impl TripManager for OfflineState {
    fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    async fn login(&self, username: &str, password: &str) -> Outcome {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Outcome::Error(ClientError::validation("username and password are required"));
        }
        self.enter(username, &format!("{}@triptales.local", username))
    }

    async fn register(&self, username: &str, email: &str, password: &str) -> Outcome {
        let username = username.trim();
        if username.is_empty() || email.trim().is_empty() || password.is_empty() {
            return Outcome::Error(ClientError::validation(
                "username, email and password are required",
            ));
        }
        self.enter(username, email.trim())
    }

    fn logout(&self) {
        self.state.send_modify(|s| *s = Snapshot::default());
    }

    async fn fetch_groups(&self) -> Outcome {
        if self.current_user().is_none() {
            return Outcome::Error(ClientError::Unauthenticated);
        }
        let trips = self.fixtures().trips.clone();
        self.state.send_modify(|s| s.trips = trips);
        Outcome::Success
    }

    async fn create_trip(&self, name: &str, description: &str) -> Outcome {
        let name = name.trim();
        if name.is_empty() {
            return Outcome::Error(ClientError::validation("trip name is required"));
        }
        let Some(user) = self.current_user() else {
            return Outcome::Error(ClientError::Unauthenticated);
        };

        let trips = {
            let mut fixtures = self.fixtures();
            let id = fixtures.next_id();
            fixtures.trips.push(Trip {
                id,
                name: name.to_string(),
                description: description.trim().to_string(),
                creator_id: user.id.clone(),
                members: Some(vec![user.id.clone()]),
                posts: None,
            });
            fixtures.members.insert(id, vec![user]);
            fixtures.trips.clone()
        };
        self.state.send_modify(|s| s.trips = trips);
        Outcome::Success
    }

    async fn select_trip(&self, trip: Trip) -> Outcome {
        let (posts, members) = {
            let fixtures = self.fixtures();
            (
                fixtures.posts.get(&trip.id).cloned().unwrap_or_default(),
                fixtures.members.get(&trip.id).cloned().unwrap_or_default(),
            )
        };
        self.state.send_modify(|s| {
            s.selected_trip = Some(trip);
            s.posts = posts;
            s.members = members;
        });
        Outcome::Success
    }

    async fn add_post(&self, post: NewPost) -> Outcome {
        let outcome = if post.title.trim().is_empty() || post.content.trim().is_empty() {
            Outcome::Error(ClientError::validation("title and content are required"))
        } else if let Some(user) = self.current_user() {
            {
                let mut fixtures = self.fixtures();
                let id = fixtures.next_id();
                let location = match (post.latitude, post.longitude) {
                    (Some(latitude), Some(longitude)) => Some(GeoPoint {
                        latitude,
                        longitude,
                    }),
                    _ => None,
                };
                fixtures.posts.entry(post.group_id).or_default().insert(
                    0,
                    Post {
                        id,
                        user_id: user.id,
                        username: user.username,
                        title: Some(post.title.clone()),
                        content: post.content.clone(),
                        image: None,
                        location,
                        location_name: None,
                        timestamp: Utc::now().timestamp_millis(),
                        likes: 0,
                        comments: vec![],
                        group_id: Some(post.group_id),
                    },
                );
            }
            self.republish_posts(post.group_id);
            Outcome::Success
        } else {
            Outcome::Error(ClientError::Unauthenticated)
        };

        let published = outcome.clone();
        self.state.send_modify(|s| s.post_result = Some(published));
        outcome
    }

    fn reset_post_result(&self) {
        self.state.send_modify(|s| s.post_result = None);
    }

    async fn add_comment(&self, post_id: i64, content: &str) -> Outcome {
        let Some(user) = self.current_user() else {
            return Outcome::Error(ClientError::Unauthenticated);
        };
        let content = content.trim();
        if content.is_empty() {
            return Outcome::Error(ClientError::validation("comment is empty"));
        }

        let group_id = {
            let mut fixtures = self.fixtures();
            let id = fixtures.next_id();
            let Some((group_id, post)) = fixtures.find_post_mut(post_id) else {
                return Outcome::Error(ClientError::Server {
                    status: 404,
                    message: format!("post {} not found", post_id),
                });
            };
            post.comments.push(Comment {
                id,
                post_id: Some(post_id),
                user_id: user.id,
                username: user.username,
                content: content.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            });
            group_id
        };
        self.republish_posts(group_id);
        Outcome::Success
    }

    async fn like_post(&self, post_id: i64) -> Outcome {
        if self.current_user().is_none() {
            return Outcome::Error(ClientError::Unauthenticated);
        }
        let group_id = {
            let mut fixtures = self.fixtures();
            let Some((group_id, post)) = fixtures.find_post_mut(post_id) else {
                return Outcome::Error(ClientError::Server {
                    status: 404,
                    message: format!("post {} not found", post_id),
                });
            };
            post.likes += 1;
            group_id
        };
        self.republish_posts(group_id);
        Outcome::Success
    }

    async fn fetch_posts_for_group(&self, group_id: i64) -> Outcome {
        if self.current_user().is_none() {
            return Outcome::Error(ClientError::Unauthenticated);
        }
        let posts = self
            .fixtures()
            .posts
            .get(&group_id)
            .cloned()
            .unwrap_or_default();
        self.state.send_modify(|s| s.posts = posts);
        Outcome::Success
    }

    async fn fetch_group_members(&self, group_id: i64) -> Outcome {
        if self.current_user().is_none() {
            return Outcome::Error(ClientError::Unauthenticated);
        }
        let members = self
            .fixtures()
            .members
            .get(&group_id)
            .cloned()
            .unwrap_or_default();
        self.state.send_modify(|s| s.members = members);
        Outcome::Success
    }
}
