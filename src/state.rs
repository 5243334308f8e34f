//! Networked application state.
//!
//! [`AppState`] sequences API calls and mirrors the answers into a
//! [`Snapshot`] published on a `watch` channel. It is the only writer; views
//! subscribe and read.
//!
//! Every fetch target (trips, posts, members) carries a generation counter.
//! A fetch claims the next generation before it awaits anything and only
//! applies its response if nothing newer was issued in the meantime, so the
//! last request issued wins rather than the last response to arrive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use crate::api::{
    ApiClient, ApiGateway, Badge, Comment, CreateTripRequest, Like, LoginRequest, NewPost,
    RegisterRequest, Trip, User,
};
use crate::auth::{SessionStore, SessionToken, SqliteTokenRepository};
use crate::config::Config;
use crate::db;
use crate::error::{ClientError, ClientResult};
use crate::manager::{Phase, Snapshot, TripManager};
use crate::outcome::Outcome;
use crate::posts::PostRepository;
use crate::scope::Scope;

#[derive(Default)]
struct Generations {
    session: AtomicU64,
    trips: AtomicU64,
    posts: AtomicU64,
    members: AtomicU64,
}

impl Generations {
    fn next(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(counter: &AtomicU64, generation: u64) -> bool {
        counter.load(Ordering::SeqCst) == generation
    }

    fn invalidate_all(&self) {
        for counter in [&self.session, &self.trips, &self.posts, &self.members] {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

enum Credentials {
    Login(LoginRequest),
    Register(RegisterRequest),
}

struct Inner {
    gateway: ApiGateway,
    session: Arc<SessionStore>,
    posts: PostRepository,
    state: watch::Sender<Snapshot>,
    generations: Generations,
    root: Scope,
    selection: Mutex<Scope>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl AppState {
    pub fn new(gateway: ApiGateway, session: Arc<SessionStore>) -> Self {
        let (state, _rx) = watch::channel(Snapshot::default());
        let root = Scope::new();
        let selection = Mutex::new(root.child());
        let posts = PostRepository::new(gateway.clone(), session.clone());

        Self {
            inner: Arc::new(Inner {
                gateway,
                session,
                posts,
                state,
                generations: Generations::default(),
                root,
                selection,
            }),
        }
    }

    /// Open the token database under the configured data dir and build the
    /// gateway from `config.api`.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.db_path())?;
        db::run_migrations(&pool)?;

        let repo = Arc::new(SqliteTokenRepository::new(pool));
        let session = Arc::new(SessionStore::new(repo, config.session.namespace.clone()));
        let gateway = ApiGateway::new(&config.api)?;

        tracing::info!("TripTales client ready against {}", gateway.base_url());
        Ok(Self::new(gateway, session))
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Resume a persisted session: load the profile for the stored token.
    pub async fn restore_session(&self) -> Outcome {
        let token = match self.require_token("restore_session") {
            Ok(token) => token,
            Err(e) => return Outcome::Error(e),
        };
        let session_gen = Generations::next(&self.inner.generations.session);
        self.publish(|s| s.phase = Phase::Authenticating);

        let client = self.client(&token);
        match self.inner.root.run(client.me()).await {
            Some(Ok(user)) => self.finish_login(session_gen, token.as_str(), user).await,
            Some(Err(ClientError::Unauthenticated)) => {
                tracing::warn!("Stored session rejected by server");
                self.fail_login(session_gen, "restore_session", ClientError::Unauthenticated)
            }
            Some(Err(e)) => {
                // keep the token: the server may just be unreachable
                tracing::warn!("Could not restore session: {}", e);
                self.apply_if_current(&self.inner.generations.session, session_gen, |s| {
                    s.phase = Phase::LoggedOut
                });
                Outcome::Error(e)
            }
            None => {
                self.apply_if_current(&self.inner.generations.session, session_gen, |s| {
                    s.phase = Phase::LoggedOut
                });
                Outcome::Cancelled
            }
        }
    }

    /// Badge catalog. Not mirrored into the snapshot.
    pub async fn fetch_badges(&self) -> ClientResult<Vec<Badge>> {
        let token = self.require_token("fetch_badges")?;
        self.inner
            .root
            .run(self.client(&token).badges())
            .await
            .unwrap_or(Err(ClientError::Cancelled))
    }

    /// Abort everything in flight. Later operations return `Cancelled`.
    pub fn close(&self) {
        self.inner.root.cancel();
    }

    // --- internals ---

    fn publish(&self, f: impl FnOnce(&mut Snapshot)) {
        self.inner.state.send_modify(f);
    }

    /// Apply `f` only if `generation` is still the newest for `counter`.
    fn apply_if_current(
        &self,
        counter: &AtomicU64,
        generation: u64,
        f: impl FnOnce(&mut Snapshot),
    ) -> bool {
        self.inner.state.send_if_modified(|s| {
            if !Generations::is_current(counter, generation) {
                return false;
            }
            f(s);
            true
        })
    }

    fn require_token(&self, op: &str) -> ClientResult<SessionToken> {
        match self.inner.session.token() {
            Ok(Some(token)) => Ok(token),
            Ok(None) => {
                tracing::warn!("{}: no session token", op);
                Err(ClientError::Unauthenticated)
            }
            Err(e) => {
                tracing::error!("{}: could not read session token: {}", op, e);
                Err(e)
            }
        }
    }

    fn client(&self, token: &SessionToken) -> ApiClient {
        self.inner.gateway.create_client(Some(token.as_str()))
    }

    fn selection_scope(&self) -> Scope {
        self.inner
            .selection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Cancel the current selection scope and install a fresh one.
    fn reset_selection_scope(&self) -> Scope {
        let mut selection = self
            .inner
            .selection
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        selection.cancel();
        *selection = self.inner.root.child();
        selection.clone()
    }

    fn log_failure(op: &str, e: &ClientError) {
        match e {
            ClientError::Validation(_) => tracing::debug!("{}: {}", op, e),
            ClientError::Server { .. } => tracing::error!("{}: {}", op, e),
            _ => tracing::warn!("{}: {}", op, e),
        }
    }

    fn is_current_session(&self, session_gen: u64) -> bool {
        Generations::is_current(&self.inner.generations.session, session_gen)
    }

    /// Forget the token and everything loaded under it.
    fn end_session(&self) {
        if let Err(e) = self.inner.session.clear_token() {
            tracing::warn!("Failed to clear stored token: {}", e);
        }
        self.reset_selection_scope();
        self.inner.generations.invalidate_all();
        self.publish(|s| *s = Snapshot::default());
    }

    /// A login attempt failed. Only the newest attempt may tear the session
    /// down; a superseded one reports its error and leaves state alone.
    fn fail_login(&self, session_gen: u64, op: &str, e: ClientError) -> Outcome {
        Self::log_failure(op, &e);
        if self.is_current_session(session_gen) {
            self.end_session();
        } else {
            tracing::debug!("{}: attempt superseded, keeping the newer session", op);
        }
        Outcome::Error(e)
    }

    fn abandon_login(&self, session_gen: u64) -> Outcome {
        if self.is_current_session(session_gen) {
            self.end_session();
        }
        Outcome::Cancelled
    }

    async fn authenticate(&self, credentials: Credentials) -> Outcome {
        let session_gen = Generations::next(&self.inner.generations.session);
        self.publish(|s| s.phase = Phase::Authenticating);

        let anonymous = self.inner.gateway.create_client(None);
        let issue = async {
            match &credentials {
                Credentials::Login(request) => anonymous.login(request).await,
                Credentials::Register(request) => anonymous.register(request).await,
            }
        };
        let tokens = match self.inner.root.run(issue).await {
            Some(Ok(tokens)) => tokens,
            Some(Err(e)) => return self.fail_login(session_gen, "authenticate", e),
            None => return self.abandon_login(session_gen),
        };

        if !self.is_current_session(session_gen) {
            tracing::debug!("Discarding token issued to a superseded login");
            return Outcome::Cancelled;
        }
        if let Err(e) = self.inner.session.set_token(&tokens.access) {
            return self.fail_login(session_gen, "authenticate", e);
        }

        let client = self.inner.gateway.create_client(Some(&tokens.access));
        match self.inner.root.run(client.me()).await {
            Some(Ok(user)) => self.finish_login(session_gen, &tokens.access, user).await,
            Some(Err(e)) => self.fail_login(session_gen, "authenticate", e),
            None => self.abandon_login(session_gen),
        }
    }

    async fn finish_login(&self, session_gen: u64, access: &str, user: User) -> Outcome {
        let username = user.username.clone();
        let entered = self.apply_if_current(&self.inner.generations.session, session_gen, |s| {
            s.phase = Phase::LoggedIn;
            s.current_user = Some(user);
        });
        if !entered {
            // superseded while the profile was loading; the slot may already
            // hold a newer token
            let ours = matches!(self.inner.session.token(), Ok(Some(ref t)) if t.as_str() == access);
            if ours {
                if let Err(e) = self.inner.session.clear_token() {
                    tracing::warn!("Failed to clear stored token: {}", e);
                }
            }
            return Outcome::Cancelled;
        }

        tracing::info!("Logged in as {}", username);
        let groups = self.fetch_groups().await;
        if !groups.is_success() {
            tracing::warn!("Initial groups fetch did not succeed: {:?}", groups);
        }
        Outcome::Success
    }

    async fn fetch_posts_in(&self, scope: &Scope, group_id: i64) -> Outcome {
        let token = match self.require_token("fetch_posts_for_group") {
            Ok(token) => token,
            Err(e) => return Outcome::Error(e),
        };
        let counter = &self.inner.generations.posts;
        let generation = Generations::next(counter);

        let client = self.client(&token);
        match scope.run(client.posts_for_group(group_id)).await {
            None => Outcome::Cancelled,
            Some(Ok(posts)) => {
                let count = posts.len();
                if self.apply_if_current(counter, generation, |s| s.posts = posts) {
                    tracing::debug!("Loaded {} posts for group {}", count, group_id);
                    Outcome::Success
                } else {
                    tracing::debug!("Dropping stale posts response for group {}", group_id);
                    Outcome::Cancelled
                }
            }
            Some(Err(e)) => {
                Self::log_failure("fetch_posts_for_group", &e);
                Outcome::Error(e)
            }
        }
    }

    async fn fetch_members_in(&self, scope: &Scope, group_id: i64) -> Outcome {
        let token = match self.require_token("fetch_group_members") {
            Ok(token) => token,
            Err(e) => return Outcome::Error(e),
        };
        let counter = &self.inner.generations.members;
        let generation = Generations::next(counter);

        let client = self.client(&token);
        match scope.run(client.group_members(group_id)).await {
            None => Outcome::Cancelled,
            Some(Ok(members)) => {
                let count = members.len();
                if self.apply_if_current(counter, generation, |s| s.members = members) {
                    tracing::debug!("Loaded {} members for group {}", count, group_id);
                    Outcome::Success
                } else {
                    tracing::debug!("Dropping stale members response for group {}", group_id);
                    Outcome::Cancelled
                }
            }
            Some(Err(e)) => {
                Self::log_failure("fetch_group_members", &e);
                Outcome::Error(e)
            }
        }
    }

    async fn refresh_posts_of(&self, group_id: Option<i64>) {
        let Some(group_id) = group_id else {
            tracing::debug!("No group to refresh");
            return;
        };
        let outcome = self.fetch_posts_for_group(group_id).await;
        if !outcome.is_success() {
            tracing::warn!("Refreshing posts for group {} gave {:?}", group_id, outcome);
        }
    }

    fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().current_user.clone()
    }
}

#[async_trait]
impl TripManager for AppState {
    fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.state.subscribe()
    }

    fn snapshot(&self) -> Snapshot {
        self.inner.state.borrow().clone()
    }

    async fn login(&self, username: &str, password: &str) -> Outcome {
        if username.trim().is_empty() || password.is_empty() {
            return Outcome::Error(ClientError::validation("username and password are required"));
        }
        self.authenticate(Credentials::Login(LoginRequest {
            username: username.trim().to_string(),
            password: password.to_string(),
        }))
        .await
    }

    async fn register(&self, username: &str, email: &str, password: &str) -> Outcome {
        if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Outcome::Error(ClientError::validation(
                "username, email and password are required",
            ));
        }
        self.authenticate(Credentials::Register(RegisterRequest {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        }))
        .await
    }

    fn logout(&self) {
        self.end_session();
        tracing::info!("Logged out");
    }

    async fn fetch_groups(&self) -> Outcome {
        let token = match self.require_token("fetch_groups") {
            Ok(token) => token,
            Err(e) => return Outcome::Error(e),
        };
        let counter = &self.inner.generations.trips;
        let generation = Generations::next(counter);

        let client = self.client(&token);
        match self.inner.root.run(client.my_groups()).await {
            None => Outcome::Cancelled,
            Some(Ok(trips)) => {
                let count = trips.len();
                if self.apply_if_current(counter, generation, |s| s.trips = trips) {
                    tracing::debug!("Loaded {} trips", count);
                    Outcome::Success
                } else {
                    tracing::debug!("Dropping stale trips response");
                    Outcome::Cancelled
                }
            }
            Some(Err(e)) => {
                Self::log_failure("fetch_groups", &e);
                Outcome::Error(e)
            }
        }
    }

    async fn create_trip(&self, name: &str, description: &str) -> Outcome {
        let name = name.trim();
        if name.is_empty() {
            return Outcome::Error(ClientError::validation("trip name is required"));
        }
        let token = match self.require_token("create_trip") {
            Ok(token) => token,
            Err(e) => return Outcome::Error(e),
        };

        let request = CreateTripRequest {
            name: name.to_string(),
            description: description.trim().to_string(),
        };
        let client = self.client(&token);
        match self.inner.root.run(client.create_group(&request)).await {
            None => Outcome::Cancelled,
            Some(Ok(trip)) => {
                tracing::info!("Created trip {} ({})", trip.name, trip.id);
                let refresh = self.fetch_groups().await;
                if !refresh.is_success() {
                    tracing::warn!("Refreshing trips after create gave {:?}", refresh);
                }
                Outcome::Success
            }
            Some(Err(e)) => {
                Self::log_failure("create_trip", &e);
                Outcome::Error(e)
            }
        }
    }

    async fn select_trip(&self, trip: Trip) -> Outcome {
        let scope = self.reset_selection_scope();
        let trip_id = trip.id;

        let generations = &self.inner.generations;
        generations.posts.fetch_add(1, Ordering::SeqCst);
        generations.members.fetch_add(1, Ordering::SeqCst);
        self.publish(|s| {
            if s.selected_trip.as_ref().map(|t| t.id) != Some(trip_id) {
                s.posts.clear();
                s.members.clear();
            }
            s.selected_trip = Some(trip);
        });

        let (posts, members) = tokio::join!(
            self.fetch_posts_in(&scope, trip_id),
            self.fetch_members_in(&scope, trip_id)
        );
        posts.and(members)
    }

    async fn add_post(&self, post: NewPost) -> Outcome {
        let session_gen = self.inner.generations.session.load(Ordering::SeqCst);
        self.publish(|s| s.post_result = Some(Outcome::Loading));

        let outcome = self
            .inner
            .root
            .run(self.inner.posts.submit_post(&post))
            .await
            .unwrap_or(Outcome::Cancelled);

        if !self.is_current_session(session_gen) {
            tracing::debug!("Session changed during post submission; result not published");
            return outcome;
        }
        if outcome.is_success() {
            self.refresh_posts_of(Some(post.group_id)).await;
        }

        let published = outcome.clone();
        self.apply_if_current(&self.inner.generations.session, session_gen, |s| {
            s.post_result = Some(published)
        });
        outcome
    }

    fn reset_post_result(&self) {
        self.publish(|s| s.post_result = None);
    }

    async fn add_comment(&self, post_id: i64, content: &str) -> Outcome {
        let Some(user) = self.current_user() else {
            tracing::warn!("add_comment: no current user");
            return Outcome::Error(ClientError::Unauthenticated);
        };
        let content = content.trim();
        if content.is_empty() {
            return Outcome::Error(ClientError::validation("comment is empty"));
        }
        let token = match self.require_token("add_comment") {
            Ok(token) => token,
            Err(e) => return Outcome::Error(e),
        };

        let comment = Comment {
            id: 0,
            post_id: Some(post_id),
            user_id: user.id,
            username: user.username,
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let client = self.client(&token);
        match self.inner.root.run(client.add_comment(&comment)).await {
            None => Outcome::Cancelled,
            Some(Ok(_)) => {
                let group_id = self.snapshot().group_of_post(post_id);
                self.refresh_posts_of(group_id).await;
                Outcome::Success
            }
            Some(Err(e)) => {
                Self::log_failure("add_comment", &e);
                Outcome::Error(e)
            }
        }
    }

    async fn like_post(&self, post_id: i64) -> Outcome {
        let Some(user) = self.current_user() else {
            tracing::warn!("like_post: no current user");
            return Outcome::Error(ClientError::Unauthenticated);
        };
        let token = match self.require_token("like_post") {
            Ok(token) => token,
            Err(e) => return Outcome::Error(e),
        };

        let like = Like {
            id: 0,
            user: user.id,
            post: post_id,
        };
        let client = self.client(&token);
        match self.inner.root.run(client.like_post(&like)).await {
            None => Outcome::Cancelled,
            Some(Ok(_)) => {
                let group_id = self.snapshot().group_of_post(post_id);
                self.refresh_posts_of(group_id).await;
                Outcome::Success
            }
            Some(Err(e)) => {
                Self::log_failure("like_post", &e);
                Outcome::Error(e)
            }
        }
    }

    async fn fetch_posts_for_group(&self, group_id: i64) -> Outcome {
        let scope = self.selection_scope();
        self.fetch_posts_in(&scope, group_id).await
    }

    async fn fetch_group_members(&self, group_id: i64) -> Outcome {
        let scope = self.selection_scope();
        self.fetch_members_in(&scope, group_id).await
    }
}
