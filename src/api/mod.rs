//! REST gateway for the TripTales server.
//!
//! [`ApiGateway`] owns one pooled HTTP client. [`ApiGateway::create_client`]
//! hands out a lightweight [`ApiClient`] bound to a token, so callers build a
//! fresh one per call site and never reuse a client across logout.

pub mod models;

use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ClientError, ClientResult};

pub use models::*;

#[derive(Clone)]
pub struct ApiGateway {
    http: reqwest::Client,
    base: Url,
}

impl ApiGateway {
    pub fn new(config: &ApiConfig) -> ClientResult<Self> {
        let base = config.base()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// A client that sends `Authorization: Bearer <token>` when `token` is
    /// non-empty, and nothing otherwise.
    pub fn create_client(&self, token: Option<&str>) -> ApiClient {
        ApiClient {
            http: self.http.clone(),
            base: self.base.clone(),
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
        }
    }
}

/// One method per remote operation. Each is a single round trip, no retries.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    // --- Auth ---

    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<AuthTokens> {
        self.send_json(Method::POST, "register/", request).await
    }

    pub async fn login(&self, request: &LoginRequest) -> ClientResult<AuthTokens> {
        self.send_json(Method::POST, "login/", request).await
    }

    pub async fn me(&self) -> ClientResult<User> {
        self.get("me/").await
    }

    // --- Groups ---

    pub async fn my_groups(&self) -> ClientResult<Vec<Trip>> {
        self.get("groups/mine/").await
    }

    pub async fn create_group(&self, request: &CreateTripRequest) -> ClientResult<Trip> {
        self.send_json(Method::POST, "groups/", request).await
    }

    pub async fn posts_for_group(&self, group_id: i64) -> ClientResult<Vec<Post>> {
        self.get(&format!("groups/{}/posts/", group_id)).await
    }

    pub async fn group_members(&self, group_id: i64) -> ClientResult<Vec<User>> {
        self.get(&format!("groups/{}/members/", group_id)).await
    }

    // --- Posts ---

    pub async fn posts(&self) -> ClientResult<Vec<Post>> {
        self.get("posts/").await
    }

    /// Multipart upload; every field is sent, even when blank.
    pub async fn create_post(&self, post: &NewPost) -> ClientResult<Post> {
        let form = post
            .form_fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));
        let request = self.request(Method::POST, "posts/")?.multipart(form);
        self.send(request, "posts/").await
    }

    // --- Comments ---

    pub async fn comments(&self) -> ClientResult<Vec<Comment>> {
        self.get("comments/").await
    }

    pub async fn add_comment(&self, comment: &Comment) -> ClientResult<Comment> {
        self.send_json(Method::POST, "comments/", comment).await
    }

    // --- Likes ---

    pub async fn likes(&self) -> ClientResult<Vec<Like>> {
        self.get("likes/").await
    }

    pub async fn like_post(&self, like: &Like) -> ClientResult<Like> {
        self.send_json(Method::POST, "likes/", like).await
    }

    // --- Badges ---

    pub async fn badges(&self) -> ClientResult<Vec<Badge>> {
        self.get("badges/").await
    }

    pub async fn user_badges(&self) -> ClientResult<Vec<UserBadge>> {
        self.get("userbadges/").await
    }

    // --- Plumbing ---

    fn request(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path, e)))?;
        tracing::debug!(%method, %url, authenticated = self.token.is_some(), "api request");

        let mut request = self.http.request(method, url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let request = self.request(Method::GET, path)?;
        self.send(request, path).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(method, path)?.json(body);
        self.send(request, path).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> ClientResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::trace!(path, status = status.as_u16(), body = %body, "api response");

        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| ClientError::Decode(format!("{}: {}", path, e)))
    }
}
