//! In-process mock of the TripTales REST API.
//!
//! Every request is recorded (method, path, Authorization header) so tests can
//! count calls. Delay and failure knobs let tests reorder or break responses.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use triptales::config::{Config, ConfigOverrides};
use triptales::AppState;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Default)]
pub struct MockData {
    pub calls: Vec<RecordedCall>,
    /// username -> (password, user json)
    pub users: HashMap<String, (String, Value)>,
    pub groups: Vec<Value>,
    pub posts: HashMap<i64, Vec<Value>>,
    pub members: HashMap<i64, Vec<Value>>,
    /// Consumed in arrival order by `GET groups/{id}/posts/`: (delay ms, body)
    pub post_scripts: VecDeque<(u64, Vec<Value>)>,
    pub members_delay_ms: u64,
    /// Per-username delay before `POST login/` answers.
    pub login_delays_ms: HashMap<String, u64>,
    pub create_post_delay_ms: u64,
    pub groups_failure: Option<u16>,
    pub me_failure: Option<u16>,
    pub create_post_failure: Option<(u16, String)>,
    pub post_forms: Vec<HashMap<String, String>>,
    pub comments: Vec<Value>,
    pub likes: Vec<Value>,
    pub next_id: i64,
}

#[derive(Clone, Default)]
pub struct MockApi {
    pub data: Arc<Mutex<MockData>>,
}

impl MockApi {
    pub fn lock(&self) -> std::sync::MutexGuard<'_, MockData> {
        self.data.lock().unwrap()
    }

    pub fn add_user(&self, username: &str, password: &str, id: &str) {
        let user = json!({
            "id": id,
            "username": username,
            "email": format!("{}@example.org", username),
            "avatarUrl": null,
            "badges": [],
            "likesCount": 0
        });
        self.lock()
            .users
            .insert(username.to_string(), (password.to_string(), user));
    }

    pub fn add_group(&self, id: i64, name: &str) {
        self.lock().groups.push(json!({
            "id": id,
            "name": name,
            "description": "",
            "creatorId": "1",
            "members": ["1"],
            "posts": null
        }));
    }

    pub fn set_posts(&self, group_id: i64, posts: Vec<Value>) {
        self.lock().posts.insert(group_id, posts);
    }

    pub fn set_members(&self, group_id: i64, members: Vec<Value>) {
        self.lock().members.insert(group_id, members);
    }

    pub fn script_posts(&self, delay_ms: u64, posts: Vec<Value>) {
        self.lock().post_scripts.push_back((delay_ms, posts));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub async fn wait_for_calls(&self, method: &str, path: &str, count: usize) {
        for _ in 0..200 {
            if self.calls_to(method, path) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {} {} x{}", method, path, count);
    }
}

pub fn post_json(id: i64, group_id: i64, content: &str) -> Value {
    json!({
        "id": id,
        "userId": "1",
        "username": "alice",
        "content": content,
        "timestamp": 1700000000000i64,
        "likes": 0,
        "comments": [],
        "group": group_id
    })
}

fn next_id(data: &mut MockData) -> i64 {
    data.next_id += 1;
    100 + data.next_id
}

fn authorized(data: &MockData, headers: &HeaderMap) -> Option<Value> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let username = value.strip_prefix("Bearer token-")?;
    data.users.get(username).map(|(_, user)| user.clone())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Authentication credentials were not provided."})),
    )
        .into_response()
}

async fn record(State(api): State<MockApi>, request: Request, next: Next) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    api.lock().calls.push(RecordedCall {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        authorization,
    });
    next.run(request).await
}

async fn login(State(api): State<MockApi>, Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let delay = api.lock().login_delays_ms.get(username).copied().unwrap_or(0);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let data = api.lock();
    match data.users.get(username) {
        Some((expected, _)) if expected == password => Json(json!({
            "access": format!("token-{}", username),
            "refresh": "refresh"
        }))
        .into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response(),
    }
}

async fn register(State(api): State<MockApi>, Json(body): Json<Value>) -> Response {
    let mut data = api.lock();
    let username = body["username"].as_str().unwrap_or_default().to_string();
    if data.users.contains_key(&username) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"username": ["A user with that username already exists."]})),
        )
            .into_response();
    }
    let id = next_id(&mut data).to_string();
    let user = json!({
        "id": id,
        "username": username,
        "email": body["email"],
        "badges": [],
        "likesCount": 0
    });
    let password = body["password"].as_str().unwrap_or_default().to_string();
    data.users.insert(username.clone(), (password, user));
    (
        StatusCode::CREATED,
        Json(json!({
            "accessToken": format!("token-{}", username),
            "refreshToken": "refresh"
        })),
    )
        .into_response()
}

async fn me(State(api): State<MockApi>, headers: HeaderMap) -> Response {
    let data = api.lock();
    if let Some(status) = data.me_failure {
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }
    match authorized(&data, &headers) {
        Some(user) => Json(user).into_response(),
        None => unauthorized(),
    }
}

async fn my_groups(State(api): State<MockApi>, headers: HeaderMap) -> Response {
    let data = api.lock();
    if authorized(&data, &headers).is_none() {
        return unauthorized();
    }
    if let Some(status) = data.groups_failure {
        return (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "groups unavailable",
        )
            .into_response();
    }
    Json(Value::Array(data.groups.clone())).into_response()
}

async fn create_group(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut data = api.lock();
    let Some(user) = authorized(&data, &headers) else {
        return unauthorized();
    };
    let id = next_id(&mut data);
    let group = json!({
        "id": id,
        "name": body["name"],
        "description": body["description"],
        "creatorId": user["id"],
        "members": [user["id"]],
        "posts": []
    });
    data.groups.push(group.clone());
    (StatusCode::CREATED, Json(group)).into_response()
}

async fn group_posts(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Path(group_id): Path<i64>,
) -> Response {
    let (delay, posts) = {
        let mut data = api.lock();
        if authorized(&data, &headers).is_none() {
            return unauthorized();
        }
        match data.post_scripts.pop_front() {
            Some(scripted) => scripted,
            None => (0, data.posts.get(&group_id).cloned().unwrap_or_default()),
        }
    };
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    Json(Value::Array(posts)).into_response()
}

async fn group_members(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Path(group_id): Path<i64>,
) -> Response {
    let (delay, members) = {
        let data = api.lock();
        if authorized(&data, &headers).is_none() {
            return unauthorized();
        }
        (
            data.members_delay_ms,
            data.members.get(&group_id).cloned().unwrap_or_default(),
        )
    };
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    Json(Value::Array(members)).into_response()
}

async fn create_post(
    State(api): State<MockApi>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut fields = HashMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await.unwrap_or_default();
        fields.insert(name, value);
    }
    let delay = api.lock().create_post_delay_ms;
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let mut data = api.lock();
    let Some(user) = authorized(&data, &headers) else {
        return unauthorized();
    };
    data.post_forms.push(fields.clone());
    if let Some((status, body)) = data.create_post_failure.clone() {
        return (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST),
            body,
        )
            .into_response();
    }

    let group_id: i64 = fields
        .get("group")
        .and_then(|g| g.parse().ok())
        .unwrap_or_default();
    let id = next_id(&mut data);
    let post = json!({
        "id": id,
        "userId": user["id"],
        "username": user["username"],
        "title": fields.get("title"),
        "content": fields.get("content"),
        "timestamp": 1700000000000i64,
        "likes": 0,
        "comments": [],
        "group": group_id
    });
    data.posts.entry(group_id).or_default().insert(0, post.clone());
    (StatusCode::CREATED, Json(post)).into_response()
}

async fn add_comment(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    let mut data = api.lock();
    if authorized(&data, &headers).is_none() {
        return unauthorized();
    }
    data.comments.push(body.clone());
    body["id"] = json!(next_id(&mut data));
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn like_post(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    let mut data = api.lock();
    if authorized(&data, &headers).is_none() {
        return unauthorized();
    }
    let post_id = body["post"].as_i64().unwrap_or_default();
    for posts in data.posts.values_mut() {
        for post in posts.iter_mut().filter(|p| p["id"] == post_id) {
            let likes = post["likes"].as_i64().unwrap_or_default();
            post["likes"] = json!(likes + 1);
        }
    }
    data.likes.push(body.clone());
    body["id"] = json!(next_id(&mut data));
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn badges(State(api): State<MockApi>, headers: HeaderMap) -> Response {
    let data = api.lock();
    if authorized(&data, &headers).is_none() {
        return unauthorized();
    }
    Json(json!([
        {"id": 1, "name": "Explorer", "icon": "compass", "description": "Joined 5 trips"}
    ]))
    .into_response()
}

pub fn router(api: MockApi) -> Router {
    Router::new()
        .route("/api/login/", post(login))
        .route("/api/register/", post(register))
        .route("/api/me/", get(me))
        .route("/api/groups/mine/", get(my_groups))
        .route("/api/groups/", post(create_group))
        .route("/api/groups/{id}/posts/", get(group_posts))
        .route("/api/groups/{id}/members/", get(group_members))
        .route("/api/posts/", post(create_post))
        .route("/api/comments/", post(add_comment))
        .route("/api/likes/", post(like_post))
        .route("/api/badges/", get(badges))
        .layer(middleware::from_fn_with_state(api.clone(), record))
        .with_state(api)
}

/// Start the mock on an ephemeral port. Returns it with its base URL.
pub async fn spawn() -> (MockApi, String) {
    let api = MockApi::default();
    let app = router(api.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (api, format!("http://{}/api/", addr))
}

/// A server that reads each request and then resets the connection without
/// answering. Returns its base URL and a connection counter.
pub async fn spawn_resetting() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                // drain until the client goes quiet
                while let Ok(Ok(n)) =
                    tokio::time::timeout(Duration::from_millis(150), socket.read(&mut buf)).await
                {
                    if n == 0 {
                        break;
                    }
                }
                #[allow(deprecated)]
                let _ = socket.set_linger(Some(Duration::ZERO));
                drop(socket);
            });
        }
    });
    (format!("http://{}/api/", addr), hits)
}

pub fn config(base_url: &str, dir: &FsPath) -> Config {
    triptales::logging::try_init("triptales=debug");
    let overrides = ConfigOverrides {
        base_url: Some(base_url.to_string()),
        data_dir: Some(dir.to_path_buf()),
        ..Default::default()
    };
    let mut config = Config::load(&overrides).unwrap();
    config.api.timeout_secs = 5;
    config
}

pub fn app_state(base_url: &str, dir: &FsPath) -> AppState {
    AppState::open(&config(base_url, dir)).unwrap()
}
