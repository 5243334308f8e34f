use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub likes_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBadge {
    pub id: i64,
    pub user: i64,
    pub badge: i64,
}

/// A trip; the server calls it a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub posts: Option<Vec<Post>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub location_name: Option<String>,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Owning trip
    #[serde(default, rename = "group")]
    pub group_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Zero until the server assigns one
    pub id: i64,
    #[serde(default, rename = "post", skip_serializing_if = "Option::is_none")]
    pub post_id: Option<i64>,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: i64,
}

/// At most one per (user, post), though only the server enforces that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: i64,
    pub user: String,
    pub post: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    #[serde(alias = "accessToken")]
    pub access: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTripRequest {
    pub name: String,
    pub description: String,
}

/// Fields for a new post, before multipart encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub group_id: i64,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>, group_id: i64) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            latitude: None,
            longitude: None,
            group_id,
        }
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Form fields in wire order. Missing coordinates become empty strings,
    /// which the server reads as "no location".
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("title", self.title.clone()),
            ("content", self.content.clone()),
            (
                "latitude",
                self.latitude.map(|v| v.to_string()).unwrap_or_default(),
            ),
            (
                "longitude",
                self.longitude.map(|v| v.to_string()).unwrap_or_default(),
            ),
            ("group", self.group_id.to_string()),
        ]
    }
}
