use std::sync::Arc;

use crate::api::{ApiGateway, NewPost};
use crate::auth::SessionStore;
use crate::error::ClientError;
use crate::outcome::Outcome;

/// Wraps the create-post call and folds every way it can end into an [`Outcome`].
#[derive(Clone)]
pub struct PostRepository {
    gateway: ApiGateway,
    session: Arc<SessionStore>,
}

impl PostRepository {
    pub fn new(gateway: ApiGateway, session: Arc<SessionStore>) -> Self {
        Self { gateway, session }
    }

    pub async fn submit_post(&self, post: &NewPost) -> Outcome {
        if post.title.trim().is_empty() {
            return Outcome::Error(ClientError::validation("title is required"));
        }
        if post.content.trim().is_empty() {
            return Outcome::Error(ClientError::validation("content is required"));
        }

        let token = match self.session.token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::warn!("Post submission skipped: no session token");
                return Outcome::Error(ClientError::Unauthenticated);
            }
            Err(e) => return Outcome::Error(e),
        };

        let client = self.gateway.create_client(Some(token.as_str()));
        match client.create_post(post).await {
            Ok(created) => {
                tracing::info!("Created post {} in group {}", created.id, post.group_id);
                Outcome::Success
            }
            Err(ClientError::ConnectionReset(msg)) => {
                tracing::warn!(
                    "Connection reset while creating post in group {}: {}; assuming accepted",
                    post.group_id,
                    msg
                );
                Outcome::Unconfirmed
            }
            Err(e) => {
                tracing::error!("Failed to create post in group {}: {}", post.group_id, e);
                Outcome::Error(e)
            }
        }
    }
}
