//! Common test utilities for E2E tests

pub mod rest_server;

use std::sync::Arc;

use snapgram::config::{self, AppConfig};
use snapgram::data::{Credentials, MediaUpload, NewPost, NewUser, Post, User};
use snapgram::gateway::MemoryBackend;
use snapgram::ClientState;
use tempfile::TempDir;

/// Client over an in-memory backend
pub struct TestClient {
    pub state: ClientState,
    pub backend: Arc<MemoryBackend>,
    pub _temp_dir: TempDir,
}

impl TestClient {
    /// Create a new test client with a session hint file in a temp dir
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(Some(temp_dir.path().join("session.json")));

        let backend = Arc::new(MemoryBackend::new());
        let state = ClientState::with_backend(config, backend.clone());
        state.session.initialize().await;

        Self {
            state,
            backend,
            _temp_dir: temp_dir,
        }
    }

    /// Sign up and sign in a user named after `username`
    pub async fn sign_up_and_in(&self, username: &str) -> User {
        let form = new_user(username);
        self.state.session.sign_up(&form).await.unwrap();
        let state = self
            .state
            .session
            .sign_in(&Credentials {
                email: form.email.clone(),
                password: form.password.clone(),
            })
            .await
            .unwrap();
        state.user().cloned().expect("signed in")
    }

    /// Create a post by the signed-in user
    pub async fn create_post(&self, caption: &str) -> Post {
        let user = self.state.session.require_user().unwrap();
        self.state
            .posts
            .create(&new_post(&user.id, caption))
            .await
            .unwrap()
    }
}

pub fn test_config(hint_path: Option<std::path::PathBuf>) -> AppConfig {
    let mut config = AppConfig::default();
    config.session = config::SessionConfig { hint_path };
    config
}

pub fn new_user(username: &str) -> NewUser {
    NewUser {
        name: format!("{username} name"),
        username: username.to_string(),
        email: format!("{username}@x.com"),
        password: "password1".to_string(),
    }
}

pub fn photo() -> MediaUpload {
    MediaUpload::new("photo.jpg", vec![0xff, 0xd8, 0xff, 0xe0])
}

pub fn new_post(creator: &str, caption: &str) -> NewPost {
    NewPost {
        creator: creator.to_string(),
        caption: caption.to_string(),
        location: "Lisbon".to_string(),
        tags: "travel, sea".to_string(),
        file: photo(),
    }
}
