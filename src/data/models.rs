//! Data models
//!
//! Rust structs mirroring backend documents. The backend owns these
//! records; the client only caches copies of them.
//! Field names follow the backend's camelCase wire format, with
//! `$`-prefixed system fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pagination::Identified;

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Used by the in-process backend when it mints document and file IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string().to_ascii_lowercase())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// User
// =============================================================================

/// A user profile record
///
/// Created at sign-up alongside the backend identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "$id")]
    pub id: String,
    /// Backend identity (account) this profile belongs to
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    /// Avatar URL (initials avatar until a picture is uploaded)
    pub image_url: String,
    /// Stored media ID of an uploaded avatar
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub bio: String,
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// Post
// =============================================================================

/// A post with one media attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "$id")]
    pub id: String,
    /// Creator user ID
    pub creator: String,
    pub caption: String,
    /// Stored media ID
    pub image_id: String,
    /// Preview URL derived from the media ID
    pub image_url: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// User IDs that liked this post
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "$updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }

    /// Like list after toggling `user_id`: removed if present, added otherwise
    pub fn likes_toggled(&self, user_id: &str) -> Vec<String> {
        if self.is_liked_by(user_id) {
            self.likes
                .iter()
                .filter(|id| id.as_str() != user_id)
                .cloned()
                .collect()
        } else {
            self.likes_ensured(user_id)
        }
    }

    /// Like list with `user_id` present exactly once
    pub fn likes_ensured(&self, user_id: &str) -> Vec<String> {
        let mut likes: Vec<String> = self
            .likes
            .iter()
            .filter(|id| id.as_str() != user_id)
            .cloned()
            .collect();
        likes.push(user_id.to_string());
        likes
    }
}

impl Identified for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Split a comma separated tag string
///
/// Spaces are removed and empty segments dropped: `"sun, sea,,"` becomes
/// `["sun", "sea"]`.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.replace(' ', "")
        .split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Saved Post
// =============================================================================

/// Join record between a user and a post they saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPost {
    #[serde(rename = "$id")]
    pub id: String,
    /// User ID
    pub user: String,
    /// Post ID
    pub post: String,
}

/// A save record joined with the post it points to
#[derive(Debug, Clone, PartialEq)]
pub struct SavedPostDetail {
    pub record: SavedPost,
    pub post: Post,
}

// =============================================================================
// Inputs
// =============================================================================

/// Sign-up input
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Sign-in input
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Media file selected for upload
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Media stored by the backend with its derived preview URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub id: String,
    pub preview_url: String,
}

/// Post creation input
#[derive(Debug, Clone)]
pub struct NewPost {
    pub creator: String,
    pub caption: String,
    pub location: String,
    /// Raw comma separated tags
    pub tags: String,
    pub file: MediaUpload,
}

/// Post edit input
#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub post_id: String,
    pub caption: String,
    pub location: String,
    pub tags: String,
    /// Current media, kept unless `file` replaces it
    pub image_id: String,
    pub image_url: String,
    pub file: Option<MediaUpload>,
}

/// Profile edit input
#[derive(Debug, Clone)]
pub struct UpdateUser {
    pub user_id: String,
    pub name: String,
    pub bio: String,
    pub image_url: String,
    pub image_id: Option<String>,
    pub file: Option<MediaUpload>,
}

/// Profile edit form
///
/// `username` and `email` are validated but not written back.
#[derive(Debug, Clone)]
pub struct ProfileForm {
    pub name: String,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub file: Option<MediaUpload>,
}
