//! Remote data gateway
//!
//! Typed operations over the backend-as-a-service: accounts, profile and
//! post documents, saves, and media files. Pure request/response; caching
//! lives in the query cache.
//!
//! # Architecture
//!
//! ```text
//! Gateway (typed models, compensation, metrics)
//!    │
//!    ▼
//! Arc<dyn Backend>
//!    ├── HttpBackend   (REST API over reqwest)
//!    └── MemoryBackend (in-process)
//! ```

mod document;
mod http;
mod memory;
mod posts;

pub use document::{Document, DocumentList, DocumentQuery, Filter};
pub use http::HttpBackend;
pub use memory::MemoryBackend;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::config::BackendConfig;
use crate::data::{MediaUpload, NewUser, StoredMedia, UpdateUser, User};
use crate::error::AppError;
use crate::metrics::{
    GATEWAY_REQUEST_DURATION_SECONDS, GATEWAY_REQUESTS_TOTAL, MEDIA_COMPENSATIONS_TOTAL,
    MEDIA_UPLOADS_TOTAL,
};
use crate::storage::MediaKind;

// =============================================================================
// Backend contract
// =============================================================================

/// Failure reported by a backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl BackendError {
    fn into_app_error(self, operation: &'static str) -> AppError {
        match self {
            BackendError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Remote {
                operation,
                cause: other.to_string(),
            },
        }
    }
}

/// Backend identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

/// File stored in the media bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// Operations the backend-as-a-service offers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Account, BackendError>;

    /// Start a session for the client context
    async fn create_email_session(&self, email: &str, password: &str) -> Result<(), BackendError>;

    async fn delete_current_session(&self) -> Result<(), BackendError>;

    /// Identity of the current session, `None` when signed out
    async fn get_account(&self) -> Result<Option<Account>, BackendError>;

    async fn create_document(
        &self,
        collection: &str,
        data: Map<String, Value>,
    ) -> Result<Document, BackendError>;

    async fn get_document(&self, collection: &str, id: &str) -> Result<Document, BackendError>;

    /// Merge `data` into the document
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<Document, BackendError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), BackendError>;

    async fn list_documents(
        &self,
        collection: &str,
        query: &DocumentQuery,
    ) -> Result<DocumentList, BackendError>;

    async fn create_file(&self, upload: &MediaUpload) -> Result<StoredFile, BackendError>;

    /// Resized preview URL of a stored file
    async fn file_preview_url(&self, file_id: &str) -> Result<String, BackendError>;

    /// Original-size retrieval URL of a stored file
    fn file_view_url(&self, file_id: &str) -> String;

    async fn delete_file(&self, file_id: &str) -> Result<(), BackendError>;

    /// Content type reported for `url`, if any
    async fn probe_content_type(&self, url: &str) -> Result<Option<String>, BackendError>;

    /// Generated avatar URL showing the initials of `name`
    fn avatar_initials_url(&self, name: &str) -> String;
}

// =============================================================================
// Gateway
// =============================================================================

/// Collection IDs the gateway reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    pub users: String,
    pub posts: String,
    pub saves: String,
}

impl Collections {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            users: config.user_collection_id.clone(),
            posts: config.post_collection_id.clone(),
            saves: config.saves_collection_id.clone(),
        }
    }
}

/// Typed gateway over a backend
#[derive(Clone)]
pub struct Gateway {
    backend: Arc<dyn Backend>,
    collections: Collections,
}

impl Gateway {
    pub fn new(backend: Arc<dyn Backend>, collections: Collections) -> Self {
        Self {
            backend,
            collections,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create an identity and its profile record
    ///
    /// The profile starts with an initials avatar.
    pub async fn create_user_account(&self, new_user: &NewUser) -> Result<User, AppError> {
        let account = call(
            "create_account",
            self.backend
                .create_account(&new_user.email, &new_user.password, &new_user.name),
        )
        .await?;

        let avatar_url = self.backend.avatar_initials_url(&new_user.name);
        let data = object(json!({
            "accountId": account.id,
            "name": new_user.name,
            "username": new_user.username,
            "email": new_user.email,
            "imageUrl": avatar_url,
        }));

        let document = call(
            "create_user",
            self.backend.create_document(&self.collections.users, data),
        )
        .await?;
        tracing::info!(account_id = %account.id, user_id = %document.id, "Created user account");
        model("create_user", document)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AppError> {
        call("sign_in", self.backend.create_email_session(email, password)).await
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        call("sign_out", self.backend.delete_current_session()).await
    }

    /// Profile of the signed-in identity, `None` when signed out
    ///
    /// # Errors
    /// `AppError::NotFound` if the identity has no profile record.
    pub async fn current_user(&self) -> Result<Option<User>, AppError> {
        let Some(account) = call("current_account", self.backend.get_account()).await? else {
            return Ok(None);
        };

        let query = DocumentQuery::new().equal("accountId", &account.id).limit(1);
        let list = call(
            "current_user",
            self.backend.list_documents(&self.collections.users, &query),
        )
        .await?;

        match list.documents.into_iter().next() {
            Some(document) => model("current_user", document).map(Some),
            None => Err(AppError::NotFound(format!(
                "profile for account {}",
                account.id
            ))),
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Newest users first
    pub async fn list_users(&self, limit: usize) -> Result<Vec<User>, AppError> {
        let query = DocumentQuery::new().order_desc("$createdAt").limit(limit);
        let list = call(
            "list_users",
            self.backend.list_documents(&self.collections.users, &query),
        )
        .await?;
        models("list_users", list)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, AppError> {
        let document = call(
            "get_user",
            self.backend.get_document(&self.collections.users, user_id),
        )
        .await?;
        model("get_user", document)
    }

    /// Update a profile, replacing the avatar if a file is given
    ///
    /// A replacement file is deleted again if the update fails; the previous
    /// avatar is deleted once the update succeeds.
    pub async fn update_user(&self, update: &UpdateUser) -> Result<User, AppError> {
        let replacement = match &update.file {
            Some(file) => Some(self.upload_media(file).await?),
            None => None,
        };

        let (image_url, image_id) = match &replacement {
            Some(media) => (media.preview_url.clone(), Some(media.id.clone())),
            None => (update.image_url.clone(), update.image_id.clone()),
        };
        let data = object(json!({
            "name": update.name,
            "bio": update.bio,
            "imageUrl": image_url,
            "imageId": image_id,
        }));

        let result = call(
            "update_user",
            self.backend
                .update_document(&self.collections.users, &update.user_id, data),
        )
        .await;

        match result {
            Ok(document) => {
                if replacement.is_some() {
                    if let Some(previous) = &update.image_id {
                        self.discard_media(previous).await;
                    }
                }
                model("update_user", document)
            }
            Err(error) => {
                if let Some(media) = &replacement {
                    self.compensate_upload(&media.id).await;
                }
                Err(error)
            }
        }
    }

    // =========================================================================
    // Media
    // =========================================================================

    /// Upload a file and derive its preview URL
    ///
    /// If the preview cannot be derived the file is deleted and the upload
    /// fails, so no orphaned media is left behind.
    pub async fn upload_media(&self, upload: &MediaUpload) -> Result<StoredMedia, AppError> {
        let file = call("upload_media", self.backend.create_file(upload)).await?;
        MEDIA_UPLOADS_TOTAL.inc();
        tracing::debug!(
            file_id = %file.id,
            content_type = %upload.content_type,
            size = upload.bytes.len(),
            "Uploaded media"
        );

        match call("media_preview", self.backend.file_preview_url(&file.id)).await {
            Ok(preview_url) => Ok(StoredMedia {
                id: file.id,
                preview_url,
            }),
            Err(error) => {
                self.compensate_upload(&file.id).await;
                Err(error)
            }
        }
    }

    pub async fn delete_media(&self, media_id: &str) -> Result<(), AppError> {
        call("delete_media", self.backend.delete_file(media_id)).await
    }

    /// Retrieval URL of stored media
    pub fn media_url(&self, media_id: &str) -> String {
        self.backend.file_view_url(media_id)
    }

    /// Probe stored media and classify it
    ///
    /// Recomputed on every call.
    pub async fn media_kind(&self, media_id: &str) -> Result<MediaKind, AppError> {
        let url = self.media_url(media_id);
        let content_type = call("probe_media", self.backend.probe_content_type(&url)).await?;
        Ok(MediaKind::from_content_type(content_type.as_deref()))
    }

    /// Delete media uploaded by a step that then failed
    async fn compensate_upload(&self, media_id: &str) {
        MEDIA_COMPENSATIONS_TOTAL.inc();
        match self.delete_media(media_id).await {
            Ok(()) => tracing::info!(media_id, "Deleted media of failed operation"),
            Err(error) => {
                tracing::error!(media_id, error = %error, "Failed to delete orphaned media")
            }
        }
    }

    /// Delete media that is no longer referenced; failures are only logged
    async fn discard_media(&self, media_id: &str) {
        if let Err(error) = self.delete_media(media_id).await {
            tracing::warn!(media_id, error = %error, "Failed to delete unreferenced media");
        }
    }
}

/// Run one backend request with metrics, mapping its error
async fn call<T, Fut>(operation: &'static str, request: Fut) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, BackendError>>,
{
    let timer = GATEWAY_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .start_timer();
    let result = request.await;
    timer.observe_duration();

    let outcome = match &result {
        Ok(_) => "ok",
        Err(BackendError::NotFound(_)) => "not_found",
        Err(_) => "error",
    };
    GATEWAY_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();

    result.map_err(|error| {
        tracing::debug!(operation, error = %error, "Backend request failed");
        error.into_app_error(operation)
    })
}

fn model<T: DeserializeOwned>(operation: &'static str, document: Document) -> Result<T, AppError> {
    let id = document.id.clone();
    document.into_model().map_err(|e| AppError::Remote {
        operation,
        cause: format!("malformed document {id}: {e}"),
    })
}

fn models<T: DeserializeOwned>(operation: &'static str, list: DocumentList) -> Result<Vec<T>, AppError> {
    list.documents
        .into_iter()
        .map(|document| model(operation, document))
        .collect()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
