//! REST backend
//!
//! Talks to an Appwrite-compatible REST API. The session cookie set at
//! sign-in is kept in the client's cookie store, so one `HttpBackend` is one
//! client context.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use super::{Account, Backend, BackendError, Document, DocumentList, DocumentQuery, StoredFile};
use crate::config::BackendConfig;
use crate::data::MediaUpload;
use crate::error::AppError;

/// ID placeholder asking the server to mint a unique ID
const UNIQUE_ID: &str = "unique()";

/// Preview size and crop of uploaded media
const PREVIEW_PARAMS: &str = "width=2000&height=2000&gravity=top&quality=100";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Backend over the REST API
pub struct HttpBackend {
    client: reqwest::Client,
    /// API base URL without trailing slash, e.g. "https://cloud.example.com/v1"
    endpoint: String,
    project_id: String,
    database_id: String,
    storage_id: String,
}

impl HttpBackend {
    /// Create new REST backend
    ///
    /// # Errors
    /// Returns error if the project ID is not a valid header value or the
    /// HTTP client cannot be built
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        let project = HeaderValue::from_str(&config.project_id)
            .map_err(|e| AppError::Config(format!("invalid project id: {e}")))?;
        headers.insert("X-Appwrite-Project", project);
        headers.insert(
            "X-Appwrite-Response-Format",
            HeaderValue::from_static("1.4.0"),
        );

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(config.timeout())
            .user_agent(concat!("snapgram/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            database_id: config.database_id.clone(),
            storage_id: config.storage_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn documents_url(&self, collection: &str) -> String {
        self.url(&format!(
            "/databases/{}/collections/{}/documents",
            self.database_id, collection
        ))
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.documents_url(collection), id)
    }

    fn file_url(&self, file_id: &str) -> String {
        self.url(&format!(
            "/storage/buckets/{}/files/{}",
            self.storage_id, file_id
        ))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = check(request.send().await.map_err(transport)?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), BackendError> {
        check(request.send().await.map_err(transport)?).await?;
        Ok(())
    }
}

fn transport(error: reqwest::Error) -> BackendError {
    BackendError::Transport(error.to_string())
}

/// Map non-success statuses to backend errors
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let fallback = status.canonical_reason().unwrap_or("request failed").to_string();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => fallback,
    };

    Err(match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized(message),
        _ => BackendError::Status {
            code: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Account, BackendError> {
        let body = json!({
            "userId": UNIQUE_ID,
            "email": email,
            "password": password,
            "name": name,
        });
        self.send(self.client.post(self.url("/account")).json(&body))
            .await
    }

    async fn create_email_session(&self, email: &str, password: &str) -> Result<(), BackendError> {
        let body = json!({ "email": email, "password": password });
        self.send_empty(
            self.client
                .post(self.url("/account/sessions/email"))
                .json(&body),
        )
        .await
    }

    async fn delete_current_session(&self) -> Result<(), BackendError> {
        self.send_empty(self.client.delete(self.url("/account/sessions/current")))
            .await
    }

    async fn get_account(&self) -> Result<Option<Account>, BackendError> {
        match self.send(self.client.get(self.url("/account"))).await {
            Ok(account) => Ok(Some(account)),
            Err(BackendError::Unauthorized(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn create_document(
        &self,
        collection: &str,
        data: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        let body = json!({ "documentId": UNIQUE_ID, "data": data });
        self.send(self.client.post(self.documents_url(collection)).json(&body))
            .await
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Document, BackendError> {
        self.send(self.client.get(self.document_url(collection, id)))
            .await
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        let body = json!({ "data": data });
        self.send(
            self.client
                .patch(self.document_url(collection, id))
                .json(&body),
        )
        .await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        self.send_empty(self.client.delete(self.document_url(collection, id)))
            .await
    }

    async fn list_documents(
        &self,
        collection: &str,
        query: &DocumentQuery,
    ) -> Result<DocumentList, BackendError> {
        let params: Vec<(&str, String)> = query
            .to_query_strings()
            .into_iter()
            .map(|q| ("queries[]", q))
            .collect();
        self.send(self.client.get(self.documents_url(collection)).query(&params))
            .await
    }

    async fn create_file(&self, upload: &MediaUpload) -> Result<StoredFile, BackendError> {
        let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| BackendError::Status {
                code: 400,
                message: format!("invalid content type {}: {e}", upload.content_type),
            })?;
        let form = reqwest::multipart::Form::new()
            .text("fileId", UNIQUE_ID)
            .part("file", part);

        let url = self.url(&format!("/storage/buckets/{}/files", self.storage_id));
        self.send(self.client.post(url).multipart(form)).await
    }

    async fn file_preview_url(&self, file_id: &str) -> Result<String, BackendError> {
        if file_id.is_empty() {
            return Err(BackendError::NotFound("file with empty id".to_string()));
        }
        Ok(format!(
            "{}/preview?{}&project={}",
            self.file_url(file_id),
            PREVIEW_PARAMS,
            urlencoding::encode(&self.project_id)
        ))
    }

    fn file_view_url(&self, file_id: &str) -> String {
        format!(
            "{}/view?project={}",
            self.file_url(file_id),
            urlencoding::encode(&self.project_id)
        )
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), BackendError> {
        self.send_empty(self.client.delete(self.file_url(file_id)))
            .await
    }

    async fn probe_content_type(&self, url: &str) -> Result<Option<String>, BackendError> {
        let response = check(self.client.head(url).send().await.map_err(transport)?).await?;
        Ok(response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string))
    }

    fn avatar_initials_url(&self, name: &str) -> String {
        format!(
            "{}?name={}&project={}",
            self.url("/avatars/initials"),
            urlencoding::encode(name),
            urlencoding::encode(&self.project_id)
        )
    }
}
