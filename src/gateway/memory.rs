//! In-process backend
//!
//! Holds accounts, one client session, document collections, and files in
//! memory with the same observable semantics as the REST backend: ordering,
//! cursor windows, search, and status errors. Used for offline runs and
//! tests; `fail_next` injects a one-shot failure into a named operation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use super::{
    Account, Backend, BackendError, Document, DocumentList, DocumentQuery, Filter,
    StoredFile,
};
use crate::data::{EntityId, MediaUpload};

const BASE_URL: &str = "memory://snapgram";

struct StoredAccount {
    account: Account,
    password: String,
}

struct StoredBlob {
    file: StoredFile,
    size: usize,
}

#[derive(Default)]
struct MemoryState {
    /// Accounts by email
    accounts: HashMap<String, StoredAccount>,
    /// Account ID of the current session
    session: Option<String>,
    /// Documents in insertion order, per collection
    collections: HashMap<String, Vec<Document>>,
    files: HashMap<String, StoredBlob>,
    /// Last timestamp handed out; keeps timestamps strictly increasing
    clock: Option<DateTime<Utc>>,
}

impl MemoryState {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn document_mut(&mut self, collection: &str, id: &str) -> Result<&mut Document, BackendError> {
        self.collections
            .get_mut(collection)
            .and_then(|documents| documents.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| not_found(collection, id))
    }
}

fn not_found(collection: &str, id: &str) -> BackendError {
    BackendError::NotFound(format!("document {id} in {collection}"))
}

/// Backend kept in process memory
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    failures: Mutex<HashSet<String>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// Make the next call of `operation` fail with a 503
    ///
    /// `operation` is the `Backend` method name, e.g. `"file_preview_url"`.
    pub async fn fail_next(&self, operation: &str) {
        self.failures.lock().await.insert(operation.to_string());
    }

    pub async fn file_count(&self) -> usize {
        self.state.read().await.files.len()
    }

    pub async fn document_count(&self, collection: &str) -> usize {
        self.state
            .read()
            .await
            .collections
            .get(collection)
            .map_or(0, Vec::len)
    }

    async fn injected(&self, operation: &str) -> Result<(), BackendError> {
        if self.failures.lock().await.remove(operation) {
            tracing::debug!(operation, "Injected backend failure");
            return Err(BackendError::Status {
                code: 503,
                message: format!("injected failure in {operation}"),
            });
        }
        Ok(())
    }

    fn file_path(file_id: &str) -> String {
        format!("{BASE_URL}/storage/files/{file_id}")
    }
}

fn field_text(document: &Document, field: &str) -> String {
    match document.field(field) {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn matches(document: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::Equal { field, value } => match document.field(field) {
            Some(Value::String(text)) => &text == value,
            Some(Value::Array(items)) => items.iter().any(|item| item.as_str() == Some(value)),
            Some(other) => other.to_string() == *value,
            None => false,
        },
        Filter::Search { field, term } => field_text(document, field)
            .to_lowercase()
            .contains(&term.to_lowercase()),
    }
}

/// Highest `field` first
fn ordered(mut documents: Vec<Document>, field: Option<&str>) -> Vec<Document> {
    let Some(field) = field else {
        return documents;
    };

    documents.sort_by(|a, b| match field {
        "$createdAt" => a.created_at.cmp(&b.created_at),
        "$updatedAt" => a.updated_at.cmp(&b.updated_at),
        _ => field_text(a, field).cmp(&field_text(b, field)),
    });
    documents.reverse();
    documents
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Account, BackendError> {
        self.injected("create_account").await?;
        let mut state = self.state.write().await;
        if state.accounts.contains_key(email) {
            return Err(BackendError::Status {
                code: 409,
                message: "A user with the same email already exists".to_string(),
            });
        }

        let account = Account {
            id: EntityId::new().0,
            name: name.to_string(),
            email: email.to_string(),
        };
        state.accounts.insert(
            email.to_string(),
            StoredAccount {
                account: account.clone(),
                password: password.to_string(),
            },
        );
        Ok(account)
    }

    async fn create_email_session(&self, email: &str, password: &str) -> Result<(), BackendError> {
        self.injected("create_email_session").await?;
        let mut state = self.state.write().await;
        let account_id = match state.accounts.get(email) {
            Some(stored) if stored.password == password => stored.account.id.clone(),
            _ => {
                return Err(BackendError::Unauthorized(
                    "Invalid credentials".to_string(),
                ));
            }
        };
        state.session = Some(account_id);
        Ok(())
    }

    async fn delete_current_session(&self) -> Result<(), BackendError> {
        self.injected("delete_current_session").await?;
        let mut state = self.state.write().await;
        match state.session.take() {
            Some(_) => Ok(()),
            None => Err(BackendError::Unauthorized("No active session".to_string())),
        }
    }

    async fn get_account(&self) -> Result<Option<Account>, BackendError> {
        self.injected("get_account").await?;
        let state = self.state.read().await;
        let Some(account_id) = &state.session else {
            return Ok(None);
        };
        Ok(state
            .accounts
            .values()
            .find(|stored| &stored.account.id == account_id)
            .map(|stored| stored.account.clone()))
    }

    async fn create_document(
        &self,
        collection: &str,
        data: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        self.injected("create_document").await?;
        let mut state = self.state.write().await;
        let now = state.tick();
        let document = Document {
            id: EntityId::new().0,
            created_at: now,
            updated_at: now,
            data,
        };
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Document, BackendError> {
        self.injected("get_document").await?;
        let state = self.state.read().await;
        state
            .collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|d| d.id == id))
            .cloned()
            .ok_or_else(|| not_found(collection, id))
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        self.injected("update_document").await?;
        let mut state = self.state.write().await;
        let now = state.tick();
        let document = state.document_mut(collection, id)?;
        document.data.extend(data);
        document.updated_at = now;
        Ok(document.clone())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        self.injected("delete_document").await?;
        let mut state = self.state.write().await;
        let documents = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection, id))?;
        let before = documents.len();
        documents.retain(|d| d.id != id);
        if documents.len() == before {
            return Err(not_found(collection, id));
        }
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: &str,
        query: &DocumentQuery,
    ) -> Result<DocumentList, BackendError> {
        self.injected("list_documents").await?;
        let state = self.state.read().await;
        let matching: Vec<Document> = state
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|d| query.filters.iter().all(|f| matches(d, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let total = matching.len() as u64;
        let sorted = ordered(matching, query.order_desc.as_deref());

        let start = match &query.cursor_after {
            Some(cursor) => {
                let position = sorted.iter().position(|d| &d.id == cursor).ok_or_else(|| {
                    BackendError::Status {
                        code: 400,
                        message: format!("Document '{cursor}' for the 'cursor' value not found."),
                    }
                })?;
                position + 1
            }
            None => 0,
        };

        let documents = sorted
            .into_iter()
            .skip(start)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(DocumentList { total, documents })
    }

    async fn create_file(&self, upload: &MediaUpload) -> Result<StoredFile, BackendError> {
        self.injected("create_file").await?;
        let file = StoredFile {
            id: EntityId::new().0,
            name: upload.file_name.clone(),
            mime_type: upload.content_type.clone(),
        };
        self.state.write().await.files.insert(
            file.id.clone(),
            StoredBlob {
                file: file.clone(),
                size: upload.bytes.len(),
            },
        );
        Ok(file)
    }

    async fn file_preview_url(&self, file_id: &str) -> Result<String, BackendError> {
        self.injected("file_preview_url").await?;
        let state = self.state.read().await;
        let blob = state
            .files
            .get(file_id)
            .ok_or_else(|| BackendError::NotFound(format!("file {file_id}")))?;
        if blob.size == 0 {
            return Err(BackendError::Status {
                code: 400,
                message: format!("file {file_id} is empty and has no preview"),
            });
        }
        Ok(format!(
            "{}/preview?width=2000&height=2000&gravity=top&quality=100",
            Self::file_path(file_id)
        ))
    }

    fn file_view_url(&self, file_id: &str) -> String {
        format!("{}/view", Self::file_path(file_id))
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), BackendError> {
        self.injected("delete_file").await?;
        match self.state.write().await.files.remove(file_id) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound(format!("file {file_id}"))),
        }
    }

    async fn probe_content_type(&self, url: &str) -> Result<Option<String>, BackendError> {
        self.injected("probe_content_type").await?;
        let state = self.state.read().await;
        Ok(state
            .files
            .values()
            .find(|blob| self.file_view_url(&blob.file.id) == url)
            .map(|blob| blob.file.mime_type.clone()))
    }

    fn avatar_initials_url(&self, name: &str) -> String {
        format!("{BASE_URL}/avatars/initials?name={}", urlencoding::encode(name))
    }
}
