//! Mock REST backend served over HTTP for `HttpBackend` tests
//!
//! Implements the slice of the REST API the gateway uses, with
//! cookie-based sessions and `queries[]` listing parameters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Multipart, Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{Value, json};
use tokio::net::TcpListener;

const SESSION_COOKIE: &str = "a_session_snapgram";

#[derive(Default)]
struct MockState {
    /// email -> (account id, name, password)
    accounts: HashMap<String, (String, String, String)>,
    /// session token -> account id
    sessions: HashMap<String, String>,
    documents: HashMap<String, Vec<Value>>,
    /// file id -> (name, mime type, bytes)
    files: HashMap<String, (String, String, Vec<u8>)>,
    next_id: u64,
}

impl MockState {
    fn mint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:04}", self.next_id)
    }

    /// Strictly increasing timestamps
    fn timestamp(&self) -> String {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (base + Duration::seconds(self.next_id as i64)).to_rfc3339()
    }
}

type Shared = Arc<Mutex<MockState>>;

/// Mock backend listening on a random local port
pub struct RestServer {
    pub endpoint: String,
    state: Shared,
}

impl RestServer {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));

        let app = Router::new()
            .route("/v1/account", post(create_account).get(get_account))
            .route("/v1/account/sessions/email", post(create_session))
            .route(
                "/v1/account/sessions/current",
                axum::routing::delete(delete_session),
            )
            .route(
                "/v1/databases/:db/collections/:collection/documents",
                post(create_document).get(list_documents),
            )
            .route(
                "/v1/databases/:db/collections/:collection/documents/:id",
                get(get_document)
                    .patch(update_document)
                    .delete(delete_document),
            )
            .route("/v1/storage/buckets/:bucket/files", post(create_file))
            .route(
                "/v1/storage/buckets/:bucket/files/:id",
                axum::routing::delete(delete_file),
            )
            .route("/v1/storage/buckets/:bucket/files/:id/view", get(view_file))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            endpoint: format!("http://{addr}/v1"),
            state,
        }
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(collection)
            .map_or(0, Vec::len)
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message, "code": status.as_u16() }))).into_response()
}

fn session_account(state: &MockState, headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, token)| state.sessions.get(token).cloned())
}

async fn create_account(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let email = body["email"].as_str().unwrap_or_default().to_string();
    if state.accounts.contains_key(&email) {
        return error(StatusCode::CONFLICT, "A user with the same email already exists");
    }
    let id = state.mint("acc");
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    state
        .accounts
        .insert(email.clone(), (id.clone(), name.clone(), password));
    (
        StatusCode::CREATED,
        Json(json!({ "$id": id, "name": name, "email": email })),
    )
        .into_response()
}

async fn create_session(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let account_id = match state.accounts.get(email) {
        Some((id, _, stored)) if stored == password => id.clone(),
        _ => return error(StatusCode::UNAUTHORIZED, "Invalid credentials"),
    };
    let token = state.mint("sess");
    state.sessions.insert(token.clone(), account_id);
    (
        StatusCode::CREATED,
        [(
            header::SET_COOKIE,
            format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly"),
        )],
        Json(json!({ "$id": token })),
    )
        .into_response()
}

async fn get_account(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock().unwrap();
    let Some(account_id) = session_account(&state, &headers) else {
        return error(StatusCode::UNAUTHORIZED, "User (role: guests) missing scope (account)");
    };
    let Some((email, (_, name, _))) = state
        .accounts
        .iter()
        .find(|(_, (id, _, _))| *id == account_id)
    else {
        return error(StatusCode::UNAUTHORIZED, "Account not found");
    };
    Json(json!({ "$id": account_id, "name": name, "email": email })).into_response()
}

async fn delete_session(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().unwrap();
    let Some(account_id) = session_account(&state, &headers) else {
        return error(StatusCode::UNAUTHORIZED, "No active session");
    };
    state.sessions.retain(|_, id| *id != account_id);
    StatusCode::NO_CONTENT.into_response()
}

async fn create_document(
    State(state): State<Shared>,
    Path((_db, collection)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    let id = state.mint("doc");
    let now = state.timestamp();
    let mut document = body["data"].clone();
    document["$id"] = json!(id);
    document["$createdAt"] = json!(now);
    document["$updatedAt"] = json!(now);
    document["$collectionId"] = json!(collection);
    state
        .documents
        .entry(collection)
        .or_default()
        .push(document.clone());
    (StatusCode::CREATED, Json(document)).into_response()
}

async fn get_document(
    State(state): State<Shared>,
    Path((_db, collection, id)): Path<(String, String, String)>,
) -> Response {
    let state = state.lock().unwrap();
    state
        .documents
        .get(&collection)
        .and_then(|documents| documents.iter().find(|d| d["$id"] == json!(id)))
        .map(|document| Json(document.clone()).into_response())
        .unwrap_or_else(|| error(StatusCode::NOT_FOUND, "Document not found"))
}

async fn update_document(
    State(state): State<Shared>,
    Path((_db, collection, id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.next_id += 1;
    let now = state.timestamp();
    let Some(document) = state
        .documents
        .get_mut(&collection)
        .and_then(|documents| documents.iter_mut().find(|d| d["$id"] == json!(id)))
    else {
        return error(StatusCode::NOT_FOUND, "Document not found");
    };
    if let (Some(target), Some(changes)) = (document.as_object_mut(), body["data"].as_object()) {
        for (key, value) in changes {
            target.insert(key.clone(), value.clone());
        }
    }
    document["$updatedAt"] = json!(now);
    Json(document.clone()).into_response()
}

async fn delete_document(
    State(state): State<Shared>,
    Path((_db, collection, id)): Path<(String, String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    let Some(documents) = state.documents.get_mut(&collection) else {
        return error(StatusCode::NOT_FOUND, "Collection not found");
    };
    let before = documents.len();
    documents.retain(|d| d["$id"] != json!(id));
    if documents.len() == before {
        return error(StatusCode::NOT_FOUND, "Document not found");
    }
    StatusCode::NO_CONTENT.into_response()
}

/// `name(args)` with JSON-compatible args, e.g. `equal("creator", ["u1"])`
fn parse_query(raw: &str) -> Option<(String, Vec<Value>)> {
    let (name, rest) = raw.split_once('(')?;
    let args = rest.strip_suffix(')')?;
    let args: Vec<Value> = serde_json::from_str(&format!("[{args}]")).ok()?;
    Some((name.to_string(), args))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

async fn list_documents(
    State(state): State<Shared>,
    Path((_db, collection)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Response {
    let state = state.lock().unwrap();
    let mut documents: Vec<Value> = state.documents.get(&collection).cloned().unwrap_or_default();

    let queries: Vec<String> = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter(|(key, _)| key == "queries[]")
        .map(|(_, value)| value.into_owned())
        .collect();

    let mut limit = 25;
    let mut cursor = None;
    for raw in &queries {
        let Some((name, args)) = parse_query(raw) else {
            return error(StatusCode::BAD_REQUEST, &format!("Invalid query: {raw}"));
        };
        let field = args.first().map(text).unwrap_or_default();
        let operand = args
            .get(1)
            .and_then(|v| v.as_array())
            .and_then(|values| values.first())
            .map(text)
            .unwrap_or_default();

        match name.as_str() {
            "equal" => documents.retain(|d| match &d[&field] {
                Value::Array(items) => items.iter().any(|item| text(item) == operand),
                value => text(value) == operand,
            }),
            "search" => documents.retain(|d| {
                text(&d[&field])
                    .to_lowercase()
                    .contains(&operand.to_lowercase())
            }),
            "orderDesc" => {
                documents.sort_by_key(|d| text(&d[&field]));
                documents.reverse();
            }
            "limit" => limit = args.first().and_then(Value::as_u64).unwrap_or(25) as usize,
            "cursorAfter" => cursor = Some(field),
            other => {
                return error(StatusCode::BAD_REQUEST, &format!("Unsupported query: {other}"));
            }
        }
    }

    let total = documents.len();
    let start = match cursor {
        Some(cursor) => match documents.iter().position(|d| text(&d["$id"]) == cursor) {
            Some(position) => position + 1,
            None => return error(StatusCode::BAD_REQUEST, "Cursor document not found"),
        },
        None => 0,
    };
    let page: Vec<Value> = documents.into_iter().skip(start).take(limit).collect();
    Json(json!({ "total": total, "documents": page })).into_response()
}

async fn create_file(
    State(state): State<Shared>,
    Path(_bucket): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let mut upload = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("upload").to_string();
            let mime = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.unwrap_or_default().to_vec();
            upload = Some((name, mime, bytes));
        }
    }
    let Some((name, mime, bytes)) = upload else {
        return error(StatusCode::BAD_REQUEST, "Missing file");
    };

    let mut state = state.lock().unwrap();
    let id = state.mint("file");
    state
        .files
        .insert(id.clone(), (name.clone(), mime.clone(), bytes));
    (
        StatusCode::CREATED,
        Json(json!({ "$id": id, "name": name, "mimeType": mime })),
    )
        .into_response()
}

async fn delete_file(
    State(state): State<Shared>,
    Path((_bucket, id)): Path<(String, String)>,
) -> Response {
    match state.lock().unwrap().files.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error(StatusCode::NOT_FOUND, "File not found"),
    }
}

async fn view_file(
    State(state): State<Shared>,
    Path((_bucket, id)): Path<(String, String)>,
) -> Response {
    let state = state.lock().unwrap();
    match state.files.get(&id) {
        Some((_, mime, bytes)) => {
            ([(header::CONTENT_TYPE, mime.clone())], bytes.clone()).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "File not found"),
    }
}
