//! Snapgram - client core for a photo-sharing social app
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Post and user queries/mutations                          │
//! │  - Invalidation sets per mutation                           │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                  │
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       Session Store       │   │         Query Cache          │
//! │  - Identity state         │──▶│  - Deduplicated fetches      │
//! │  - Sign-in/out flows      │   │  - Staleness, subscribers    │
//! └──────────────────────────┘   └──────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway Layer                            │
//! │  - Typed backend operations, media compensation             │
//! │  - REST backend (reqwest) or in-memory backend              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `gateway`: Backend contract and typed remote operations
//! - `data`: Models, query keys, query cache, pagination
//! - `auth`: Session store and session hint
//! - `service`: Queries and mutations bound to cache keys
//! - `storage`: Media classification
//! - `validation`: Form constraints
//! - `config`: Configuration management
//! - `error`: Error types

pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod service;
pub mod storage;
pub mod validation;

use std::sync::Arc;

/// Client state shared by every view
///
/// Cheap to clone; clones share caches and the session.
#[derive(Clone)]
pub struct ClientState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Typed backend operations
    pub gateway: gateway::Gateway,

    /// Query cache (volatile)
    pub cache: data::QueryCache,

    /// Identity of this client context
    pub session: auth::SharedSession,

    pub posts: Arc<service::PostService>,

    pub users: Arc<service::UserService>,
}

impl ClientState {
    /// Initialize client state with the configured backend
    ///
    /// # Errors
    /// Returns error if the HTTP backend cannot be built
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let backend: Arc<dyn gateway::Backend> = match config.backend.mode {
            config::BackendMode::Http => {
                tracing::info!(endpoint = %config.backend.endpoint, "Using REST backend");
                Arc::new(gateway::HttpBackend::new(&config.backend)?)
            }
            config::BackendMode::Memory => {
                tracing::info!("Using in-memory backend");
                Arc::new(gateway::MemoryBackend::new())
            }
        };
        Ok(Self::with_backend(config, backend))
    }

    /// Initialize client state over an existing backend
    pub fn with_backend(config: config::AppConfig, backend: Arc<dyn gateway::Backend>) -> Self {
        let collections = gateway::Collections::from_config(&config.backend);
        let gateway = gateway::Gateway::new(backend, collections);
        let cache = data::QueryCache::new(config.cache.stale_time());

        let hint = auth::SessionHint::new(config.session.hint_path.clone());
        let session = Arc::new(auth::SessionStore::new(
            gateway.clone(),
            cache.clone(),
            hint,
        ));

        let posts = Arc::new(service::PostService::new(
            gateway.clone(),
            cache.clone(),
            session.clone(),
            config.cache.clone(),
        ));
        let users = Arc::new(service::UserService::new(
            gateway.clone(),
            cache.clone(),
            config.cache.clone(),
        ));

        tracing::info!("Client state initialized");

        Self {
            config: Arc::new(config),
            gateway,
            cache,
            session,
            posts,
            users,
        }
    }
}
