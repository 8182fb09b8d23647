//! Session store
//!
//! Tracks the authenticated identity of this client context.
//!
//! ```text
//! anonymous ──check──▶ checking ──identity──▶ authenticated(user)
//!                         │ ──none──────▶ anonymous
//!                         └ ──failure───▶ error(cause)
//! ```
//!
//! The store re-checks on load, and after every sign-in or sign-out. It
//! never refreshes in the background. An `error` state grants no access.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, watch};

use super::hint::SessionHint;
use crate::data::{Credentials, NewUser, QueryCache, QueryKey, QueryOptions, User};
use crate::error::AppError;
use crate::gateway::Gateway;
use crate::metrics::SESSION_CHECKS_TOTAL;
use crate::validation::{validate_sign_in, validate_sign_up};

/// Identity state of the client context
#[derive(Debug, Clone)]
pub enum SessionState {
    Anonymous,
    Checking,
    Authenticated(User),
    /// The last check failed; treated as anonymous for access control
    Error(AppError),
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn is_checking(&self) -> bool {
        matches!(self, SessionState::Checking)
    }

    fn outcome(&self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Checking => "checking",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Error(_) => "error",
        }
    }
}

/// Process-wide session store
pub struct SessionStore {
    gateway: Gateway,
    cache: QueryCache,
    hint: SessionHint,
    state: watch::Sender<SessionState>,
    /// Serializes identity checks
    check_lock: Mutex<()>,
    /// Set once any check has completed
    checked: AtomicBool,
}

impl SessionStore {
    pub fn new(gateway: Gateway, cache: QueryCache, hint: SessionHint) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            gateway,
            cache,
            hint,
            state,
            check_lock: Mutex::new(()),
            checked: AtomicBool::new(false),
        }
    }

    /// First identity check on load
    pub async fn initialize(&self) -> SessionState {
        if !self.hint.is_set().await {
            tracing::debug!("No session hint present; expecting anonymous session");
        }
        self.check().await
    }

    /// Ask the backend for the current identity
    ///
    /// Always goes to the backend; concurrent checks share one request.
    pub async fn check(&self) -> SessionState {
        let _guard = self.check_lock.lock().await;
        self.state.send_replace(SessionState::Checking);

        let gateway = self.gateway.clone();
        let result = self
            .cache
            .query(
                QueryKey::current_user(),
                move || {
                    let gateway = gateway.clone();
                    async move { gateway.current_user().await }
                },
                QueryOptions::refetch(),
            )
            .await;

        let next = match result {
            Ok(user) => match user.as_ref() {
                Some(user) => SessionState::Authenticated(user.clone()),
                None => SessionState::Anonymous,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Identity check failed");
                SessionState::Error(error)
            }
        };

        SESSION_CHECKS_TOTAL
            .with_label_values(&[next.outcome()])
            .inc();
        tracing::info!(
            outcome = next.outcome(),
            user_id = next.user().map(|u| u.id.as_str()),
            "Identity checked"
        );

        self.checked.store(true, Ordering::SeqCst);
        self.state.send_replace(next.clone());
        next
    }

    /// Create an identity and profile
    ///
    /// Does not sign in.
    pub async fn sign_up(&self, form: &NewUser) -> Result<User, AppError> {
        validate_sign_up(form)?;
        self.cache
            .mutate(self.gateway.create_user_account(form), &[QueryKey::users()])
            .await
    }

    /// Start a session and re-check the identity
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<SessionState, AppError> {
        validate_sign_in(credentials)?;

        let result = self
            .cache
            .mutate(
                self.gateway.sign_in(&credentials.email, &credentials.password),
                &[QueryKey::current_user()],
            )
            .await;

        if result.is_ok() {
            if let Err(error) = self.hint.set().await {
                tracing::warn!(error = %error, "Failed to record session hint");
            }
        }
        let state = self.check().await;
        result.map(|()| state)
    }

    /// End the session, forget cached data, and re-check the identity
    pub async fn sign_out(&self) -> Result<SessionState, AppError> {
        let result = self.gateway.sign_out().await;
        if let Err(error) = &result {
            tracing::warn!(error = %error, "Remote sign-out failed");
        }

        if let Err(error) = self.hint.clear().await {
            tracing::warn!(error = %error, "Failed to clear session hint");
        }
        self.cache.clear().await;

        let state = self.check().await;
        result.map(|()| state)
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// The signed-in user
    ///
    /// # Errors
    /// `AppError::State` unless authenticated
    pub fn require_user(&self) -> Result<User, AppError> {
        match &*self.state.borrow() {
            SessionState::Authenticated(user) => Ok(user.clone()),
            other => Err(AppError::State(format!(
                "sign-in required (session is {})",
                other.outcome()
            ))),
        }
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Whether protected views should send the user to sign-in
    ///
    /// While a check is pending, including the first one, only the hint
    /// is known.
    pub async fn should_redirect_to_sign_in(&self) -> bool {
        let current = self.current();
        if current.is_authenticated() {
            return false;
        }
        if current.is_checking() || !self.checked.load(Ordering::SeqCst) {
            return !self.hint.is_set().await;
        }
        true
    }
}

/// Shared handle
pub type SharedSession = Arc<SessionStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Collections, MemoryBackend};

    fn store(backend: Arc<MemoryBackend>) -> SessionStore {
        let gateway = Gateway::new(
            backend,
            Collections {
                users: "users".to_string(),
                posts: "posts".to_string(),
                saves: "saves".to_string(),
            },
        );
        SessionStore::new(gateway, QueryCache::new(None), SessionHint::in_memory())
    }

    fn ann() -> NewUser {
        NewUser {
            name: "Ann".to_string(),
            username: "ann1".to_string(),
            email: "a@x.com".to_string(),
            password: "password1".to_string(),
        }
    }

    fn credentials(password: &str) -> Credentials {
        Credentials {
            email: "a@x.com".to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn starts_anonymous_and_redirects_without_hint() {
        let session = store(Arc::new(MemoryBackend::new()));
        assert!(session.should_redirect_to_sign_in().await);

        let state = session.initialize().await;
        assert!(matches!(state, SessionState::Anonymous));
        assert!(session.require_user().is_err());
    }

    #[tokio::test]
    async fn sign_in_authenticates_and_sign_out_resets() {
        let session = store(Arc::new(MemoryBackend::new()));
        let created = session.sign_up(&ann()).await.unwrap();

        let state = session.sign_in(&credentials("password1")).await.unwrap();
        assert_eq!(state.user().map(|u| u.id.as_str()), Some(created.id.as_str()));
        assert_eq!(session.require_user().unwrap().username, "ann1");
        assert!(!session.should_redirect_to_sign_in().await);

        let state = session.sign_out().await.unwrap();
        assert!(matches!(state, SessionState::Anonymous));
        assert!(session.should_redirect_to_sign_in().await);
    }

    #[tokio::test]
    async fn recheck_in_progress_follows_hint() {
        let session = store(Arc::new(MemoryBackend::new()));
        session.sign_up(&ann()).await.unwrap();
        session.sign_in(&credentials("password1")).await.unwrap();

        session.state.send_replace(SessionState::Checking);
        assert!(!session.should_redirect_to_sign_in().await);

        session.hint.clear().await.unwrap();
        assert!(session.should_redirect_to_sign_in().await);
    }

    #[tokio::test]
    async fn wrong_password_leaves_session_anonymous() {
        let session = store(Arc::new(MemoryBackend::new()));
        session.sign_up(&ann()).await.unwrap();

        let error = session.sign_in(&credentials("password2")).await.unwrap_err();
        assert!(matches!(error, AppError::Remote { operation: "sign_in", .. }));
        assert!(matches!(session.current(), SessionState::Anonymous));
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let session = store(backend.clone());

        let error = session.sign_in(&credentials("short")).await.unwrap_err();
        assert_eq!(error.field(), Some("password"));
        assert!(matches!(session.current(), SessionState::Anonymous));
        assert_eq!(backend.document_count("users").await, 0);
    }

    #[tokio::test]
    async fn failed_check_is_error_state() {
        let backend = Arc::new(MemoryBackend::new());
        let session = store(backend.clone());
        let mut states = session.subscribe();

        backend.fail_next("get_account").await;
        let state = session.check().await;

        assert!(matches!(state, SessionState::Error(_)));
        assert!(session.require_user().is_err());
        assert!(states.has_changed().unwrap());
        assert!(matches!(*states.borrow_and_update(), SessionState::Error(_)));
    }
}
