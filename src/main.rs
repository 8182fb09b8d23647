//! Snapgram binary entry point
//!
//! Boots the client core against the configured backend, checks the
//! session, and logs the first feed page.

use chrono::Utc;
use snapgram::{ClientState, config, service};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Initialize metrics
/// 3. Load configuration from file and environment
/// 4. Initialize ClientState
/// 5. Check the session and load the feed
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("SNAPGRAM__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "snapgram=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "snapgram=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting Snapgram...");

    // 2. Initialize metrics
    snapgram::metrics::init_metrics();

    // 3. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        backend = ?config.backend.mode,
        endpoint = %config.backend.endpoint,
        "Configuration loaded"
    );

    // 4. Initialize client state
    let state = ClientState::new(config)?;

    // 5. Check the session and load the feed
    let session = state.session.initialize().await;
    if state.session.should_redirect_to_sign_in().await {
        tracing::info!("No signed-in user; sign-in required for protected views");
    } else if let Some(user) = session.user() {
        tracing::info!(user_id = %user.id, username = %user.username, "Signed in");
    }

    match state.posts.feed().await {
        Ok(pages) => {
            let now = Utc::now();
            for post in pages.items() {
                tracing::info!(
                    post_id = %post.id,
                    posted = %service::relative_time(post.created_at, now),
                    caption = %post.caption,
                    "Feed post"
                );
            }
            tracing::info!(
                posts = pages.items().count(),
                has_next_page = pages.has_next_page(),
                "Feed loaded"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load feed");
        }
    }

    tracing::debug!(metrics = %snapgram::metrics::gather()?, "Metrics snapshot");

    Ok(())
}
