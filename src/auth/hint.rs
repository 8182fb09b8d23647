//! Session hint
//!
//! A persisted flag recording that a backend session probably exists. It
//! lets the client decide to show the sign-in view before the first
//! identity check has answered.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
struct HintFile {
    signed_in_at: DateTime<Utc>,
}

/// Session hint stored in a file, or in memory when no path is configured
pub struct SessionHint {
    path: Option<PathBuf>,
    in_memory: AtomicBool,
}

impl SessionHint {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            in_memory: AtomicBool::new(false),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Whether the hint is present
    ///
    /// An unreadable or malformed file counts as absent.
    pub async fn is_set(&self) -> bool {
        let Some(path) = &self.path else {
            return self.in_memory.load(Ordering::SeqCst);
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice::<HintFile>(&bytes).is_ok(),
            Err(_) => false,
        }
    }

    pub async fn set(&self) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            self.in_memory.store(true, Ordering::SeqCst);
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::internal(format!("cannot create {}: {e}", parent.display())))?;
        }
        let contents = serde_json::to_vec(&HintFile {
            signed_in_at: Utc::now(),
        })
        .map_err(AppError::internal)?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| AppError::internal(format!("cannot write {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Session hint written");
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            self.in_memory.store(false, Ordering::SeqCst);
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::internal(format!(
                "cannot remove {}: {e}",
                path.display()
            ))),
        }
    }
}
