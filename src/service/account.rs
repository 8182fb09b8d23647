//! User service
//!
//! Profile queries and the profile update mutation.

use std::sync::Arc;

use crate::config::CacheConfig;
use crate::data::{ProfileForm, QueryCache, QueryKey, QueryOptions, UpdateUser, User};
use crate::error::AppError;
use crate::gateway::Gateway;
use crate::validation::validate_profile;

/// User service
pub struct UserService {
    gateway: Gateway,
    cache: QueryCache,
    config: CacheConfig,
}

impl UserService {
    /// Create new user service
    pub fn new(gateway: Gateway, cache: QueryCache, config: CacheConfig) -> Self {
        Self {
            gateway,
            cache,
            config,
        }
    }

    /// Profile of the signed-in identity, `None` when signed out
    pub async fn current_user(&self) -> Result<Arc<Option<User>>, AppError> {
        let gateway = self.gateway.clone();
        self.cache
            .query(
                QueryKey::current_user(),
                move || {
                    let gateway = gateway.clone();
                    async move { gateway.current_user().await }
                },
                self.options(),
            )
            .await
    }

    /// Newest users
    pub async fn users(&self) -> Result<Arc<Vec<User>>, AppError> {
        let gateway = self.gateway.clone();
        let limit = self.config.users_limit;
        self.cache
            .query(
                QueryKey::users(),
                move || {
                    let gateway = gateway.clone();
                    async move { gateway.list_users(limit).await }
                },
                self.options(),
            )
            .await
    }

    pub async fn user(&self, user_id: &str) -> Result<Arc<User>, AppError> {
        let gateway = self.gateway.clone();
        let id = user_id.to_string();
        self.cache
            .query(
                QueryKey::user_by_id(user_id),
                move || {
                    let gateway = gateway.clone();
                    let id = id.clone();
                    async move { gateway.get_user(&id).await }
                },
                self.options(),
            )
            .await
    }

    /// Update name, bio, and optionally the avatar of `user`
    pub async fn update_profile(&self, user: &User, form: &ProfileForm) -> Result<User, AppError> {
        validate_profile(form)?;

        let update = UpdateUser {
            user_id: user.id.clone(),
            name: form.name.clone(),
            bio: form.bio.clone(),
            image_url: user.image_url.clone(),
            image_id: user.image_id.clone(),
            file: form.file.clone(),
        };

        self.cache
            .mutate_with(self.gateway.update_user(&update), |updated| {
                vec![QueryKey::current_user(), QueryKey::user_by_id(&updated.id)]
            })
            .await
    }

    fn options(&self) -> QueryOptions {
        QueryOptions {
            stale_time: self.config.stale_time(),
            refetch: false,
        }
    }
}
