//! Post service
//!
//! Post queries and mutations through the query cache. Each mutation
//! declares the queries it makes stale:
//!
//! | Mutation        | Invalidates                                          |
//! |-----------------|------------------------------------------------------|
//! | create          | recent, infinite, user posts (creator)               |
//! | update          | post by id, recent, infinite                         |
//! | delete          | post by id, recent, infinite, user posts (creator)   |
//! | like            | post by id, recent, infinite, current user           |
//! | save / unsave   | recent, infinite, current user, saved posts (user)   |

use std::sync::Arc;

use futures::Stream;

use super::feed::sample_featured;
use crate::auth::SharedSession;
use crate::config::CacheConfig;
use crate::data::{
    NewPost, Pages, Post, QueryCache, QueryKey, QueryOptions, SavedPost, SavedPostDetail,
    UpdatePost, page_stream,
};
use crate::error::AppError;
use crate::gateway::Gateway;
use crate::validation::{validate_new_post, validate_post_update};

/// Post service
pub struct PostService {
    gateway: Gateway,
    cache: QueryCache,
    session: SharedSession,
    config: CacheConfig,
}

impl PostService {
    /// Create new post service
    pub fn new(
        gateway: Gateway,
        cache: QueryCache,
        session: SharedSession,
        config: CacheConfig,
    ) -> Self {
        Self {
            gateway,
            cache,
            session,
            config,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Newest posts by creation
    pub async fn recent(&self) -> Result<Arc<Vec<Post>>, AppError> {
        let gateway = self.gateway.clone();
        let limit = self.config.recent_posts_limit;
        self.cache
            .query(
                QueryKey::recent_posts(),
                move || {
                    let gateway = gateway.clone();
                    async move { gateway.recent_posts(limit).await }
                },
                self.options(),
            )
            .await
    }

    pub async fn post(&self, post_id: &str) -> Result<Arc<Post>, AppError> {
        let gateway = self.gateway.clone();
        let id = post_id.to_string();
        self.cache
            .query(
                QueryKey::post_by_id(post_id),
                move || {
                    let gateway = gateway.clone();
                    let id = id.clone();
                    async move { gateway.get_post(&id).await }
                },
                self.options(),
            )
            .await
    }

    /// Infinite feed, first page loaded
    pub async fn feed(&self) -> Result<Arc<Pages<Post>>, AppError> {
        let gateway = self.gateway.clone();
        let page_size = self.config.page_size;
        self.cache
            .paginated_query(
                QueryKey::infinite_posts(),
                move |cursor: Option<String>| {
                    let gateway = gateway.clone();
                    async move { gateway.list_posts(cursor.as_deref(), page_size).await }
                },
                self.options(),
            )
            .await
    }

    /// Load one more page of the infinite feed
    pub async fn feed_next_page(&self) -> Result<Arc<Pages<Post>>, AppError> {
        let gateway = self.gateway.clone();
        let page_size = self.config.page_size;
        self.cache
            .fetch_next_page(&QueryKey::infinite_posts(), move |cursor: String| async move {
                gateway.list_posts(Some(&cursor), page_size).await
            })
            .await
    }

    /// Uncached walk over every feed page
    pub fn feed_pages(&self) -> impl Stream<Item = Result<Vec<Post>, AppError>> + use<> {
        let gateway = self.gateway.clone();
        let page_size = self.config.page_size;
        page_stream(move |cursor: Option<String>| {
            let gateway = gateway.clone();
            async move { gateway.list_posts(cursor.as_deref(), page_size).await }
        })
    }

    /// Posts whose caption matches `term`
    ///
    /// A blank term yields no posts without querying.
    pub async fn search(&self, term: &str) -> Result<Arc<Vec<Post>>, AppError> {
        let term = term.trim().to_string();
        if term.is_empty() {
            return Ok(Arc::new(Vec::new()));
        }

        let gateway = self.gateway.clone();
        let key = QueryKey::search_posts(&term);
        self.cache
            .query(
                key,
                move || {
                    let gateway = gateway.clone();
                    let term = term.clone();
                    async move { gateway.search_posts(&term).await }
                },
                self.options(),
            )
            .await
    }

    pub async fn user_posts(&self, user_id: &str) -> Result<Arc<Vec<Post>>, AppError> {
        let gateway = self.gateway.clone();
        let id = user_id.to_string();
        self.cache
            .query(
                QueryKey::user_posts(user_id),
                move || {
                    let gateway = gateway.clone();
                    let id = id.clone();
                    async move { gateway.user_posts(&id).await }
                },
                self.options(),
            )
            .await
    }

    /// Posts saved by the signed-in user
    pub async fn saved_posts(&self) -> Result<Arc<Vec<SavedPostDetail>>, AppError> {
        let user = self.session.require_user()?;
        let gateway = self.gateway.clone();
        let user_id = user.id.clone();
        self.cache
            .query(
                QueryKey::saved_posts(&user.id),
                move || {
                    let gateway = gateway.clone();
                    let user_id = user_id.clone();
                    async move { gateway.saved_posts(&user_id).await }
                },
                self.options(),
            )
            .await
    }

    /// Save record of the signed-in user for `post_id`, if saved
    pub async fn saved_record(&self, post_id: &str) -> Result<Option<SavedPost>, AppError> {
        let saved = self.saved_posts().await?;
        Ok(saved
            .iter()
            .find(|detail| detail.record.post == post_id)
            .map(|detail| detail.record.clone()))
    }

    /// Random sample of the feed pages loaded so far
    pub async fn featured(&self, seed: u64) -> Vec<Post> {
        let Some(pages) = self
            .cache
            .get_data::<Pages<Post>>(&QueryKey::infinite_posts())
            .await
        else {
            return Vec::new();
        };
        let loaded: Vec<Post> = pages.items().cloned().collect();
        sample_featured(&loaded, self.config.featured_count, seed)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn create(&self, form: &NewPost) -> Result<Post, AppError> {
        validate_new_post(form)?;
        self.cache
            .mutate(
                self.gateway.create_post(form),
                &[
                    QueryKey::recent_posts(),
                    QueryKey::infinite_posts(),
                    QueryKey::user_posts(&form.creator),
                ],
            )
            .await
    }

    pub async fn update(&self, form: &UpdatePost) -> Result<Post, AppError> {
        validate_post_update(form)?;
        self.cache
            .mutate_with(self.gateway.update_post(form), |post| {
                vec![
                    QueryKey::post_by_id(&post.id),
                    QueryKey::recent_posts(),
                    QueryKey::infinite_posts(),
                ]
            })
            .await
    }

    /// Delete a post and its media
    pub async fn delete(&self, post: &Post) -> Result<(), AppError> {
        self.cache
            .mutate(
                self.gateway.delete_post(&post.id, &post.image_id),
                &[
                    QueryKey::post_by_id(&post.id),
                    QueryKey::recent_posts(),
                    QueryKey::infinite_posts(),
                    QueryKey::user_posts(&post.creator),
                ],
            )
            .await
    }

    /// Like the post if the signed-in user has not, unlike it otherwise
    pub async fn toggle_like(&self, post: &Post) -> Result<Post, AppError> {
        let user = self.session.require_user()?;
        self.write_likes(&post.id, post.likes_toggled(&user.id)).await
    }

    /// Like the post; liking twice leaves one like
    pub async fn ensure_liked(&self, post: &Post) -> Result<Post, AppError> {
        let user = self.session.require_user()?;
        self.write_likes(&post.id, post.likes_ensured(&user.id)).await
    }

    async fn write_likes(&self, post_id: &str, likes: Vec<String>) -> Result<Post, AppError> {
        self.cache
            .mutate_with(self.gateway.like_post(post_id, &likes), |post| {
                vec![
                    QueryKey::post_by_id(&post.id),
                    QueryKey::recent_posts(),
                    QueryKey::infinite_posts(),
                    QueryKey::current_user(),
                ]
            })
            .await
    }

    pub async fn save(&self, post_id: &str) -> Result<SavedPost, AppError> {
        let user = self.session.require_user()?;
        self.cache
            .mutate(
                self.gateway.save_post(&user.id, post_id),
                &save_invalidations(&user.id),
            )
            .await
    }

    /// Delete a save record
    pub async fn unsave(&self, record_id: &str) -> Result<(), AppError> {
        let user = self.session.require_user()?;
        self.cache
            .mutate(
                self.gateway.unsave_post(record_id),
                &save_invalidations(&user.id),
            )
            .await
    }

    fn options(&self) -> QueryOptions {
        QueryOptions {
            stale_time: self.config.stale_time(),
            refetch: false,
        }
    }
}

fn save_invalidations(user_id: &str) -> [QueryKey; 4] {
    [
        QueryKey::recent_posts(),
        QueryKey::infinite_posts(),
        QueryKey::current_user(),
        QueryKey::saved_posts(user_id),
    ]
}
