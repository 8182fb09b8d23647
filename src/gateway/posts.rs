//! Post and save operations

use futures::future::try_join_all;
use serde_json::json;

use super::{DocumentQuery, Gateway, call, model, models, object};
use crate::data::{NewPost, Post, SavedPost, SavedPostDetail, UpdatePost, parse_tags};
use crate::error::AppError;

impl Gateway {
    /// Upload the media and create the post
    ///
    /// The uploaded media is deleted if the post cannot be created.
    pub async fn create_post(&self, new_post: &NewPost) -> Result<Post, AppError> {
        let media = self.upload_media(&new_post.file).await?;

        let data = object(json!({
            "creator": new_post.creator,
            "caption": new_post.caption,
            "imageUrl": media.preview_url,
            "imageId": media.id,
            "location": new_post.location,
            "tags": parse_tags(&new_post.tags),
        }));

        match call(
            "create_post",
            self.backend.create_document(&self.collections.posts, data),
        )
        .await
        {
            Ok(document) => {
                tracing::info!(post_id = %document.id, creator = %new_post.creator, "Created post");
                model("create_post", document)
            }
            Err(error) => {
                self.compensate_upload(&media.id).await;
                Err(error)
            }
        }
    }

    /// Edit a post, replacing its media if a file is given
    ///
    /// A replacement file is deleted again if the update fails; the previous
    /// media is deleted once the update succeeds.
    pub async fn update_post(&self, update: &UpdatePost) -> Result<Post, AppError> {
        let replacement = match &update.file {
            Some(file) => Some(self.upload_media(file).await?),
            None => None,
        };

        let (image_url, image_id) = match &replacement {
            Some(media) => (media.preview_url.as_str(), media.id.as_str()),
            None => (update.image_url.as_str(), update.image_id.as_str()),
        };
        let data = object(json!({
            "caption": update.caption,
            "imageUrl": image_url,
            "imageId": image_id,
            "location": update.location,
            "tags": parse_tags(&update.tags),
        }));

        let result = call(
            "update_post",
            self.backend
                .update_document(&self.collections.posts, &update.post_id, data),
        )
        .await;

        match result {
            Ok(document) => {
                if replacement.is_some() {
                    self.discard_media(&update.image_id).await;
                }
                model("update_post", document)
            }
            Err(error) => {
                if let Some(media) = &replacement {
                    self.compensate_upload(&media.id).await;
                }
                Err(error)
            }
        }
    }

    /// Delete a post, then its media
    ///
    /// Once the document is gone the mutation succeeds even if the media
    /// cannot be deleted.
    pub async fn delete_post(&self, post_id: &str, image_id: &str) -> Result<(), AppError> {
        call(
            "delete_post",
            self.backend
                .delete_document(&self.collections.posts, post_id),
        )
        .await?;
        tracing::info!(post_id, "Deleted post");
        self.discard_media(image_id).await;
        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post, AppError> {
        let document = call(
            "get_post",
            self.backend.get_document(&self.collections.posts, post_id),
        )
        .await?;
        model("get_post", document)
    }

    /// Newest posts by creation time
    pub async fn recent_posts(&self, limit: usize) -> Result<Vec<Post>, AppError> {
        let query = DocumentQuery::new().order_desc("$createdAt").limit(limit);
        self.query_posts("recent_posts", &query).await
    }

    /// One page of posts ordered by last update, after `cursor`
    pub async fn list_posts(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<Post>, AppError> {
        let query = DocumentQuery::new()
            .order_desc("$updatedAt")
            .limit(page_size)
            .cursor_after(cursor);
        self.query_posts("list_posts", &query).await
    }

    /// Posts whose caption matches `term`
    pub async fn search_posts(&self, term: &str) -> Result<Vec<Post>, AppError> {
        let query = DocumentQuery::new().search("caption", term);
        self.query_posts("search_posts", &query).await
    }

    /// Posts of one creator, newest first
    pub async fn user_posts(&self, user_id: &str) -> Result<Vec<Post>, AppError> {
        let query = DocumentQuery::new()
            .equal("creator", user_id)
            .order_desc("$createdAt");
        self.query_posts("user_posts", &query).await
    }

    /// Replace the like list of a post
    pub async fn like_post(&self, post_id: &str, likes: &[String]) -> Result<Post, AppError> {
        let data = object(json!({ "likes": likes }));
        let document = call(
            "like_post",
            self.backend
                .update_document(&self.collections.posts, post_id, data),
        )
        .await?;
        model("like_post", document)
    }

    pub async fn save_post(&self, user_id: &str, post_id: &str) -> Result<SavedPost, AppError> {
        let data = object(json!({ "user": user_id, "post": post_id }));
        let document = call(
            "save_post",
            self.backend.create_document(&self.collections.saves, data),
        )
        .await?;
        model("save_post", document)
    }

    /// Delete a save record
    pub async fn unsave_post(&self, record_id: &str) -> Result<(), AppError> {
        call(
            "unsave_post",
            self.backend
                .delete_document(&self.collections.saves, record_id),
        )
        .await
    }

    /// Save records of a user joined with their posts
    ///
    /// Records pointing at deleted posts are skipped.
    pub async fn saved_posts(&self, user_id: &str) -> Result<Vec<SavedPostDetail>, AppError> {
        let query = DocumentQuery::new()
            .equal("user", user_id)
            .order_desc("$createdAt");
        let list = call(
            "saved_posts",
            self.backend.list_documents(&self.collections.saves, &query),
        )
        .await?;
        let records: Vec<SavedPost> = models("saved_posts", list)?;

        let details = try_join_all(records.into_iter().map(|record| async move {
            match self.get_post(&record.post).await {
                Ok(post) => Ok(Some(SavedPostDetail { record, post })),
                Err(AppError::NotFound(_)) => {
                    tracing::debug!(record_id = %record.id, post_id = %record.post, "Skipping save of deleted post");
                    Ok(None)
                }
                Err(error) => Err(error),
            }
        }))
        .await?;

        Ok(details.into_iter().flatten().collect())
    }

    async fn query_posts(
        &self,
        operation: &'static str,
        query: &DocumentQuery,
    ) -> Result<Vec<Post>, AppError> {
        let list = call(
            operation,
            self.backend.list_documents(&self.collections.posts, query),
        )
        .await?;
        models(operation, list)
    }
}
