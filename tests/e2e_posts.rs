//! E2E tests for post creation, feed browsing, likes, and saves

mod common;

use std::collections::HashSet;

use common::{TestClient, new_post, photo};
use futures::StreamExt;
use snapgram::data::{QueryKey, UpdatePost};
use snapgram::error::AppError;
use snapgram::storage::MediaKind;

#[tokio::test]
async fn test_caption_length_boundary() {
    let client = TestClient::new().await;
    let user = client.sign_up_and_in("ann").await;

    let error = client
        .state
        .posts
        .create(&new_post(&user.id, "four"))
        .await
        .unwrap_err();
    assert_eq!(error.field(), Some("caption"));
    assert_eq!(client.backend.file_count().await, 0);

    let post = client
        .state
        .posts
        .create(&new_post(&user.id, "fiver"))
        .await
        .unwrap();
    assert_eq!(post.caption, "fiver");
    assert_eq!(post.tags, vec!["travel", "sea"]);
    assert_eq!(post.creator, user.id);
}

#[tokio::test]
async fn test_failed_preview_leaves_no_orphaned_media() {
    let client = TestClient::new().await;
    let user = client.sign_up_and_in("ann").await;
    client.backend.fail_next("file_preview_url").await;

    let error = client
        .state
        .posts
        .create(&new_post(&user.id, "a quiet morning"))
        .await
        .unwrap_err();

    assert!(matches!(error, AppError::Remote { operation: "media_preview", .. }));
    assert_eq!(client.backend.file_count().await, 0);
    assert_eq!(client.backend.document_count("posts").await, 0);
}

#[tokio::test]
async fn test_failed_document_write_deletes_uploaded_media() {
    let client = TestClient::new().await;
    let user = client.sign_up_and_in("ann").await;
    client.backend.fail_next("create_document").await;

    let result = client
        .state
        .posts
        .create(&new_post(&user.id, "a quiet morning"))
        .await;

    assert!(result.is_err());
    assert_eq!(client.backend.file_count().await, 0);
}

#[tokio::test]
async fn test_like_toggle_and_ensure() {
    let client = TestClient::new().await;
    let user = client.sign_up_and_in("ann").await;
    let post = client.create_post("city lights at dusk").await;

    let liked = client.state.posts.toggle_like(&post).await.unwrap();
    assert_eq!(liked.likes, vec![user.id.clone()]);

    let unliked = client.state.posts.toggle_like(&liked).await.unwrap();
    assert!(unliked.likes.is_empty());

    let once = client.state.posts.ensure_liked(&unliked).await.unwrap();
    let twice = client.state.posts.ensure_liked(&once).await.unwrap();
    assert_eq!(twice.likes.iter().filter(|id| **id == user.id).count(), 1);
}

#[tokio::test]
async fn test_failed_like_keeps_cached_post() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    let post = client.create_post("city lights at dusk").await;

    let cached = client.state.posts.post(&post.id).await.unwrap();
    let before = client
        .state
        .cache
        .state(&QueryKey::post_by_id(&post.id))
        .await
        .unwrap();

    client.backend.fail_next("update_document").await;
    assert!(client.state.posts.toggle_like(&cached).await.is_err());

    let after = client
        .state
        .cache
        .state(&QueryKey::post_by_id(&post.id))
        .await
        .unwrap();
    assert!(!after.is_stale);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(client.state.posts.post(&post.id).await.unwrap().likes.is_empty());
}

#[tokio::test]
async fn test_like_invalidates_cached_post() {
    let client = TestClient::new().await;
    let user = client.sign_up_and_in("ann").await;
    let post = client.create_post("city lights at dusk").await;

    let cached = client.state.posts.post(&post.id).await.unwrap();
    client.state.posts.toggle_like(&cached).await.unwrap();

    let refreshed = client.state.posts.post(&post.id).await.unwrap();
    assert!(refreshed.is_liked_by(&user.id));
}

#[tokio::test]
async fn test_feed_pagination_has_no_duplicates() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    for index in 0..20 {
        client.create_post(&format!("post number {index}")).await;
    }

    let mut pages = client.state.posts.feed().await.unwrap();
    assert_eq!(pages.pages()[0].len(), 9);
    while pages.has_next_page() {
        pages = client.state.posts.feed_next_page().await.unwrap();
    }

    let ids: Vec<&str> = pages.items().map(|post| post.id.as_str()).collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 20);
    assert_eq!(unique.len(), 20);
    assert!(pages.pages().last().unwrap().is_empty());

    // newest update first
    let newest = &pages.pages()[0][0];
    assert_eq!(newest.caption, "post number 19");
}

#[tokio::test]
async fn test_next_page_after_new_post_reloads_feed() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    for index in 0..12 {
        client.create_post(&format!("post number {index}")).await;
    }
    client.state.posts.feed().await.unwrap();

    client.create_post("brand new post").await;
    let pages = client.state.posts.feed_next_page().await.unwrap();
    assert_eq!(pages.pages().len(), 1);
    assert_eq!(pages.pages()[0][0].caption, "brand new post");

    let pages = client.state.posts.feed().await.unwrap();
    assert_eq!(pages.pages()[0][0].caption, "brand new post");
}

#[tokio::test]
async fn test_feed_stream_walks_all_pages() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    for index in 0..10 {
        client.create_post(&format!("post number {index}")).await;
    }

    let sizes: Vec<usize> = client
        .state
        .posts
        .feed_pages()
        .map(|page| page.unwrap().len())
        .collect()
        .await;
    assert_eq!(sizes, vec![9, 1, 0]);
}

#[tokio::test]
async fn test_concurrent_feed_queries_share_one_fetch() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    client.create_post("a single post").await;

    let posts = &client.state.posts;
    let (a, b, c) = tokio::join!(posts.feed(), posts.feed(), posts.feed());
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert!(std::sync::Arc::ptr_eq(&b, &c));
}

#[tokio::test]
async fn test_new_post_invalidates_recent_posts() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    client.create_post("the first one").await;
    assert_eq!(client.state.posts.recent().await.unwrap().len(), 1);

    client.create_post("the second one").await;
    let recent = client.state.posts.recent().await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].caption, "the second one");
}

#[tokio::test]
async fn test_blank_search_skips_backend() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    client.create_post("Sunset over the harbor").await;
    client.create_post("Morning coffee").await;

    assert!(client.state.posts.search("   ").await.unwrap().is_empty());
    assert!(client.state.cache.state(&QueryKey::search_posts("")).await.is_none());

    let found = client.state.posts.search("sunset").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].caption, "Sunset over the harbor");
}

#[tokio::test]
async fn test_save_and_unsave() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    let kept = client.create_post("worth keeping").await;
    let dropped = client.create_post("deleted later").await;

    client.state.posts.save(&kept.id).await.unwrap();
    client.state.posts.save(&dropped.id).await.unwrap();
    client.state.posts.delete(&dropped).await.unwrap();

    let saved = client.state.posts.saved_posts().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].post.id, kept.id);

    let record = client.state.posts.saved_record(&kept.id).await.unwrap().unwrap();
    client.state.posts.unsave(&record.id).await.unwrap();
    assert!(client.state.posts.saved_record(&kept.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_post_removes_media() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    let post = client.create_post("short lived").await;
    assert_eq!(client.backend.file_count().await, 1);

    client.state.posts.delete(&post).await.unwrap();

    assert_eq!(client.backend.file_count().await, 0);
    let error = client.state.posts.post(&post.id).await.unwrap_err();
    assert!(matches!(error, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_update_post_replaces_media() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    let post = client.create_post("first version").await;

    let updated = client
        .state
        .posts
        .update(&UpdatePost {
            post_id: post.id.clone(),
            caption: "second version".to_string(),
            location: post.location.clone(),
            tags: "edited".to_string(),
            image_id: post.image_id.clone(),
            image_url: post.image_url.clone(),
            file: Some(photo()),
        })
        .await
        .unwrap();

    assert_ne!(updated.image_id, post.image_id);
    assert_eq!(updated.tags, vec!["edited"]);
    assert_eq!(client.backend.file_count().await, 1);
    assert_eq!(
        client.state.gateway.media_kind(&updated.image_id).await.unwrap(),
        MediaKind::Image
    );
}

#[tokio::test]
async fn test_featured_sample_is_seeded() {
    let client = TestClient::new().await;
    client.sign_up_and_in("ann").await;
    assert!(client.state.posts.featured(1).await.is_empty());

    for index in 0..6 {
        client.create_post(&format!("post number {index}")).await;
    }
    client.state.posts.feed().await.unwrap();

    let first = client.state.posts.featured(42).await;
    let again = client.state.posts.featured(42).await;
    assert_eq!(first.len(), 2);
    assert_eq!(first, again);
}

#[tokio::test]
async fn test_user_posts_and_profile_update() {
    let client = TestClient::new().await;
    let user = client.sign_up_and_in("ann").await;
    client.create_post("mine only").await;

    let posts = client.state.posts.user_posts(&user.id).await.unwrap();
    assert_eq!(posts.len(), 1);

    let updated = client
        .state
        .users
        .update_profile(
            &user,
            &snapgram::data::ProfileForm {
                name: "Ann Lee".to_string(),
                username: user.username.clone(),
                email: user.email.clone(),
                bio: "photographer".to_string(),
                file: Some(photo()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.bio, "photographer");
    assert!(updated.image_id.is_some());

    let fetched = client.state.users.user(&user.id).await.unwrap();
    assert_eq!(fetched.name, "Ann Lee");

    let users = client.state.users.users().await.unwrap();
    assert_eq!(users.len(), 1);
}
