//! Query identifiers
//!
//! A `QueryKey` is an operation tag plus an ordered parameter list. Two keys
//! are equal when both parts are equal, which decides cache hits and
//! invalidation matches.

use std::fmt;

/// Logical read operations served through the query cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKind {
    CurrentUser,
    Users,
    UserById,
    UserPosts,
    PostById,
    RecentPosts,
    InfinitePosts,
    SearchPosts,
    SavedPosts,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentUser => "current_user",
            Self::Users => "users",
            Self::UserById => "user_by_id",
            Self::UserPosts => "user_posts",
            Self::PostById => "post_by_id",
            Self::RecentPosts => "recent_posts",
            Self::InfinitePosts => "infinite_posts",
            Self::SearchPosts => "search_posts",
            Self::SavedPosts => "saved_posts",
        }
    }
}

/// Structural cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    kind: QueryKind,
    params: Vec<String>,
}

impl QueryKey {
    pub fn new(kind: QueryKind, params: Vec<String>) -> Self {
        Self { kind, params }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn current_user() -> Self {
        Self::new(QueryKind::CurrentUser, Vec::new())
    }

    pub fn users() -> Self {
        Self::new(QueryKind::Users, Vec::new())
    }

    pub fn user_by_id(user_id: &str) -> Self {
        Self::new(QueryKind::UserById, vec![user_id.to_string()])
    }

    pub fn user_posts(user_id: &str) -> Self {
        Self::new(QueryKind::UserPosts, vec![user_id.to_string()])
    }

    pub fn post_by_id(post_id: &str) -> Self {
        Self::new(QueryKind::PostById, vec![post_id.to_string()])
    }

    pub fn recent_posts() -> Self {
        Self::new(QueryKind::RecentPosts, Vec::new())
    }

    pub fn infinite_posts() -> Self {
        Self::new(QueryKind::InfinitePosts, Vec::new())
    }

    pub fn search_posts(term: &str) -> Self {
        Self::new(QueryKind::SearchPosts, vec![term.to_string()])
    }

    pub fn saved_posts(user_id: &str) -> Self {
        Self::new(QueryKind::SavedPosts, vec![user_id.to_string()])
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if !self.params.is_empty() {
            write!(f, "[{}]", self.params.join(", "))?;
        }
        Ok(())
    }
}
