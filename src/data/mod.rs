//! Data layer module
//!
//! Handles everything the client keeps about remote data:
//! - Backend record models
//! - Query keys and the query cache (volatile)
//! - Cursor pagination

mod cache;
mod keys;
mod models;
mod pagination;

pub use cache::{QueryCache, QueryOptions, QueryState, QueryStatus, QuerySubscription};
pub use keys::{QueryKey, QueryKind};
pub use models::*;
pub use pagination::{Identified, Pages, page_stream};
