//! Service layer
//!
//! Queries and mutations over the gateway, bound to query cache keys.
//! Mutations declare the queries they invalidate.

mod account;
pub mod feed;
mod post;

pub use account::UserService;
pub use feed::{format_date_time, relative_time, sample_featured};
pub use post::PostService;
