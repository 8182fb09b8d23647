//! Media storage module
//!
//! Handles:
//! - Media kind classification from probed content types
//! - Upload construction from local files

mod media;

pub use media::{MediaKind, content_type_for};
