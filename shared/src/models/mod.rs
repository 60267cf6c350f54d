//! Data models
//!
//! Shared between the dispatch server and its clients (via API and the
//! courier real-time channel). All IDs are opaque strings.

pub mod dispatch;
pub mod entity;
pub mod location;
pub mod order;
pub mod product;

// Re-exports
pub use dispatch::*;
pub use entity::*;
pub use location::*;
pub use order::*;
pub use product::*;
