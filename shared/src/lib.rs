//! Shared types for the dispatch service
//!
//! Common types used by the dispatch server and its clients: domain models,
//! the courier real-time protocol, and the unified error system.

pub mod error;
pub mod message;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Courier protocol re-exports (for convenient access)
pub use message::{ClientEvent, OfferOutcome, OrderOffer, ServerEvent};
