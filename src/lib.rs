//! Offline-first repository sync core of the shop client.
//!
//! - [`session::SessionStore`]: single authoritative login state
//! - [`cache::CacheLayer`]: cached-then-network reads and cache writes
//! - [`identity::IdentityResolver`] and [`optimistic::OptimisticWriter`]:
//!   optimistic writes keyed through an identity fallback chain
//! - [`paging::ListLoader`]: paged list state for list screens

pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod kv;
pub mod logging;
pub mod optimistic;
pub mod paging;
pub mod resource;
pub mod session;
pub mod shop;

pub use error::{SyncError, SyncResult};
pub use resource::Resource;
