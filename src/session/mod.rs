//! Authoritative login state.

mod model;
mod store;

pub use model::{AuthTokens, Session, REFRESH_WINDOW_MS};
pub use store::SessionStore;
