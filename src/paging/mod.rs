//! Paged list loading for list screens.

mod loader;
mod state;

pub use loader::{ListLoader, Settle};
pub use state::{LoadMoreState, PageState, UiState};
