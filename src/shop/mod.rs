//! Shop-specific repositories built on the generic sync core.

pub mod account;
pub mod api_types;
pub mod cache;
pub mod client;
pub mod lists;
pub mod profile;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use account::AccountRepository;
pub use client::{HttpClient, ShopApi};
pub use lists::PagedRepository;
pub use profile::ProfileRepository;
