//! Duel Client - HTTP client for the upstream card API
//!
//! [`CardApiClient`] implements [`duel_core::CardSource`]: it downloads the
//! card dataset and the card images referenced by it.

pub mod api;

pub use api::{resolve_content_type, CardApiClient};
