//! Duel DB - PostgreSQL persistence for the card mirror.
//!
//! [`CardRepository`] implements [`duel_core::CardStore`] with `sqlx`. The
//! schema ships as embedded migrations applied by [`migrate`].

pub mod repository;

pub use repository::{connect, migrate, CardRepository};
