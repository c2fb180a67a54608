//! Storage and upstream seams.
//!
//! The refresh pipeline and the sync service are generic over these traits so
//! they can run against PostgreSQL and the real card API in production and
//! against the in-memory doubles in [`crate::testing`] in tests.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{Card, DatasetRecord, ImagePayload};

/// Transactional persistence of the card graph.
pub trait CardStore: Clone + Send + Sync + 'static {
    /// Inserts or updates a card and replaces all of its child rows, atomically.
    fn upsert_card(&self, card: &Card) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Loads one card with its children. `Ok(None)` when no such card exists.
    fn get_card(&self, id: i64) -> impl Future<Output = Result<Option<Card>, AppError>> + Send;

    /// Number of persisted cards.
    fn card_count(&self) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Every card with its children, ordered by id.
    fn all_cards(&self) -> impl Future<Output = Result<Vec<Card>, AppError>> + Send;

    /// Cards created or updated strictly after `since`, most recently updated first.
    fn cards_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Card>, AppError>> + Send;
}

/// Upstream card dataset and image host.
pub trait CardSource: Clone + Send + Sync + 'static {
    /// Downloads the full card list from `url`, in upstream order.
    ///
    /// The request itself failing is an `Err`; entries that cannot be decoded
    /// come back as [`DatasetRecord::Malformed`] alongside the good ones.
    fn fetch_dataset(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Vec<DatasetRecord>, AppError>> + Send;

    /// Downloads one image.
    fn fetch_image(&self, url: &str) -> impl Future<Output = Result<ImagePayload, AppError>> + Send;
}
