//! Client synchronization protocol.
//!
//! A client presents the watermark it received on its previous call. An empty
//! watermark means a first-time client, which gets the full catalog; anything
//! else gets only the cards created or updated after that instant.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use tracing::info;

use crate::error::AppError;
use crate::models::SyncResponse;
use crate::traits::CardStore;

/// Naive layouts accepted in addition to RFC 3339; interpreted as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A bare date means midnight UTC.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a client watermark.
///
/// # Examples
///
/// ```
/// use duel_core::sync::parse_watermark;
///
/// let ts = parse_watermark("2024-05-01T10:00:00Z").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2024-05-01T10:00:00+00:00");
///
/// assert!(parse_watermark("last tuesday").is_err());
/// ```
pub fn parse_watermark(value: &str) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::InvalidTimestamp(value.to_string()))
}

/// Formats a watermark for the client. Microsecond precision matches the
/// resolution of the stored timestamps.
pub fn format_watermark(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Answers client sync requests from a [`CardStore`].
#[derive(Clone)]
pub struct SyncService<S> {
    store: S,
}

impl<S: CardStore> SyncService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a full snapshot for an empty `last_update`, a delta otherwise,
    /// together with a fresh watermark.
    ///
    /// The watermark is taken before reading, so a card committed while the
    /// read is in flight is sent again on the next call instead of being
    /// skipped.
    pub async fn sync_cards(&self, last_update: &str) -> Result<SyncResponse, AppError> {
        let watermark = Utc::now();

        let cards = if last_update.is_empty() {
            info!("New client detected, sending all cards");
            self.store.all_cards().await?
        } else {
            let since = parse_watermark(last_update)?;
            info!(
                "Existing client detected, sending cards updated after: {}",
                last_update
            );
            self.store.cards_updated_since(since).await?
        };

        info!("Returning {} cards to client", cards.len());

        Ok(SyncResponse {
            total_cards: cards.len(),
            cards,
            last_update: format_watermark(watermark),
        })
    }

    /// Number of persisted cards; doubles as a database liveness probe.
    pub async fn card_count(&self) -> Result<i64, AppError> {
        self.store.card_count().await
    }
}
