//! Full-catalog refresh: fetch the upstream dataset, download card images and
//! upsert every card.
//!
//! Only a failure to obtain the dataset ends a cycle. Image failures are logged
//! and leave the image's binary fields empty; an entry that cannot be decoded or
//! a card that cannot be persisted is recorded in the [`RefreshReport`] and the
//! cycle moves on to the next one.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RefreshConfig;
use crate::error::AppError;
use crate::models::{Card, DatasetRecord, ImagePayload};
use crate::traits::{CardSource, CardStore};

/// Outcome of processing a single card during a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardOutcome {
    /// Card and its children were committed
    Stored,
    /// The upsert failed; the previous version of the card (if any) is untouched
    Failed,
}

/// Counters for one refresh cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshStats {
    pub stored: usize,
    pub failed: usize,
    pub image_failures: usize,
}

impl RefreshStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: CardOutcome) {
        match outcome {
            CardOutcome::Stored => self.stored += 1,
            CardOutcome::Failed => self.failed += 1,
        }
    }

    /// Returns the number of cards processed so far.
    pub fn total(&self) -> usize {
        self.stored + self.failed
    }
}

/// Result of processing one card.
#[derive(Debug)]
pub struct ProcessedCard {
    pub card_id: i64,
    pub image_failures: usize,
    pub result: Result<(), AppError>,
}

impl ProcessedCard {
    pub fn outcome(&self) -> CardOutcome {
        if self.result.is_ok() {
            CardOutcome::Stored
        } else {
            CardOutcome::Failed
        }
    }
}

/// Summary of a completed refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Cards returned by the upstream dataset.
    pub fetched: usize,
    pub stats: RefreshStats,
    /// `(card id, error message)` for every card that could not be persisted.
    pub failures: Vec<(i64, String)>,
    /// `(position in the dataset, error message)` for every entry that could
    /// not be decoded into a card.
    pub malformed: Vec<(usize, String)>,
}

impl RefreshReport {
    pub fn new(fetched: usize) -> Self {
        Self {
            fetched,
            ..Default::default()
        }
    }

    /// Folds one processed card into the report.
    pub fn record(&mut self, processed: ProcessedCard) {
        self.stats.record(processed.outcome());
        self.stats.image_failures += processed.image_failures;
        if let Err(e) = processed.result {
            self.failures.push((processed.card_id, e.to_string()));
        }
    }

    /// Records an upstream entry that could not be decoded.
    pub fn record_malformed(&mut self, position: usize, error: String) {
        self.stats.record(CardOutcome::Failed);
        self.malformed.push((position, error));
    }

    /// Ids of the cards that failed to persist, in processing order.
    pub fn failed_ids(&self) -> Vec<i64> {
        self.failures.iter().map(|(id, _)| *id).collect()
    }

    /// True when every fetched card was stored.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.malformed.is_empty() && self.stats.stored == self.fetched
    }
}

/// Fetch-transform-persist pipeline for the whole catalog.
///
/// Cycles are single-flight: while one is running, [`RefreshPipeline::refresh_all`]
/// returns [`AppError::RefreshInProgress`] instead of starting a second one.
///
/// # Examples
///
/// ```
/// use duel_core::config::RefreshConfig;
/// use duel_core::refresh::RefreshPipeline;
/// use duel_core::testing::{MemoryStore, StaticSource};
/// use duel_core::Card;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let source = StaticSource::with_cards(vec![Card { id: 1, name: "Kuriboh".into(), ..Default::default() }]);
/// let store = MemoryStore::new();
/// let config = RefreshConfig { api_url: Some("https://cards.example.com".into()), ..Default::default() };
///
/// let pipeline = RefreshPipeline::new(store.clone(), source, config);
/// let report = pipeline.refresh_all().await.unwrap();
/// assert_eq!(report.stats.stored, 1);
/// # }
/// ```
#[derive(Clone)]
pub struct RefreshPipeline<S, F> {
    store: S,
    source: F,
    config: RefreshConfig,
    running: Arc<Mutex<()>>,
}

impl<S: CardStore, F: CardSource> RefreshPipeline<S, F> {
    pub fn new(store: S, source: F, config: RefreshConfig) -> Self {
        Self {
            store,
            source,
            config,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one refresh cycle over the entire upstream catalog.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if no upstream URL is configured,
    /// `AppError::RefreshInProgress` if another cycle holds the guard, and the
    /// fetch error if the dataset cannot be downloaded. Per-card failures are
    /// reported in the returned [`RefreshReport`], never as an `Err`.
    pub async fn refresh_all(&self) -> Result<RefreshReport, AppError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| AppError::RefreshInProgress)?;

        let api_url = self
            .config
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                AppError::ConfigError("API environment variable is not set".to_string())
            })?;

        info!("Fetching cards from API: {}", api_url);
        let mut records = self.source.fetch_dataset(api_url).await?;
        let total = records.len();
        info!("Found {} cards to process", total);

        let batch_size = self.config.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);
        let mut report = RefreshReport::new(total);

        for (index, batch) in records.chunks_mut(batch_size).enumerate() {
            let start = index * batch_size;
            info!(
                "Processing batch {}-{} of {} cards",
                start + 1,
                start + batch.len(),
                total
            );

            for (offset, record) in batch.iter_mut().enumerate() {
                let card = match record {
                    DatasetRecord::Card(card) => card,
                    DatasetRecord::Malformed { id, error } => {
                        error!(
                            "Skipping malformed entry {} (id {}): {}",
                            start + offset + 1,
                            id.as_deref().unwrap_or("missing"),
                            error
                        );
                        report.record_malformed(start + offset, error.clone());
                        continue;
                    }
                };

                let processed = self.process_card(card).await;
                match &processed.result {
                    Ok(()) => debug!("Stored card {} ({})", card.id, card.name),
                    Err(e) => error!("Error processing card {} ({}): {}", card.id, card.name, e),
                }
                report.record(processed);
            }

            if index + 1 < batch_count {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        info!(
            "Refresh complete: {} stored, {} failed ({} malformed), {} image downloads failed out of {} cards",
            report.stats.stored,
            report.stats.failed,
            report.malformed.len(),
            report.stats.image_failures,
            total
        );

        Ok(report)
    }

    /// Downloads the images of one card on a best-effort basis, then persists it.
    pub async fn process_card(&self, card: &mut Card) -> ProcessedCard {
        let card_id = card.id;
        let mut image_failures = 0;

        for image in card.card_images.iter_mut() {
            if let Some(payload) = self
                .download(card_id, "main", &image.image_url, &mut image_failures)
                .await
            {
                image.file_size = i32::try_from(payload.size).ok();
                image.content_type = Some(payload.content_type);
                image.image_data = Some(payload.data);
            }

            if let Some(payload) = self
                .download(card_id, "small", &image.image_url_small, &mut image_failures)
                .await
            {
                image.image_small_data = Some(payload.data);
            }

            if let Some(payload) = self
                .download(card_id, "cropped", &image.image_url_cropped, &mut image_failures)
                .await
            {
                image.image_cropped_data = Some(payload.data);
            }
        }

        let result = self.store.upsert_card(card).await;

        ProcessedCard {
            card_id,
            image_failures,
            result,
        }
    }

    async fn download(
        &self,
        card_id: i64,
        variant: &str,
        url: &str,
        failures: &mut usize,
    ) -> Option<ImagePayload> {
        if url.is_empty() {
            return None;
        }

        match self.source.fetch_image(url).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(
                    "Failed to download {} image for card {} from {}: {}",
                    variant, card_id, url, e
                );
                *failures += 1;
                None
            }
        }
    }
}
