//! In-memory [`CardStore`] and [`CardSource`] implementations.
//!
//! Used by the unit tests of this workspace and by the server's router tests.
//! `MemoryStore` mirrors the PostgreSQL gateway: upserts replace all children,
//! timestamps are assigned by the store, and reads never return image bytes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

use crate::error::AppError;
use crate::models::{Card, DatasetRecord, ImagePayload};
use crate::traits::{CardSource, CardStore};

#[derive(Default)]
struct StoreState {
    cards: BTreeMap<i64, Card>,
    failing: HashSet<i64>,
    unavailable: bool,
    last_tick: Option<DateTime<Utc>>,
    upserts: Vec<i64>,
}

impl StoreState {
    /// Strictly increasing server clock with PostgreSQL's microsecond resolution.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let next = match self.last_tick {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last_tick = Some(next);
        next
    }
}

/// Card store backed by a `BTreeMap`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every upsert of `id` fail.
    pub fn fail_upsert(&self, id: i64) {
        self.lock().failing.insert(id);
    }

    /// Makes every operation fail, as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Overrides the server timestamps of a stored card.
    pub fn set_timestamps(&self, id: i64, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
        if let Some(card) = self.lock().cards.get_mut(&id) {
            card.created_at = Some(created_at);
            card.updated_at = Some(updated_at);
        }
    }

    /// The stored record including image bytes.
    pub fn raw(&self, id: i64) -> Option<Card> {
        self.lock().cards.get(&id).cloned()
    }

    /// Ids passed to successful upserts, in call order.
    pub fn upsert_log(&self) -> Vec<i64> {
        self.lock().upserts.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(state: &StoreState) -> Result<(), AppError> {
        if state.unavailable {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

/// Drops image bytes the way the SQL read path does.
fn without_blobs(card: &Card) -> Card {
    let mut card = card.clone();
    for image in &mut card.card_images {
        image.image_data = None;
        image.image_small_data = None;
        image.image_cropped_data = None;
    }
    card
}

impl CardStore for MemoryStore {
    async fn upsert_card(&self, card: &Card) -> Result<(), AppError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        if state.failing.contains(&card.id) {
            return Err(AppError::Generic(format!(
                "simulated write failure for card {}",
                card.id
            )));
        }

        let now = state.tick();
        let created_at = state
            .cards
            .get(&card.id)
            .and_then(|existing| existing.created_at)
            .unwrap_or(now);

        let mut stored = card.clone();
        stored.created_at = Some(created_at);
        stored.updated_at = Some(now);
        for (i, set) in stored.card_sets.iter_mut().enumerate() {
            set.id = Some(i as i32 + 1);
            set.created_at = Some(now);
        }
        for (i, image) in stored.card_images.iter_mut().enumerate() {
            image.id = Some(i as i32 + 1);
            image.created_at = Some(now);
        }
        for (i, price) in stored.card_prices.iter_mut().enumerate() {
            price.id = Some(i as i32 + 1);
            price.created_at = Some(now);
            price.updated_at = Some(now);
        }

        state.cards.insert(card.id, stored);
        state.upserts.push(card.id);
        Ok(())
    }

    async fn get_card(&self, id: i64) -> Result<Option<Card>, AppError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.cards.get(&id).map(without_blobs))
    }

    async fn card_count(&self) -> Result<i64, AppError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.cards.len() as i64)
    }

    async fn all_cards(&self) -> Result<Vec<Card>, AppError> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state.cards.values().map(without_blobs).collect())
    }

    async fn cards_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<Card>, AppError> {
        let state = self.lock();
        Self::check_available(&state)?;
        let mut cards: Vec<Card> = state
            .cards
            .values()
            .filter(|c| c.updated_at > Some(since) || c.created_at > Some(since))
            .map(without_blobs)
            .collect();
        cards.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(cards)
    }
}

#[derive(Default)]
struct SourceState {
    records: Option<Vec<DatasetRecord>>,
    images: HashMap<String, ImagePayload>,
    failing_images: HashSet<String>,
    dataset_delay: Option<Duration>,
    dataset_requests: usize,
    image_requests: usize,
}

/// Upstream double serving a fixed dataset and a fixed set of images.
///
/// Unknown image URLs answer like a 404.
#[derive(Clone, Default)]
pub struct StaticSource {
    state: Arc<Mutex<SourceState>>,
}

impl StaticSource {
    pub fn with_cards(cards: Vec<Card>) -> Self {
        let source = Self::default();
        source.set_records(cards.into_iter().map(DatasetRecord::from).collect());
        source
    }

    /// A source whose dataset endpoint always fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the dataset, malformed entries included.
    pub fn set_records(&self, records: Vec<DatasetRecord>) {
        self.lock().records = Some(records);
    }

    pub fn add_image(&self, url: &str, data: &[u8], content_type: &str) {
        self.lock().images.insert(
            url.to_string(),
            ImagePayload {
                data: data.to_vec(),
                content_type: content_type.to_string(),
                size: data.len(),
            },
        );
    }

    pub fn fail_image(&self, url: &str) {
        self.lock().failing_images.insert(url.to_string());
    }

    /// Delays every dataset response, to keep a cycle in flight.
    pub fn set_dataset_delay(&self, delay: Duration) {
        self.lock().dataset_delay = Some(delay);
    }

    pub fn dataset_requests(&self) -> usize {
        self.lock().dataset_requests
    }

    pub fn image_requests(&self) -> usize {
        self.lock().image_requests
    }
}

impl CardSource for StaticSource {
    async fn fetch_dataset(&self, url: &str) -> Result<Vec<DatasetRecord>, AppError> {
        let (records, delay) = {
            let mut state = self.lock();
            state.dataset_requests += 1;
            (state.records.clone(), state.dataset_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        records.ok_or_else(|| AppError::ClientError(format!("HTTP 503 from {}", url)))
    }

    async fn fetch_image(&self, url: &str) -> Result<ImagePayload, AppError> {
        let mut state = self.lock();
        state.image_requests += 1;
        if state.failing_images.contains(url) {
            return Err(AppError::ClientError(format!("HTTP 500 from {}", url)));
        }
        state
            .images
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::ClientError(format!("HTTP 404 from {}", url)))
    }
}
