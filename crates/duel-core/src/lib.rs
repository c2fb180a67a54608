//! Duel Core - card models, error handling, configuration, the refresh
//! pipeline, the refresh scheduler and the client sync protocol.

pub mod config;
pub mod error;
pub mod models;
pub mod refresh;
pub mod scheduler;
pub mod sync;
pub mod testing;
pub mod traits;

pub use config::{DbConfig, HttpConfig, RefreshConfig, SchedulerConfig};
pub use error::AppError;
pub use models::{
    Card, CardImage, CardPrice, CardSet, Dataset, DatasetRecord, HealthStatus, ImagePayload,
    SyncRequest, SyncResponse,
};
pub use refresh::{CardOutcome, RefreshPipeline, RefreshReport, RefreshStats};
pub use scheduler::{Scheduler, SchedulerState};
pub use sync::SyncService;
pub use traits::{CardSource, CardStore};
