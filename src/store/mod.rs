//! Persistence boundary for readings and alerts.
//!
//! The pipeline needs one thing from storage: an atomic write of one
//! ingestion batch whose alert decisions are made against the alert state
//! read inside the same critical section. Anything else (querying,
//! reporting) belongs to other services.

use async_trait::async_trait;

use crate::alerts::AlertChange;
use crate::error::StoreError;
use crate::models::{Alert, AlertKey, NormalizedReading};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

/// Decides the change for one key given the latest stored alert for it
/// (the open one if any, else the most recently resolved one).
pub type Decide<'a> =
    dyn Fn(&AlertKey, Option<&Alert>) -> Option<AlertChange> + Send + Sync + 'a;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Write one ingestion batch atomically.
    ///
    /// For every key in `alert_keys` the store takes its per-key lock, reads
    /// the latest alert, asks `decide` for a change and writes it together
    /// with `readings`, all inside one critical section. Returns the changes
    /// written. On error nothing is written.
    async fn commit(
        &self,
        readings: &[NormalizedReading],
        alert_keys: &[AlertKey],
        decide: &Decide<'_>,
    ) -> Result<Vec<AlertChange>, StoreError>;
}
