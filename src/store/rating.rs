use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::Result;

/// Running rating statistics for one device.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rating {
    /// Number of scores received.
    pub count: u32,
    /// Sum of all scores received.
    pub sum: f64,
}

impl Rating {
    /// Mean score, derived on read.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / f64::from(self.count)
    }
}

/// Aggregates device ratings.
#[tonic::async_trait]
pub trait RatingStore: Send + Sync {
    /// Records `score` for `device_id` and returns the updated aggregate.
    async fn add(&self, device_id: &str, score: f64) -> Result<Rating>;
}

/// Rating store kept in memory.
///
/// Every update takes one store-wide lock, so ratings for different devices
/// serialize against each other.
#[derive(Clone, Default)]
pub struct InMemoryRatingStore {
    ratings: Arc<Mutex<HashMap<String, Rating>>>,
}

impl InMemoryRatingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[tonic::async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn add(&self, device_id: &str, score: f64) -> Result<Rating> {
        let mut ratings = self.ratings.lock().await;

        let rating = ratings.entry(device_id.to_string()).or_default();
        rating.count += 1;
        rating.sum += score;

        Ok(*rating)
    }
}
