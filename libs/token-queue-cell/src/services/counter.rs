use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{BusinessDate, CounterTransition, DailyCounter};
use crate::services::advancer::next_current;
use crate::TokenQueueError;

/// Keyed store of [`DailyCounter`] rows. Every mutating method is a single
/// indivisible step for its date; dates never need to be locked together.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `last_issued` and return the row as it stands afterwards.
    /// Creates the row (with `last_issued = 1`) when the date is new.
    async fn increment_issued(&self, date: BusinessDate) -> Result<DailyCounter, TokenQueueError>;

    async fn get(&self, date: BusinessDate) -> Result<Option<DailyCounter>, TokenQueueError>;

    /// Unconditional write of `current`; no monotonicity check.
    async fn set_current(&self, date: BusinessDate, value: u32) -> Result<DailyCounter, TokenQueueError>;

    /// Read `current`/`last_issued`, pick the new `current` with
    /// [`next_current`] and persist it, all in one step.
    async fn apply_completion(
        &self,
        date: BusinessDate,
        completed: u32,
        next_booked: Option<u32>,
    ) -> Result<CounterTransition, TokenQueueError>;
}

/// Process-local counters. Suitable for a single API instance and tests.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<BusinessDate, DailyCounter>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_issued(&self, date: BusinessDate) -> Result<DailyCounter, TokenQueueError> {
        let mut counters = self.counters.write().await;
        let counter = counters.entry(date).or_insert_with(|| DailyCounter::empty(date));

        counter.last_issued = counter
            .last_issued
            .checked_add(1)
            .ok_or_else(|| TokenQueueError::StoreError(format!("token sequence exhausted for {}", date)))?;
        counter.updated_at = Some(Utc::now());

        debug!("Issued sequence {} for {}", counter.last_issued, date.key());
        Ok(counter.clone())
    }

    async fn get(&self, date: BusinessDate) -> Result<Option<DailyCounter>, TokenQueueError> {
        Ok(self.counters.read().await.get(&date).cloned())
    }

    async fn set_current(&self, date: BusinessDate, value: u32) -> Result<DailyCounter, TokenQueueError> {
        let mut counters = self.counters.write().await;
        let counter = counters.entry(date).or_insert_with(|| DailyCounter::empty(date));
        counter.current = value;
        counter.updated_at = Some(Utc::now());
        Ok(counter.clone())
    }

    async fn apply_completion(
        &self,
        date: BusinessDate,
        completed: u32,
        next_booked: Option<u32>,
    ) -> Result<CounterTransition, TokenQueueError> {
        let mut counters = self.counters.write().await;
        let counter = counters.entry(date).or_insert_with(|| DailyCounter::empty(date));

        let previous_current = counter.current;
        counter.current = next_current(counter.current, counter.last_issued, completed, next_booked);
        counter.updated_at = Some(Utc::now());

        Ok(CounterTransition {
            previous_current,
            counter: counter.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> BusinessDate {
        BusinessDate::from_ymd(2025, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn first_increment_creates_row_at_one() {
        let store = InMemoryCounterStore::new();
        assert!(store.get(date()).await.unwrap().is_none());

        let counter = store.increment_issued(date()).await.unwrap();
        assert_eq!(counter.last_issued, 1);
        assert_eq!(counter.current, 0);
    }

    #[tokio::test]
    async fn dates_are_independent() {
        let store = InMemoryCounterStore::new();
        let other = BusinessDate::from_ymd(2025, 1, 16).unwrap();

        store.increment_issued(date()).await.unwrap();
        store.increment_issued(date()).await.unwrap();
        let counter = store.increment_issued(other).await.unwrap();

        assert_eq!(counter.last_issued, 1);
        assert_eq!(store.get(date()).await.unwrap().unwrap().last_issued, 2);
    }

    #[tokio::test]
    async fn set_current_creates_row_lazily() {
        let store = InMemoryCounterStore::new();
        let counter = store.set_current(date(), 9).await.unwrap();
        assert_eq!(counter.current, 9);
        assert_eq!(counter.last_issued, 0);
    }
}
