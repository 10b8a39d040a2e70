use std::sync::Arc;

use tracing::{info, instrument};

use crate::models::{BusinessDate, DailyCounter, QueueEvent, TokenCode, TokenDisplay};
use crate::services::counter::CounterStore;
use crate::services::events::QueueEventPublisher;
use crate::TokenQueueError;

/// Read side of the daily counter plus the admin override.
pub struct TokenBoardService {
    counters: Arc<dyn CounterStore>,
    events: QueueEventPublisher,
    timezone_offset_minutes: i32,
}

impl TokenBoardService {
    pub fn new(counters: Arc<dyn CounterStore>, events: QueueEventPublisher, timezone_offset_minutes: i32) -> Self {
        Self {
            counters,
            events,
            timezone_offset_minutes,
        }
    }

    pub fn today(&self) -> BusinessDate {
        BusinessDate::today(self.timezone_offset_minutes)
    }

    /// Counter for `date`; a date nobody touched yet reads as zeros.
    pub async fn read_current(&self, date: BusinessDate) -> Result<DailyCounter, TokenQueueError> {
        Ok(self
            .counters
            .get(date)
            .await?
            .unwrap_or_else(|| DailyCounter::empty(date)))
    }

    /// Patient-facing projection with the formatted "now serving" code.
    pub async fn display(&self, date: BusinessDate) -> Result<TokenDisplay, TokenQueueError> {
        let counter = self.read_current(date).await?;

        Ok(TokenDisplay {
            date: date.key(),
            current: counter.current,
            last_issued: counter.last_issued,
            current_token: (counter.current > 0).then(|| TokenCode::new(date, counter.current).to_string()),
        })
    }

    /// Operator escape hatch: overwrite "now serving", backwards included.
    #[instrument(skip(self))]
    pub async fn set_current(&self, date: BusinessDate, value: u32) -> Result<DailyCounter, TokenQueueError> {
        let counter = self.counters.set_current(date, value).await?;
        info!("Now serving for {} overridden to {}", date.key(), value);

        self.events.publish(QueueEvent::CurrentOverridden {
            date: date.key(),
            current: value,
        });

        Ok(counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::counter::InMemoryCounterStore;

    fn board() -> TokenBoardService {
        TokenBoardService::new(Arc::new(InMemoryCounterStore::new()), QueueEventPublisher::new(), 330)
    }

    #[tokio::test]
    async fn untouched_date_reads_as_zero() {
        let date = BusinessDate::from_ymd(2025, 5, 1).unwrap();
        let display = board().display(date).await.unwrap();

        assert_eq!(display.current, 0);
        assert_eq!(display.last_issued, 0);
        assert_eq!(display.current_token, None);
        assert_eq!(display.date, "20250501");
    }

    #[tokio::test]
    async fn display_formats_current_token() {
        let board = board();
        let date = BusinessDate::from_ymd(2025, 5, 1).unwrap();
        board.set_current(date, 12).await.unwrap();

        let display = board.display(date).await.unwrap();
        assert_eq!(display.current_token.as_deref(), Some("OPD-20250501-0012"));
    }
}
