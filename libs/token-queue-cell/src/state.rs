use std::sync::Arc;

use tracing::{info, warn};

use shared_config::AppConfig;

use crate::services::{
    AppointmentLedger, AppointmentLifecycleService, CompletionAdvancer, CounterStore, InMemoryAppointmentLedger,
    InMemoryCounterStore, QueueEventPublisher, RedisCounterStore, SupabaseAppointmentLedger, TokenBoardService,
    TokenIssuer,
};
use crate::TokenQueueError;

/// Everything the HTTP handlers need, wired once at startup.
#[derive(Clone)]
pub struct TokenQueueState {
    pub config: Arc<AppConfig>,
    pub issuer: Arc<TokenIssuer>,
    pub advancer: Arc<CompletionAdvancer>,
    pub board: Arc<TokenBoardService>,
    pub lifecycle: Arc<AppointmentLifecycleService>,
    pub ledger: Arc<dyn AppointmentLedger>,
    pub events: QueueEventPublisher,
}

impl TokenQueueState {
    pub fn new(
        config: Arc<AppConfig>,
        counters: Arc<dyn CounterStore>,
        ledger: Arc<dyn AppointmentLedger>,
    ) -> Self {
        let events = QueueEventPublisher::new();

        Self {
            issuer: Arc::new(TokenIssuer::new(counters.clone(), ledger.clone(), events.clone())),
            advancer: Arc::new(CompletionAdvancer::new(counters.clone(), ledger.clone(), events.clone())),
            board: Arc::new(TokenBoardService::new(
                counters,
                events.clone(),
                config.timezone_offset_minutes,
            )),
            lifecycle: Arc::new(AppointmentLifecycleService::new(ledger.clone(), events.clone())),
            ledger,
            events,
            config,
        }
    }

    /// Redis when `REDIS_URL` is set, Supabase when the service role key is
    /// present; process memory otherwise.
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self, TokenQueueError> {
        let counters: Arc<dyn CounterStore> = match config.redis_url.as_deref() {
            Some(url) => {
                info!("Token counters backed by Redis");
                Arc::new(RedisCounterStore::new(url).await?)
            }
            None => {
                warn!("Token counters held in memory; they reset on restart");
                Arc::new(InMemoryCounterStore::new())
            }
        };

        let ledger: Arc<dyn AppointmentLedger> = if config.is_ledger_configured() {
            info!("Appointment ledger backed by Supabase at {}", config.supabase_url);
            Arc::new(SupabaseAppointmentLedger::new(&config))
        } else {
            warn!("Supabase service role not configured; using an in-memory appointment ledger");
            Arc::new(InMemoryAppointmentLedger::new())
        };

        Ok(Self::new(config, counters, ledger))
    }
}
