use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tracing::{debug, info};

use crate::models::{BusinessDate, CounterTransition, DailyCounter};
use crate::services::counter::CounterStore;
use crate::TokenQueueError;

const DEFAULT_NAMESPACE: &str = "opd_token_counter";

// Mirrors `advancer::next_current`. Runs server side so the read, the
// decision and the write happen without another client interleaving.
// `tests/redis_counter_test.rs::completion_script_agrees_with_next_current`
// (ignored, needs REDIS_TEST_URL) checks the two against one case table.
const APPLY_COMPLETION_LUA: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'current') or '0')
local seq = tonumber(redis.call('HGET', KEYS[1], 'seq') or '0')
local completed = tonumber(ARGV[1])
local next_booked = tonumber(ARGV[2])
local new_current = current
if current <= completed then
  if next_booked >= 0 then
    new_current = next_booked
  elseif completed < seq then
    new_current = completed + 1
  else
    new_current = completed
  end
end
redis.call('HSET', KEYS[1], 'current', new_current, 'updated_at', ARGV[3])
return {seq, current, new_current}
"#;

/// Daily counters kept in Redis hashes `{namespace}:{YYYYMMDD}` with the
/// fields `seq`, `current` and `updated_at`.
pub struct RedisCounterStore {
    pool: Pool,
    namespace: String,
    apply_completion_script: Script,
}

impl RedisCounterStore {
    pub async fn new(redis_url: &str) -> Result<Self, TokenQueueError> {
        Self::with_namespace(redis_url, DEFAULT_NAMESPACE).await
    }

    pub async fn with_namespace(redis_url: &str, namespace: &str) -> Result<Self, TokenQueueError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            TokenQueueError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to create Redis pool",
                format!("Pool creation error: {}", e),
            )))
        })?;

        let store = Self {
            pool,
            namespace: namespace.to_string(),
            apply_completion_script: Script::new(APPLY_COMPLETION_LUA),
        };

        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis token counter store initialized (namespace {})", store.namespace);

        Ok(store)
    }

    fn key(&self, date: BusinessDate) -> String {
        format!("{}:{}", self.namespace, date.key())
    }

    async fn get_connection(&self) -> Result<Connection, TokenQueueError> {
        self.pool.get().await.map_err(|e| {
            TokenQueueError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to get Redis connection",
                e.to_string(),
            )))
        })
    }
}

fn to_sequence(value: i64, field: &str) -> Result<u32, TokenQueueError> {
    u32::try_from(value)
        .map_err(|_| TokenQueueError::StoreError(format!("counter field {} out of range: {}", field, value)))
}

fn parse_field(fields: &HashMap<String, String>, name: &str) -> Result<u32, TokenQueueError> {
    match fields.get(name) {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| TokenQueueError::StoreError(format!("counter field {} is not a number: {}", name, raw)))
            .and_then(|v| to_sequence(v, name)),
        None => Ok(0),
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_issued(&self, date: BusinessDate) -> Result<DailyCounter, TokenQueueError> {
        let mut conn = self.get_connection().await?;
        let key = self.key(date);
        let now = Utc::now();

        let (seq, current): (i64, Option<i64>) = redis::pipe()
            .atomic()
            .hincr(&key, "seq", 1)
            .hset(&key, "updated_at", now.to_rfc3339())
            .ignore()
            .hget(&key, "current")
            .query_async(&mut conn)
            .await?;

        debug!("Issued sequence {} for {}", seq, date.key());

        Ok(DailyCounter {
            date,
            last_issued: to_sequence(seq, "seq")?,
            current: to_sequence(current.unwrap_or(0), "current")?,
            updated_at: Some(now),
        })
    }

    async fn get(&self, date: BusinessDate) -> Result<Option<DailyCounter>, TokenQueueError> {
        let mut conn = self.get_connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(self.key(date)).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let updated_at = fields
            .get("updated_at")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(Some(DailyCounter {
            date,
            last_issued: parse_field(&fields, "seq")?,
            current: parse_field(&fields, "current")?,
            updated_at,
        }))
    }

    async fn set_current(&self, date: BusinessDate, value: u32) -> Result<DailyCounter, TokenQueueError> {
        let mut conn = self.get_connection().await?;
        let key = self.key(date);
        let now = Utc::now();

        let (seq,): (Option<i64>,) = redis::pipe()
            .atomic()
            .hset_multiple(&key, &[("current", value.to_string()), ("updated_at", now.to_rfc3339())])
            .ignore()
            .hget(&key, "seq")
            .query_async(&mut conn)
            .await?;

        Ok(DailyCounter {
            date,
            last_issued: to_sequence(seq.unwrap_or(0), "seq")?,
            current: value,
            updated_at: Some(now),
        })
    }

    async fn apply_completion(
        &self,
        date: BusinessDate,
        completed: u32,
        next_booked: Option<u32>,
    ) -> Result<CounterTransition, TokenQueueError> {
        let mut conn = self.get_connection().await?;
        let now = Utc::now();

        let (seq, previous, current): (i64, i64, i64) = self
            .apply_completion_script
            .key(self.key(date))
            .arg(completed)
            .arg(next_booked.map(i64::from).unwrap_or(-1))
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        Ok(CounterTransition {
            previous_current: to_sequence(previous, "current")?,
            counter: DailyCounter {
                date,
                last_issued: to_sequence(seq, "seq")?,
                current: to_sequence(current, "current")?,
                updated_at: Some(now),
            },
        })
    }
}
