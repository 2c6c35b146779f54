use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;

use super::{next_deferral, next_failure, FailOutcome, JobQueue, QueueDepth, QueueError};
use crate::models::job::JobDescriptor;

/// Promotes due retries and expired leases, then pops one job and leases it.
///
/// KEYS: ready list, delayed zset, leased zset, payload hash.
/// ARGV: now (ms), lease deadline (ms).
const LEASE_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local deadline = tonumber(ARGV[2])

local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)
for _, id in ipairs(due) do
  redis.call('ZREM', KEYS[2], id)
  redis.call('LPUSH', KEYS[1], id)
end

local expired = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now)
for _, id in ipairs(expired) do
  redis.call('ZREM', KEYS[3], id)
  redis.call('RPUSH', KEYS[1], id)
end

while true do
  local id = redis.call('RPOP', KEYS[1])
  if not id then
    return false
  end
  local payload = redis.call('HGET', KEYS[4], id)
  if payload then
    redis.call('ZADD', KEYS[3], deadline, id)
    return payload
  end
end
"#;

/// Redis-backed job queue.
///
/// Layout under `{prefix}:jobs:`: `ready` (list of ids, FIFO), `delayed` (zset scored
/// by ready-at ms), `leased` (zset scored by lease deadline ms), `payload` (hash of
/// id to descriptor JSON).
pub struct RedisJobQueue {
    conn: ConnectionManager,
    lease_script: Script,
    lease_timeout: Duration,
    ready_key: String,
    delayed_key: String,
    leased_key: String,
    payload_key: String,
}

impl RedisJobQueue {
    pub async fn connect(
        redis_url: &str,
        prefix: &str,
        lease_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(conn, prefix, lease_timeout))
    }

    pub fn with_connection(conn: ConnectionManager, prefix: &str, lease_timeout: Duration) -> Self {
        Self {
            conn,
            lease_script: Script::new(LEASE_SCRIPT),
            lease_timeout,
            ready_key: format!("{prefix}:jobs:ready"),
            delayed_key: format!("{prefix}:jobs:delayed"),
            leased_key: format!("{prefix}:jobs:leased"),
            payload_key: format!("{prefix}:jobs:payload"),
        }
    }

    /// Re-schedule `job` into the delayed set, releasing its lease.
    async fn schedule(&self, job: &JobDescriptor, delay: Duration) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let id = job.id.to_string();
        let payload = serde_json::to_string(job)?;
        let ready_at = now_millis() + delay.as_millis() as i64;

        redis::pipe()
            .atomic()
            .hset(&self.payload_key, &id, payload)
            .ignore()
            .zrem(&self.leased_key, &id)
            .ignore()
            .zadd(&self.delayed_key, &id, ready_at)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let id = job.id.to_string();

        redis::pipe()
            .atomic()
            .zrem(&self.leased_key, &id)
            .ignore()
            .zrem(&self.delayed_key, &id)
            .ignore()
            .hdel(&self.payload_key, &id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        self.enqueue_all(std::slice::from_ref(job)).await
    }

    async fn enqueue_all(&self, jobs: &[JobDescriptor]) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();

        for job in jobs {
            let id = job.id.to_string();
            let payload = serde_json::to_string(job)?;
            pipe.hset(&self.payload_key, &id, payload)
                .ignore()
                .lpush(&self.ready_key, &id)
                .ignore();
        }

        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn lease(&self, worker: &str) -> Result<Option<JobDescriptor>, QueueError> {
        let mut conn = self.conn.clone();
        let now = now_millis();
        let deadline = now + self.lease_timeout.as_millis() as i64;

        let payload: Option<String> = self
            .lease_script
            .key(&self.ready_key)
            .key(&self.delayed_key)
            .key(&self.leased_key)
            .key(&self.payload_key)
            .arg(now)
            .arg(deadline)
            .invoke_async(&mut conn)
            .await?;

        match payload {
            Some(payload) => {
                let job: JobDescriptor = serde_json::from_str(&payload)?;
                tracing::debug!(worker, job_id = %job.id, job_type = %job.job_type, "Leased job");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        self.remove(job).await
    }

    async fn fail(&self, job: &JobDescriptor, error: &str) -> Result<FailOutcome, QueueError> {
        let (updated, outcome) = next_failure(job);
        match outcome {
            FailOutcome::Retrying { delay, .. } => self.schedule(&updated, delay).await?,
            FailOutcome::Exhausted { .. } => self.remove(&updated).await?,
        }
        tracing::debug!(job_id = %job.id, error, ?outcome, "Recorded job failure");
        Ok(outcome)
    }

    async fn defer(&self, job: &JobDescriptor, delay: Duration) -> Result<(), QueueError> {
        let updated = next_deferral(job, delay);
        self.schedule(&updated, delay).await
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let mut conn = self.conn.clone();
        let ready: u64 = conn.llen(&self.ready_key).await?;
        let delayed: u64 = conn.zcard(&self.delayed_key).await?;
        let leased: u64 = conn.zcard(&self.leased_key).await?;
        Ok(QueueDepth {
            ready,
            delayed,
            leased,
        })
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
