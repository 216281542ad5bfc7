//! Durable job store on the shared key-value store.
//!
//! Layout, under one prefix:
//! - `waiting` ZSET scored by `(priority band, created_at)` — dispatch order
//! - `delayed` ZSET scored by the instant a retry becomes due
//! - `active`  ZSET scored by the lease deadline — stall detection
//! - `completed` / `failed` ZSETs scored by the terminal instant — retention
//! - `job:{id}` strings holding the serialized job
//!
//! A job id is a member of exactly one of the five sets at any instant; the
//! claim/ack/fail scripts move ids between sets atomically, which is what
//! makes delivery at-least-once: a worker that dies mid-job leaves its id in
//! `active`, and the next claim sweeps it back to `waiting` once the lease
//! deadline passes.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::Script;
use serde::Serialize;

use crate::common::SyncError;

use super::job::{JobState, SyncJob};

const DEFAULT_PREFIX: &str = "queue:inventory-sync";

/// Lease on a claimed job; expiry makes it eligible for redelivery.
const STALL_TIMEOUT_MS: i64 = 30_000;

/// Fleet-wide dispatch ceiling, jobs per second.
const RATE_LIMIT_PER_SEC: u32 = 100;

const COMPLETED_KEEP_COUNT: i64 = 1_000;
const COMPLETED_KEEP_MS: i64 = 24 * 60 * 60 * 1000;
const FAILED_KEEP_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Sweeps expired leases and due retries back into `waiting`, then pops up
/// to `limit` ids into `active` under the per-second rate ceiling.
///
/// KEYS: 1=waiting 2=delayed 3=active 4=rate counter
/// ARGV: 1=now_ms 2=lease_ms 3=limit 4=job key prefix 5=rate ceiling
const CLAIM_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local lease = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local prefix = ARGV[4]
local rate_max = tonumber(ARGV[5])

local function back_to_waiting(id)
  local raw = redis.call('GET', prefix .. id)
  if raw then
    local job = cjson.decode(raw)
    redis.call('ZADD', KEYS[1], tonumber(job['order_score']), id)
  end
end

local stalled = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now)
for _, id in ipairs(stalled) do
  redis.call('ZREM', KEYS[3], id)
  back_to_waiting(id)
end

local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)
for _, id in ipairs(due) do
  redis.call('ZREM', KEYS[2], id)
  back_to_waiting(id)
end

if rate_max > 0 then
  local used = tonumber(redis.call('GET', KEYS[4]) or '0')
  limit = math.min(limit, math.max(rate_max - used, 0))
end

local claimed = {}
if limit > 0 then
  local popped = redis.call('ZPOPMIN', KEYS[1], limit)
  for i = 1, #popped, 2 do
    local id = popped[i]
    redis.call('ZADD', KEYS[3], now + lease, id)
    table.insert(claimed, id)
  end
  if #claimed > 0 then
    redis.call('INCRBY', KEYS[4], #claimed)
    redis.call('EXPIRE', KEYS[4], 2)
  end
end

return {claimed, stalled}
"#;

/// Move an active job to `completed` and apply retention: entries beyond the
/// newest `keep_count` are evicted once older than `keep_ms` (keep the last
/// 1000 or 24 h, whichever is larger).
///
/// KEYS: 1=active 2=completed
/// ARGV: 1=job_id 2=now_ms 3=job key prefix 4=keep_count 5=keep_ms
const ACK_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
  return 0
end
local now = tonumber(ARGV[2])
redis.call('ZADD', KEYS[2], now, ARGV[1])
local keep = tonumber(ARGV[4])
local card = redis.call('ZCARD', KEYS[2])
if card > keep then
  local cutoff = now - tonumber(ARGV[5])
  local evictable = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', cutoff, 'LIMIT', 0, card - keep)
  for _, id in ipairs(evictable) do
    redis.call('ZREM', KEYS[2], id)
    redis.call('DEL', ARGV[3] .. id)
  end
end
return 1
"#;

/// Move an active job to `delayed` (retry due at ARGV[2]) or, when ARGV[2]
/// is empty, to `failed` with dead-letter retention.
///
/// KEYS: 1=active 2=delayed 3=failed
/// ARGV: 1=job_id 2=retry_at_ms|'' 3=now_ms 4=job key prefix 5=failed keep_ms
const FAIL_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
  return 0
end
local now = tonumber(ARGV[3])
if ARGV[2] ~= '' then
  redis.call('ZADD', KEYS[2], tonumber(ARGV[2]), ARGV[1])
else
  redis.call('ZADD', KEYS[3], now, ARGV[1])
  local cutoff = now - tonumber(ARGV[5])
  local expired = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', cutoff)
  for _, id in ipairs(expired) do
    redis.call('ZREM', KEYS[3], id)
    redis.call('DEL', ARGV[4] .. id)
  end
end
return 1
"#;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub total: u64,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue one job; returns its id.
    async fn add(&self, job: SyncJob) -> Result<String, SyncError>;

    /// Atomically enqueue many jobs.
    async fn add_batch(&self, jobs: Vec<SyncJob>) -> Result<Vec<String>, SyncError>;

    /// Claim up to `limit` jobs for processing under a lease.
    async fn claim(&self, worker_id: &str, limit: usize) -> Result<Vec<SyncJob>, SyncError>;

    /// Mark a claimed job completed.
    async fn ack(&self, job_id: &str) -> Result<(), SyncError>;

    /// Mark a claimed job failed. Retriable failures with attempts left are
    /// re-scheduled with exponential backoff; everything else dead-letters.
    async fn fail(&self, job_id: &str, error: &str, retriable: bool) -> Result<(), SyncError>;

    async fn get(&self, job_id: &str) -> Result<Option<SyncJob>, SyncError>;

    async fn stats(&self) -> Result<QueueStats, SyncError>;
}

pub struct RedisJobQueue {
    redis: ConnectionManager,
    prefix: String,
    lease_ms: i64,
    rate_limit_per_sec: u32,
}

impl RedisJobQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self::with_prefix(redis, DEFAULT_PREFIX)
    }

    /// Custom key prefix; used to isolate queues (and tests) sharing one store.
    pub fn with_prefix(redis: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            lease_ms: STALL_TIMEOUT_MS,
            rate_limit_per_sec: RATE_LIMIT_PER_SEC,
        }
    }

    pub fn with_lease_ms(mut self, lease_ms: i64) -> Self {
        self.lease_ms = lease_ms;
        self
    }

    fn key(&self, part: &str) -> String {
        format!("{}:{}", self.prefix, part)
    }

    fn job_key_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("{}{}", self.job_key_prefix(), job_id)
    }

    async fn load_job(
        &self,
        con: &mut ConnectionManager,
        job_id: &str,
    ) -> Result<Option<SyncJob>, SyncError> {
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.job_key(job_id))
            .query_async(con)
            .await
            .map_err(SyncError::queue)?;
        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SyncError::QueueUnavailable(format!("corrupt job payload: {e}"))),
            None => Ok(None),
        }
    }

    async fn store_job(
        &self,
        con: &mut ConnectionManager,
        job: &SyncJob,
    ) -> Result<(), SyncError> {
        let raw = serde_json::to_string(job)
            .map_err(|e| SyncError::QueueUnavailable(format!("serialize job: {e}")))?;
        let _: () = redis::cmd("SET")
            .arg(self.job_key(&job.id))
            .arg(raw)
            .query_async(con)
            .await
            .map_err(SyncError::queue)?;
        Ok(())
    }

    /// Append SET + ZADD commands for one job to an enqueue pipeline.
    fn push_add(&self, pipe: &mut redis::Pipeline, job: &SyncJob) -> Result<(), SyncError> {
        let raw = serde_json::to_string(job)
            .map_err(|e| SyncError::QueueUnavailable(format!("serialize job: {e}")))?;
        pipe.cmd("SET")
            .arg(self.job_key(&job.id))
            .arg(raw)
            .ignore();
        match job.next_run_at {
            Some(run_at) if run_at > Utc::now() => {
                pipe.cmd("ZADD")
                    .arg(self.key("delayed"))
                    .arg(run_at.timestamp_millis())
                    .arg(&job.id)
                    .ignore();
            }
            _ => {
                pipe.cmd("ZADD")
                    .arg(self.key("waiting"))
                    .arg(job.order_score)
                    .arg(&job.id)
                    .ignore();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn add(&self, job: SyncJob) -> Result<String, SyncError> {
        self.add_batch(vec![job])
            .await?
            .pop()
            .ok_or_else(|| SyncError::QueueUnavailable("empty enqueue".to_string()))
    }

    async fn add_batch(&self, jobs: Vec<SyncJob>) -> Result<Vec<String>, SyncError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for job in &jobs {
            self.push_add(&mut pipe, job)?;
        }
        let mut con = self.redis.clone();
        let _: () = pipe.query_async(&mut con).await.map_err(SyncError::queue)?;
        Ok(jobs.into_iter().map(|job| job.id).collect())
    }

    async fn claim(&self, worker_id: &str, limit: usize) -> Result<Vec<SyncJob>, SyncError> {
        let now = Utc::now();
        let rate_key = self.key(&format!("rate:{}", now.timestamp()));

        let mut con = self.redis.clone();
        let (claimed, stalled): (Vec<String>, Vec<String>) = Script::new(CLAIM_SCRIPT)
            .key(self.key("waiting"))
            .key(self.key("delayed"))
            .key(self.key("active"))
            .key(rate_key)
            .arg(now.timestamp_millis())
            .arg(self.lease_ms)
            .arg(limit)
            .arg(self.job_key_prefix())
            .arg(self.rate_limit_per_sec)
            .invoke_async(&mut con)
            .await
            .map_err(SyncError::queue)?;

        for job_id in &stalled {
            tracing::warn!(%job_id, "lease expired; job re-queued for redelivery");
        }

        let mut jobs = Vec::with_capacity(claimed.len());
        for job_id in claimed {
            let Some(mut job) = self.load_job(&mut con, &job_id).await? else {
                tracing::warn!(%job_id, "claimed id has no payload; dropping");
                continue;
            };
            job.attempts_made += 1;
            job.state = JobState::Active;
            self.store_job(&mut con, &job).await?;
            tracing::debug!(%job_id, worker_id, attempt = job.attempts_made, "claimed job");
            jobs.push(job);
        }
        Ok(jobs)
    }

    async fn ack(&self, job_id: &str) -> Result<(), SyncError> {
        let now = Utc::now().timestamp_millis();
        let mut con = self.redis.clone();
        let moved: i64 = Script::new(ACK_SCRIPT)
            .key(self.key("active"))
            .key(self.key("completed"))
            .arg(job_id)
            .arg(now)
            .arg(self.job_key_prefix())
            .arg(COMPLETED_KEEP_COUNT)
            .arg(COMPLETED_KEEP_MS)
            .invoke_async(&mut con)
            .await
            .map_err(SyncError::queue)?;
        if moved == 0 {
            // Lease already expired and the id was swept back to waiting;
            // the retry will re-run the idempotent upsert.
            tracing::warn!(%job_id, "ack after lease expiry; job will be redelivered");
            return Ok(());
        }

        if let Some(mut job) = self.load_job(&mut con, job_id).await? {
            job.state = JobState::Completed;
            job.progress = 100;
            job.next_run_at = None;
            self.store_job(&mut con, &job).await?;
        }
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str, retriable: bool) -> Result<(), SyncError> {
        let mut con = self.redis.clone();
        let Some(mut job) = self.load_job(&mut con, job_id).await? else {
            tracing::warn!(%job_id, "failed job has no payload");
            return Ok(());
        };

        let retry = retriable && job.has_attempts_left();
        let retry_at = if retry {
            let due = Utc::now() + job.backoff_delay();
            job.state = JobState::Delayed;
            job.next_run_at = Some(due);
            Some(due.timestamp_millis())
        } else {
            job.state = JobState::Failed;
            job.next_run_at = None;
            None
        };
        job.last_error = Some(error.to_string());

        let retry_arg = retry_at.map(|ms| ms.to_string()).unwrap_or_default();
        let moved: i64 = Script::new(FAIL_SCRIPT)
            .key(self.key("active"))
            .key(self.key("delayed"))
            .key(self.key("failed"))
            .arg(job_id)
            .arg(retry_arg)
            .arg(Utc::now().timestamp_millis())
            .arg(self.job_key_prefix())
            .arg(FAILED_KEEP_MS)
            .invoke_async(&mut con)
            .await
            .map_err(SyncError::queue)?;
        if moved == 0 {
            tracing::warn!(%job_id, "fail after lease expiry; job will be redelivered");
            return Ok(());
        }

        self.store_job(&mut con, &job).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<SyncJob>, SyncError> {
        let mut con = self.redis.clone();
        self.load_job(&mut con, job_id).await
    }

    async fn stats(&self) -> Result<QueueStats, SyncError> {
        let mut con = self.redis.clone();
        let (waiting, active, completed, failed, delayed): (u64, u64, u64, u64, u64) =
            redis::pipe()
                .cmd("ZCARD")
                .arg(self.key("waiting"))
                .cmd("ZCARD")
                .arg(self.key("active"))
                .cmd("ZCARD")
                .arg(self.key("completed"))
                .cmd("ZCARD")
                .arg(self.key("failed"))
                .cmd("ZCARD")
                .arg(self.key("delayed"))
                .query_async(&mut con)
                .await
                .map_err(SyncError::queue)?;
        Ok(QueueStats {
            waiting,
            active,
            completed,
            failed,
            delayed,
            total: waiting + active + completed + failed + delayed,
        })
    }
}
