// [libs/infra/sync/src/mirror.rs]
/*!
 * DistributedSync (spec §4.7): mirrors the local KeyStore into a shared
 * Redis hash per key, bootstraps from whichever side is non-empty,
 * re-pulls on a timer to catch missed pub/sub events, and exposes the
 * atomic debit/top-up/rate-check scripts that are the linearization
 * point for credits when multiple instances share one cache.
 *
 * Every suspension point here (connect, HGETALL, EVAL, PUBLISH) sits
 * outside the Gate's synchronous critical section (spec §5); callers
 * fall back to local KeyStore mutation on transport failure.
 */

use crate::codec;
use crate::errors::SyncError;
use crate::events::{SyncEvent, SyncEventKind};
use paygate_keystore::{ImportMode, KeyStore};
use paygate_model::key::KeyGroup;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(5);

const DEDUCT_SCRIPT: &str = r#"
local active = redis.call('HGET', KEYS[1], 'active')
if active == 'false' then
  return {-1, 0, 0, 0}
end
local credits = tonumber(redis.call('HGET', KEYS[1], 'credits') or '0')
local amount = tonumber(ARGV[1])
if credits < amount then
  return {0, credits, 0, 0}
end
local new_credits = redis.call('HINCRBY', KEYS[1], 'credits', -amount)
local new_total_spent = redis.call('HINCRBY', KEYS[1], 'total_spent', amount)
local new_total_calls = redis.call('HINCRBY', KEYS[1], 'total_calls', 1)
redis.call('HSET', KEYS[1], 'last_used_at', ARGV[2])
return {1, new_credits, new_total_spent, new_total_calls}
"#;

const TOPUP_SCRIPT: &str = r#"
local new_credits = redis.call('HINCRBY', KEYS[1], 'credits', tonumber(ARGV[1]))
return new_credits
"#;

const RATE_CHECK_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local count = redis.call('ZCARD', key)
if count >= limit then
  return 0
end
redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return 1
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeductOutcome {
    Inactive,
    InsufficientCredits,
    Debited { credits: i64, total_spent: i64, total_calls: u64 },
}

pub struct DistributedSync {
    client: redis::Client,
    manager: ConnectionManager,
    keystore: Arc<KeyStore>,
    prefix: String,
    instance_id: String,
    sync_period: Duration,
    fallback_to_local_total: AtomicU64,
}

impl DistributedSync {
    pub async fn connect(redis_url: &str, prefix: impl Into<String>, keystore: Arc<KeyStore>, sync_period: Duration) -> Result<Self, SyncError> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            client,
            manager,
            keystore,
            prefix: prefix.into(),
            instance_id: format!("inst_{}", uuid::Uuid::new_v4()),
            sync_period,
            fallback_to_local_total: AtomicU64::new(0),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn fallback_to_local_total(&self) -> u64 {
        self.fallback_to_local_total.load(Ordering::Relaxed)
    }

    fn key_hash(&self, fingerprint: &str) -> String {
        format!("{}:key:{fingerprint}", self.prefix)
    }

    fn keys_set(&self) -> String {
        format!("{}:keys", self.prefix)
    }

    fn group_hash(&self, id: &str) -> String {
        format!("{}:group:{id}", self.prefix)
    }

    fn groups_set(&self) -> String {
        format!("{}:groups", self.prefix)
    }

    fn events_channel(&self) -> String {
        format!("{}:events", self.prefix)
    }

    fn rate_key(&self, scope: &str) -> String {
        format!("{}:rate:{scope}", self.prefix)
    }

    /// Connect, ping, fetch the remote set. If empty and local is
    /// non-empty, push local up; else pull everything down (spec §4.7
    /// "Bootstrapping").
    pub async fn bootstrap(&mut self) -> Result<(), SyncError> {
        let _: String = redis::cmd("PING").query_async(&mut self.manager).await?;

        let remote_fingerprints: Vec<String> = self.manager.smembers(self.keys_set()).await?;
        if remote_fingerprints.is_empty() && !self.keystore.is_empty() {
            self.push_local().await
        } else {
            self.pull_all().await
        }
    }

    pub async fn push_local(&mut self) -> Result<(), SyncError> {
        for record in self.keystore.export_keys() {
            self.push_one(&record.fingerprint).await?;
        }
        Ok(())
    }

    async fn push_one(&mut self, fingerprint: &str) -> Result<(), SyncError> {
        let Some(record) = self.keystore.get_key_raw(fingerprint) else { return Ok(()) };
        let hash = codec::record_to_hash(&record)?;
        let fields: Vec<(String, String)> = hash.into_iter().collect();
        self.manager.hset_multiple(self.key_hash(fingerprint), &fields).await?;
        self.manager.sadd(self.keys_set(), fingerprint).await?;
        Ok(())
    }

    /// Re-pulls every remote record into the local store. Never evicts a
    /// local record the remote side doesn't know about (spec §4.7).
    pub async fn pull_all(&mut self) -> Result<(), SyncError> {
        let fingerprints: Vec<String> = self.manager.smembers(self.keys_set()).await?;
        for fingerprint in fingerprints {
            self.pull_one(&fingerprint).await?;
        }
        Ok(())
    }

    async fn pull_one(&mut self, fingerprint: &str) -> Result<(), SyncError> {
        let fields: std::collections::HashMap<String, String> = self.manager.hgetall(self.key_hash(fingerprint)).await?;
        if fields.is_empty() {
            return Ok(());
        }
        match codec::hash_to_record(fields) {
            Ok(record) => {
                self.keystore.import_keys(vec![record], ImportMode::Overwrite);
            }
            Err(err) => tracing::warn!(%fingerprint, error = %err, "dropping malformed remote record"),
        }
        Ok(())
    }

    async fn pull_group(&mut self, id: &str) -> Result<(), SyncError> {
        let fields: std::collections::HashMap<String, String> = self.manager.hgetall(self.group_hash(id)).await?;
        if fields.is_empty() {
            return Ok(());
        }
        match codec::hash_to_group(fields) {
            Ok(group) => self.keystore.upsert_group(group),
            Err(err) => tracing::warn!(group_id = %id, error = %err, "dropping malformed remote group"),
        }
        Ok(())
    }

    pub async fn push_group(&mut self, group: &KeyGroup) -> Result<(), SyncError> {
        let hash = codec::group_to_hash(group)?;
        let fields: Vec<(String, String)> = hash.into_iter().collect();
        self.manager.hset_multiple(self.group_hash(&group.id), &fields).await?;
        self.manager.sadd(self.groups_set(), &group.id).await?;
        Ok(())
    }

    /// One tick of the background refresh loop (spec §4.7 "Background
    /// sync", default every 5 s, owned by the caller's scheduler).
    pub async fn refresh_tick(&mut self) -> Result<(), SyncError> {
        self.pull_all().await
    }

    pub fn sync_period(&self) -> Duration {
        self.sync_period
    }

    pub async fn publish_event(&mut self, kind: SyncEventKind) -> Result<(), SyncError> {
        let event = SyncEvent::new(&self.instance_id, kind);
        let payload = serde_json::to_string(&event).map_err(|e| SyncError::Serialize(e.to_string()))?;
        let _: i64 = self.manager.publish(self.events_channel(), payload).await?;
        Ok(())
    }

    /// Runs the dedicated subscriber connection until `shutdown` fires.
    /// Parse failures and self-published messages are silently dropped
    /// (spec §4.7, §7 "Recovery policy").
    pub async fn run_event_subscriber(&mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<(), SyncError> {
        use futures_util::StreamExt;

        let channel = self.events_channel();
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        loop {
            let mut stream = pubsub.on_message();
            let next = tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                    continue;
                }
                msg = stream.next() => msg,
            };
            drop(stream);

            let Some(msg) = next else { break };
            let Ok(payload) = msg.get_payload::<String>() else { continue };
            match SyncEvent::from_payload(&payload) {
                Ok(event) if event.instance_id == self.instance_id => {}
                Ok(event) => {
                    if let Err(err) = self.handle_event(event.kind).await {
                        tracing::warn!(error = %err, "failed to apply remote sync event");
                    }
                }
                Err(err) => tracing::debug!(error = %err, "dropping malformed sync event payload"),
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, kind: SyncEventKind) -> Result<(), SyncError> {
        match kind {
            SyncEventKind::KeyUpdated { fingerprint } | SyncEventKind::KeyCreated { fingerprint } => {
                self.pull_one(&fingerprint).await?;
            }
            SyncEventKind::KeyRevoked { fingerprint } => {
                self.keystore.revoke_key(&fingerprint);
            }
            SyncEventKind::CreditsChanged { fingerprint, credits, total_spent, total_calls } => {
                self.keystore.apply_credit_snapshot(&fingerprint, credits, total_spent, total_calls);
            }
            SyncEventKind::TokenRevoked { token } => {
                tracing::info!(token_prefix = %token.chars().take(8).collect::<String>(), "token_revoked event received");
            }
            SyncEventKind::GroupUpdated { id } | SyncEventKind::GroupAssignmentChanged { group: Some(id), .. } => {
                self.pull_group(&id).await?;
            }
            SyncEventKind::GroupAssignmentChanged { group: None, .. } => {}
            SyncEventKind::GroupDeleted { id } => {
                self.keystore.remove_group(&id);
            }
        }
        Ok(())
    }

    /// Single authoritative debit path in distributed mode (spec §4.7
    /// "Atomic deduction"). On transport failure the caller should fall
    /// back to `KeyStore::deduct_credits` and bump its own counter via
    /// `note_fallback`.
    pub async fn atomic_deduct(&mut self, fingerprint: &str, amount: i64) -> Result<DeductOutcome, SyncError> {
        let script = redis::Script::new(DEDUCT_SCRIPT);
        let result: Vec<i64> = script
            .key(self.key_hash(fingerprint))
            .arg(amount)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut self.manager)
            .await?;

        match result.as_slice() {
            [-1, ..] => Ok(DeductOutcome::Inactive),
            [0, ..] => Ok(DeductOutcome::InsufficientCredits),
            [1, credits, total_spent, total_calls] => {
                self.keystore.apply_credit_snapshot(fingerprint, *credits, *total_spent, *total_calls as u64);
                Ok(DeductOutcome::Debited { credits: *credits, total_spent: *total_spent, total_calls: *total_calls as u64 })
            }
            other => Err(SyncError::Deserialize(format!("unexpected deduct script reply: {other:?}"))),
        }
    }

    pub async fn atomic_topup(&mut self, fingerprint: &str, amount: i64) -> Result<i64, SyncError> {
        let script = redis::Script::new(TOPUP_SCRIPT);
        let credits: i64 = script.key(self.key_hash(fingerprint)).arg(amount).invoke_async(&mut self.manager).await?;
        Ok(credits)
    }

    /// Sliding-window rate check via a sorted set with score=timestamp
    /// (spec §4.7 "Atomic rate check"), mirroring the local `RateLimiter`.
    pub async fn atomic_rate_check(&mut self, scope: &str, limit: u32, window: Duration) -> Result<bool, SyncError> {
        if limit == 0 {
            return Ok(true);
        }
        let script = redis::Script::new(RATE_CHECK_SCRIPT);
        let now_ms = Utc::now().timestamp_millis();
        let member = uuid::Uuid::new_v4().to_string();
        let allowed: i64 = script
            .key(self.rate_key(scope))
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut self.manager)
            .await?;
        Ok(allowed == 1)
    }

    pub fn note_fallback(&self) {
        self.fallback_to_local_total.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("distributed sync unreachable, falling back to local-only accounting");
    }
}
