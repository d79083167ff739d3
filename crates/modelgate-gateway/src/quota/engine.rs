use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use modelgate_core::model::{BucketConfig, HealthStatus, QuotaRequest, QuotaReservation, QuotaStats};
use modelgate_core::Clock;

use crate::config::schema::QuotaSection;

use super::bucket::{BucketKey, TokenBucket};

/// Live hold on bucket tokens.
#[derive(Debug, Clone)]
struct ActiveReservation {
    key: BucketKey,
    tokens: f64,
    expires_at_ms: u64,
}

#[derive(Default)]
struct QuotaState {
    principal_overrides: HashMap<String, BucketConfig>,
    resource_overrides: HashMap<String, BucketConfig>,
    buckets: HashMap<BucketKey, TokenBucket>,
    reservations: HashMap<String, ActiveReservation>,
}

/// Shape for a new bucket: principal override > resource override > default.
fn bucket_shape<'a>(
    principal_overrides: &'a HashMap<String, BucketConfig>,
    resource_overrides: &'a HashMap<String, BucketConfig>,
    key: &BucketKey,
    default: &'a BucketConfig,
) -> &'a BucketConfig {
    principal_overrides
        .get(&key.principal)
        .or_else(|| resource_overrides.get(&key.resource))
        .unwrap_or(default)
}

impl QuotaState {
    /// Get or lazily create the bucket for `key`, refilled up to `now_ms`.
    fn bucket(&mut self, key: &BucketKey, default: &BucketConfig, now_ms: u64) -> &mut TokenBucket {
        let QuotaState {
            principal_overrides,
            resource_overrides,
            buckets,
            ..
        } = self;
        let bucket = buckets.entry(key.clone()).or_insert_with(|| {
            let cfg = bucket_shape(principal_overrides, resource_overrides, key, default);
            tracing::debug!(principal = %key.principal, resource = %key.resource, max_tokens = cfg.max_tokens, "bucket created");
            TokenBucket::new(cfg, now_ms)
        });
        bucket.refill(now_ms);
        bucket
    }

    /// Credit a reservation back and forget it. `false` if unknown.
    fn release(&mut self, id: &str) -> bool {
        let Some(res) = self.reservations.remove(id) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&res.key) {
            bucket.credit(res.tokens);
        }
        true
    }
}

/// Token-bucket quota engine with reservation semantics.
///
/// One bucket per `(principal, resource)` pair. Every public operation runs
/// its whole refill/read/modify sequence under a single lock.
pub struct QuotaEngine {
    default_bucket: BucketConfig,
    reservation_expiry_ms: u64,
    clock: Arc<dyn Clock>,
    state: Mutex<QuotaState>,
    seq: AtomicU64,
}

impl QuotaEngine {
    pub fn new(cfg: &QuotaSection, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_bucket: cfg.default_bucket.clone(),
            reservation_expiry_ms: cfg.reservation_expiry_ms,
            clock,
            state: Mutex::new(QuotaState {
                principal_overrides: cfg.principal_overrides.clone(),
                resource_overrides: cfg.resource_overrides.clone(),
                ..QuotaState::default()
            }),
            seq: AtomicU64::new(0),
        }
    }

    // Every critical section leaves the state consistent, so a poisoned lock
    // is still safe to use.
    fn state(&self) -> MutexGuard<'_, QuotaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self, now_ms: u64) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("res_{now_ms}_{n}")
    }

    /// Override applied to buckets created from now on; existing buckets keep their shape.
    pub fn set_principal_override(&self, principal: impl Into<String>, cfg: BucketConfig) {
        self.state().principal_overrides.insert(principal.into(), cfg);
    }

    /// Override applied to buckets created from now on; existing buckets keep their shape.
    pub fn set_resource_override(&self, resource: impl Into<String>, cfg: BucketConfig) {
        self.state().resource_overrides.insert(resource.into(), cfg);
    }

    /// Try to hold `req.tokens` from the bucket. Always returns a record;
    /// `available == false` means nothing was deducted.
    pub fn reserve(&self, req: &QuotaRequest) -> QuotaReservation {
        let now = self.clock.now_ms();
        let id = self.next_id(now);
        let expires_at_ms = now.saturating_add(self.reservation_expiry_ms);
        let key = BucketKey::new(&req.principal, &req.resource);

        let mut state = self.state();
        let bucket = state.bucket(&key, &self.default_bucket, now);

        if !req.tokens.is_finite() || req.tokens < 0.0 {
            return QuotaReservation {
                id,
                available: false,
                tokens_reserved: 0.0,
                tokens_remaining: bucket.tokens(),
                expires_at_ms,
                reason: Some(format!("invalid token amount: {}", req.tokens)),
            };
        }

        if !bucket.try_take(req.tokens) {
            let available = bucket.tokens();
            tracing::debug!(principal = %req.principal, resource = %req.resource, requested = req.tokens, available, "quota exhausted");
            return QuotaReservation {
                id,
                available: false,
                tokens_reserved: 0.0,
                tokens_remaining: available,
                expires_at_ms,
                reason: Some(format!(
                    "insufficient tokens: requested {}, available {}",
                    req.tokens, available
                )),
            };
        }

        let remaining = bucket.tokens();
        state.reservations.insert(
            id.clone(),
            ActiveReservation {
                key,
                tokens: req.tokens,
                expires_at_ms,
            },
        );

        QuotaReservation {
            id,
            available: true,
            tokens_reserved: req.tokens,
            tokens_remaining: remaining,
            expires_at_ms,
            reason: None,
        }
    }

    /// Return a reservation's tokens to its bucket. Idempotent: unknown,
    /// already released and reclaimed ids yield `false`.
    pub fn release(&self, reservation_id: &str) -> bool {
        self.state().release(reservation_id)
    }

    /// Current token count after refill. Creates the bucket if needed.
    pub fn check(&self, principal: &str, resource: &str) -> f64 {
        let now = self.clock.now_ms();
        let key = BucketKey::new(principal, resource);
        let mut state = self.state();
        state.bucket(&key, &self.default_bucket, now).tokens()
    }

    /// Like `check`, but never creates a bucket. An unknown pair reports the
    /// fill a new bucket would start with.
    pub fn peek(&self, principal: &str, resource: &str) -> f64 {
        let now = self.clock.now_ms();
        let key = BucketKey::new(principal, resource);
        let mut state = self.state();
        if let Some(bucket) = state.buckets.get_mut(&key) {
            bucket.refill(now);
            return bucket.tokens();
        }
        let cfg = bucket_shape(
            &state.principal_overrides,
            &state.resource_overrides,
            &key,
            &self.default_bucket,
        );
        TokenBucket::new(cfg, now).tokens()
    }

    /// Refill every bucket and reclaim expired reservations.
    /// Returns how many reservations were reclaimed.
    pub fn replenish(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.state();

        for bucket in state.buckets.values_mut() {
            bucket.refill(now);
        }

        let expired: Vec<String> = state
            .reservations
            .iter()
            .filter(|(_, r)| r.expires_at_ms < now)
            .map(|(id, _)| id.clone())
            .collect();

        let mut reclaimed = 0;
        for id in &expired {
            if state.release(id) {
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            tracing::debug!(reclaimed, "expired reservations reclaimed");
        }
        reclaimed
    }

    pub fn stats(&self) -> QuotaStats {
        let state = self.state();
        QuotaStats {
            buckets: state.buckets.len(),
            reservations: state.reservations.len(),
            total_tokens: state.buckets.values().map(TokenBucket::tokens).sum(),
        }
    }

    pub fn health_check(&self) -> HealthStatus {
        let s = self.stats();
        HealthStatus::new(
            true,
            format!(
                "QuotaEngine operational. {} buckets, {} active reservations",
                s.buckets, s.reservations
            ),
        )
    }
}
