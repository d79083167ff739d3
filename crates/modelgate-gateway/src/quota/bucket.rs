use modelgate_core::model::BucketConfig;

/// Bucket key: the literal `(principal, resource)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub principal: String,
    pub resource: String,
}

impl BucketKey {
    pub fn new(principal: &str, resource: &str) -> Self {
        Self {
            principal: principal.to_string(),
            resource: resource.to_string(),
        }
    }
}

/// Interval-based token bucket.
///
/// `0 <= tokens <= max_tokens` holds after every mutation.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    refill_interval_ms: u64,
    last_refill_ms: u64,
}

impl TokenBucket {
    pub fn new(cfg: &BucketConfig, now_ms: u64) -> Self {
        let max_tokens = cfg.max_tokens.max(0.0);
        Self {
            tokens: cfg.initial().clamp(0.0, max_tokens),
            max_tokens,
            refill_rate: cfg.refill_rate.max(0.0),
            refill_interval_ms: cfg.refill_interval_ms,
            last_refill_ms: now_ms,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Add `refill_rate` per whole elapsed interval. `last_refill_ms` advances
    /// by whole intervals only, so partial progress carries over.
    pub fn refill(&mut self, now_ms: u64) {
        if self.refill_interval_ms == 0 {
            return;
        }
        let elapsed = now_ms.saturating_sub(self.last_refill_ms);
        let intervals = elapsed / self.refill_interval_ms;
        if intervals == 0 {
            return;
        }
        let add = intervals as f64 * self.refill_rate;
        self.tokens = (self.tokens + add).min(self.max_tokens);
        self.last_refill_ms += intervals * self.refill_interval_ms;
    }

    /// Deduct `amount` if the bucket holds at least that much.
    pub fn try_take(&mut self, amount: f64) -> bool {
        if !amount.is_finite() || amount < 0.0 || self.tokens < amount {
            return false;
        }
        self.tokens -= amount;
        true
    }

    /// Return tokens, capped at `max_tokens`. Yields the amount actually credited.
    pub fn credit(&mut self, amount: f64) -> f64 {
        let before = self.tokens;
        self.tokens = (self.tokens + amount.max(0.0)).min(self.max_tokens);
        self.tokens - before
    }
}
