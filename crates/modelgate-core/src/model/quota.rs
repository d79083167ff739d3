//! Token-bucket quota types.

use serde::{Deserialize, Serialize};

/// Bucket shape. `refill_rate` tokens are added per `refill_interval_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    pub max_tokens: f64,
    pub refill_rate: f64,
    pub refill_interval_ms: u64,
    /// Starting fill; defaults to `max_tokens`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_tokens: Option<f64>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100.0,
            refill_rate: 10.0,
            refill_interval_ms: 60_000,
            initial_tokens: None,
        }
    }
}

impl BucketConfig {
    pub fn initial(&self) -> f64 {
        self.initial_tokens.unwrap_or(self.max_tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRequest {
    pub principal: String,
    pub resource: String,
    pub tokens: f64,
}

impl QuotaRequest {
    pub fn new(principal: impl Into<String>, resource: impl Into<String>, tokens: f64) -> Self {
        Self {
            principal: principal.into(),
            resource: resource.into(),
            tokens,
        }
    }
}

/// Returned by every `reserve` call, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaReservation {
    pub id: String,
    pub available: bool,
    /// Zero when `available` is false.
    pub tokens_reserved: f64,
    pub tokens_remaining: f64,
    pub expires_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Monitoring snapshot of a quota engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaStats {
    pub buckets: usize,
    pub reservations: usize,
    pub total_tokens: f64,
}
