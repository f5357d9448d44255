use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventEnvelope, Result};

/// Handle for one leased delivery, used to ack or nack it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DeliveryTag(i64);

impl DeliveryTag {
    /// Creates a tag from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw tag value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message leased to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Lease handle for ack/nack.
    pub tag: DeliveryTag,

    /// Queue the message was received from.
    pub queue: String,

    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,

    /// The message itself.
    pub envelope: EventEnvelope,
}

impl Delivery {
    /// Returns true if this message was delivered before.
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// A message that exhausted its delivery attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub queue: String,
    pub envelope: EventEnvelope,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// `last_error` of a message dead-lettered because its final lease ran out
/// without an ack or nack.
pub const LEASE_EXPIRED: &str = "lease expired";

/// What happened to a negatively acknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// The message returns to the queue after `delay`.
    Requeued { delay: Duration },

    /// The message moved to the dead-letter store.
    DeadLettered,
}

/// Redelivery policy shared by every queue of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deliveries allowed before a message is dead-lettered.
    pub max_attempts: u32,

    /// Delay before the first redelivery; doubles on every further failure.
    pub base_backoff: Duration,

    /// Upper bound on the redelivery delay.
    pub max_backoff: Duration,

    /// How long a delivery may stay unacknowledged before it is handed out again.
    pub visibility_timeout: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and base backoff.
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            ..Self::default()
        }
    }

    /// A policy that redelivers without delay. Intended for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Overrides the visibility timeout.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Delay before redelivering a message that failed on delivery `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Returns true if a failure on delivery `attempt` exhausts the budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

/// Durable pub/sub transport.
///
/// Implementations must be safe to share across tasks; several workers may
/// receive from the same queue concurrently and each message is leased to
/// one of them at a time.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Declares `queue` and binds it to `event_types`.
    ///
    /// Binding is additive and idempotent.
    async fn bind(&self, queue: &str, event_types: &[&str]) -> Result<()>;

    /// Routes an envelope to every queue bound to its event type.
    ///
    /// Returns the number of queues that received a copy.
    async fn publish(&self, envelope: EventEnvelope) -> Result<usize>;

    /// Leases the oldest due message of `queue`, if any.
    async fn receive(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Acknowledges a delivery, removing the message from its queue.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Rejects a delivery, requeueing it with backoff or dead-lettering it.
    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome>;

    /// Returns the dead letters of `queue`, oldest first.
    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>>;

    /// Returns the number of messages in `queue` that are waiting or leased.
    async fn pending_count(&self, queue: &str) -> Result<usize>;
}
