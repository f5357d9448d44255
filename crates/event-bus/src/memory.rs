use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{
    BusError, DeadLetter, Delivery, DeliveryTag, EventBus, EventEnvelope, LEASE_EXPIRED,
    NackOutcome, Result, RetryPolicy,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    envelope: EventEnvelope,
    deliveries: u32,
    available_at: Instant,
}

#[derive(Debug, Clone)]
struct Lease {
    message: StoredMessage,
    leased_until: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    event_types: HashSet<String>,
    ready: VecDeque<StoredMessage>,
    leased: HashMap<DeliveryTag, Lease>,
    dead: Vec<DeadLetter>,
}

impl QueueState {
    /// Returns expired leases to the ready list so they can be delivered
    /// again, or dead-letters them once the attempt budget is spent.
    fn reclaim_expired(&mut self, queue: &str, policy: &RetryPolicy, now: Instant) {
        let expired: Vec<DeliveryTag> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.leased_until <= now)
            .map(|(tag, _)| *tag)
            .collect();

        for tag in expired {
            let Some(lease) = self.leased.remove(&tag) else {
                continue;
            };
            let message = lease.message;

            if policy.is_exhausted(message.deliveries) {
                tracing::error!(
                    %tag,
                    event_id = %message.envelope.event_id,
                    attempts = message.deliveries,
                    "lease expired on last attempt, message dead-lettered"
                );
                self.dead.push(DeadLetter {
                    queue: queue.to_string(),
                    envelope: message.envelope,
                    attempts: message.deliveries,
                    last_error: LEASE_EXPIRED.to_string(),
                    dead_lettered_at: Utc::now(),
                });
                metrics::counter!("bus_messages_dead_lettered_total").increment(1);
            } else {
                tracing::debug!(%tag, "lease expired, message returned to queue");
                metrics::counter!("bus_messages_redelivered_total").increment(1);
                self.ready.push_front(message);
            }
        }
    }
}

#[derive(Debug, Default)]
struct BusState {
    queues: BTreeMap<String, QueueState>,
    next_tag: i64,
}

/// In-memory event bus.
///
/// Provides the same delivery semantics as the PostgreSQL bus (leases,
/// backoff, dead letters) without durability across process restarts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
    policy: RetryPolicy,
}

impl InMemoryEventBus {
    /// Creates a new bus with the default retry policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new bus with the given retry policy.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            state: Arc::default(),
            policy,
        }
    }

    /// Returns the retry policy of this bus.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the names of all declared queues.
    pub async fn queues(&self) -> Vec<String> {
        self.state.lock().await.queues.keys().cloned().collect()
    }

    /// Returns the number of deliveries currently leased on `queue`.
    pub async fn leased_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map(|q| q.leased.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn bind(&self, queue: &str, event_types: &[&str]) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state.queues.entry(queue.to_string()).or_default();
        entry
            .event_types
            .extend(event_types.iter().map(|t| t.to_string()));
        Ok(())
    }

    async fn publish(&self, envelope: EventEnvelope) -> Result<usize> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut routed = 0;

        for queue in state.queues.values_mut() {
            if queue.event_types.contains(&envelope.event_type) {
                queue.ready.push_back(StoredMessage {
                    envelope: envelope.clone(),
                    deliveries: 0,
                    available_at: now,
                });
                routed += 1;
            }
        }

        if routed == 0 {
            tracing::warn!(
                event_type = %envelope.event_type,
                event_id = %envelope.event_id,
                "no queue bound for event type, message dropped"
            );
        }
        metrics::counter!("bus_messages_published_total").increment(1);

        Ok(routed)
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut state = self.state.lock().await;
        state.next_tag += 1;
        let tag = DeliveryTag::new(state.next_tag);

        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;

        let now = Instant::now();
        queue_state.reclaim_expired(queue, &self.policy, now);

        let Some(position) = queue_state
            .ready
            .iter()
            .position(|m| m.available_at <= now)
        else {
            return Ok(None);
        };
        let Some(mut message) = queue_state.ready.remove(position) else {
            return Ok(None);
        };

        message.deliveries += 1;
        let delivery = Delivery {
            tag,
            queue: queue.to_string(),
            attempt: message.deliveries,
            envelope: message.envelope.clone(),
        };
        queue_state.leased.insert(
            tag,
            Lease {
                message,
                leased_until: now + self.policy.visibility_timeout,
            },
        );

        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| BusError::UnknownQueue(delivery.queue.clone()))?;

        queue_state
            .leased
            .remove(&delivery.tag)
            .ok_or_else(|| BusError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag,
            })?;

        metrics::counter!("bus_messages_acked_total").increment(1);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome> {
        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| BusError::UnknownQueue(delivery.queue.clone()))?;

        let lease =
            queue_state
                .leased
                .remove(&delivery.tag)
                .ok_or_else(|| BusError::UnknownDelivery {
                    queue: delivery.queue.clone(),
                    tag: delivery.tag,
                })?;
        let mut message = lease.message;

        if self.policy.is_exhausted(message.deliveries) {
            queue_state.dead.push(DeadLetter {
                queue: delivery.queue.clone(),
                envelope: message.envelope,
                attempts: message.deliveries,
                last_error: reason.to_string(),
                dead_lettered_at: Utc::now(),
            });
            metrics::counter!("bus_messages_dead_lettered_total").increment(1);
            return Ok(NackOutcome::DeadLettered);
        }

        let delay = self.policy.backoff_for(message.deliveries);
        message.available_at = Instant::now() + delay;
        queue_state.ready.push_back(message);
        metrics::counter!("bus_messages_redelivered_total").increment(1);

        Ok(NackOutcome::Requeued { delay })
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.dead.clone())
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))
    }

    async fn pending_count(&self, queue: &str) -> Result<usize> {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.ready.len() + q.leased.len())
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn envelope(event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type(event_type)
            .payload_raw(serde_json::json!({"n": 1}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn publish_routes_by_event_type() {
        let bus = InMemoryEventBus::new();
        bus.bind("inventory", &["HarvestCreated"]).await.unwrap();
        bus.bind("billing", &["HarvestInProcess"]).await.unwrap();

        let routed = bus.publish(envelope("HarvestCreated")).await.unwrap();

        assert_eq!(routed, 1);
        assert_eq!(bus.pending_count("inventory").await.unwrap(), 1);
        assert_eq!(bus.pending_count("billing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn publish_fans_out_to_every_bound_queue() {
        let bus = InMemoryEventBus::new();
        bus.bind("a", &["E"]).await.unwrap();
        bus.bind("b", &["E"]).await.unwrap();

        assert_eq!(bus.publish(envelope("E")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unbound_event_is_dropped() {
        let bus = InMemoryEventBus::new();
        bus.bind("a", &["E"]).await.unwrap();

        assert_eq!(bus.publish(envelope("Other")).await.unwrap(), 0);
        assert_eq!(bus.pending_count("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn receive_from_unknown_queue_fails() {
        let bus = InMemoryEventBus::new();
        assert!(matches!(
            bus.receive("missing").await,
            Err(BusError::UnknownQueue(_))
        ));
    }

    #[tokio::test]
    async fn ack_removes_message() {
        let bus = InMemoryEventBus::new();
        bus.bind("q", &["E"]).await.unwrap();
        bus.publish(envelope("E")).await.unwrap();

        let delivery = bus.receive("q").await.unwrap().unwrap();
        assert_eq!(delivery.attempt, 1);
        assert!(!delivery.is_redelivery());
        assert_eq!(bus.leased_count("q").await, 1);

        bus.ack(&delivery).await.unwrap();
        assert_eq!(bus.pending_count("q").await.unwrap(), 0);
        assert!(bus.receive("q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn double_ack_fails() {
        let bus = InMemoryEventBus::new();
        bus.bind("q", &["E"]).await.unwrap();
        bus.publish(envelope("E")).await.unwrap();

        let delivery = bus.receive("q").await.unwrap().unwrap();
        bus.ack(&delivery).await.unwrap();
        assert!(matches!(
            bus.ack(&delivery).await,
            Err(BusError::UnknownDelivery { .. })
        ));
    }

    #[tokio::test]
    async fn nack_requeues_then_dead_letters() {
        let bus = InMemoryEventBus::with_policy(RetryPolicy::immediate(2));
        bus.bind("q", &["E"]).await.unwrap();
        let published = envelope("E");
        bus.publish(published.clone()).await.unwrap();

        let first = bus.receive("q").await.unwrap().unwrap();
        let outcome = bus.nack(&first, "boom").await.unwrap();
        assert_eq!(
            outcome,
            NackOutcome::Requeued {
                delay: Duration::ZERO
            }
        );

        let second = bus.receive("q").await.unwrap().unwrap();
        assert_eq!(second.attempt, 2);
        assert!(second.is_redelivery());
        assert_eq!(second.envelope.event_id, published.event_id);

        let outcome = bus.nack(&second, "boom again").await.unwrap();
        assert_eq!(outcome, NackOutcome::DeadLettered);

        assert!(bus.receive("q").await.unwrap().is_none());
        let dead = bus.dead_letters("q").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(dead[0].last_error, "boom again");
        assert_eq!(dead[0].envelope.event_id, published.event_id);
    }

    #[tokio::test(start_paused = true)]
    async fn requeued_message_waits_for_backoff() {
        let bus = InMemoryEventBus::with_policy(RetryPolicy::new(5, Duration::from_secs(1)));
        bus.bind("q", &["E"]).await.unwrap();
        bus.publish(envelope("E")).await.unwrap();

        let delivery = bus.receive("q").await.unwrap().unwrap();
        bus.nack(&delivery, "later").await.unwrap();

        assert!(bus.receive("q").await.unwrap().is_none());

        tokio::time::advance(Duration::from_millis(1001)).await;
        let again = bus.receive("q").await.unwrap().unwrap();
        assert_eq!(again.attempt, 2);
    }

    #[tokio::test]
    async fn expired_lease_is_redelivered() {
        let policy = RetryPolicy::immediate(5).with_visibility_timeout(Duration::ZERO);
        let bus = InMemoryEventBus::with_policy(policy);
        bus.bind("q", &["E"]).await.unwrap();
        bus.publish(envelope("E")).await.unwrap();

        let first = bus.receive("q").await.unwrap().unwrap();
        let second = bus.receive("q").await.unwrap().unwrap();

        assert_eq!(first.envelope.event_id, second.envelope.event_id);
        assert_eq!(second.attempt, 2);
        assert_ne!(first.tag, second.tag);

        // The stale lease can no longer be acknowledged.
        assert!(bus.ack(&first).await.is_err());
        bus.ack(&second).await.unwrap();
    }

    #[tokio::test]
    async fn expired_lease_on_last_attempt_is_dead_lettered() {
        let policy = RetryPolicy::immediate(3).with_visibility_timeout(Duration::ZERO);
        let bus = InMemoryEventBus::with_policy(policy);
        bus.bind("q", &["E"]).await.unwrap();
        let published = envelope("E");
        bus.publish(published.clone()).await.unwrap();

        // Never settled: every lease runs out.
        for attempt in 1..=3 {
            let delivery = bus.receive("q").await.unwrap().unwrap();
            assert_eq!(delivery.attempt, attempt);
        }

        assert!(bus.receive("q").await.unwrap().is_none());
        assert_eq!(bus.pending_count("q").await.unwrap(), 0);

        let dead = bus.dead_letters("q").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(dead[0].last_error, LEASE_EXPIRED);
        assert_eq!(dead[0].envelope.event_id, published.event_id);
    }

    #[tokio::test]
    async fn bind_is_idempotent_and_additive() {
        let bus = InMemoryEventBus::new();
        bus.bind("q", &["A"]).await.unwrap();
        bus.bind("q", &["A", "B"]).await.unwrap();

        assert_eq!(bus.queues().await, vec!["q".to_string()]);
        assert_eq!(bus.publish(envelope("A")).await.unwrap(), 1);
        assert_eq!(bus.publish(envelope("B")).await.unwrap(), 1);
        assert_eq!(bus.pending_count("q").await.unwrap(), 2);
    }
}
