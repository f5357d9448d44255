//! Delivery loop that feeds one queue into one consumer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::{Consumer, ConsumerError, Delivery, EventBus, NackOutcome, Result};

/// What the worker did with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handled and acknowledged.
    Acked,
    /// Handler failed on `attempt`; the message will be redelivered.
    Requeued { attempt: u32 },
    /// Handler failed on its last allowed `attempt`.
    DeadLettered { attempt: u32 },
}

/// Counters returned by [`ConsumerWorker::run_until_idle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub acked: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
}

impl WorkerStats {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Acked => self.acked += 1,
            DeliveryOutcome::Requeued { .. } => self.requeued += 1,
            DeliveryOutcome::DeadLettered { .. } => self.dead_lettered += 1,
        }
    }

    /// Total deliveries processed.
    pub fn processed(&self) -> usize {
        self.acked + self.requeued + self.dead_lettered
    }
}

/// Receives from a consumer's queue, invokes the consumer and settles each
/// delivery with ack or nack.
///
/// Several workers may share a queue; the bus leases each message to one
/// of them at a time.
pub struct ConsumerWorker {
    bus: Arc<dyn EventBus>,
    consumer: Arc<dyn Consumer>,
    poll_interval: Duration,
}

impl ConsumerWorker {
    /// Creates a worker with a 200ms idle poll interval.
    pub fn new(bus: Arc<dyn EventBus>, consumer: Arc<dyn Consumer>) -> Self {
        Self {
            bus,
            consumer,
            poll_interval: Duration::from_millis(200),
        }
    }

    /// Sets how long the worker sleeps when its queue is empty.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Name of the consumer driven by this worker.
    pub fn consumer_name(&self) -> &'static str {
        self.consumer.name()
    }

    /// Declares the consumer's queue and its bindings.
    ///
    /// Must run before anything is published, otherwise early messages
    /// have no queue to land in.
    pub async fn bind(&self) -> Result<()> {
        let event_types = self.consumer.event_types();
        self.bus.bind(self.consumer.queue(), &event_types).await?;
        tracing::info!(
            consumer = self.consumer.name(),
            queue = self.consumer.queue(),
            ?event_types,
            "queue bound"
        );
        Ok(())
    }

    /// Receives and settles at most one delivery.
    ///
    /// Returns `None` when nothing is due on the queue.
    pub async fn process_next(&self) -> Result<Option<DeliveryOutcome>> {
        let Some(delivery) = self.bus.receive(self.consumer.queue()).await? else {
            return Ok(None);
        };

        self.settle(delivery).await.map(Some)
    }

    #[tracing::instrument(
        skip(self, delivery),
        fields(
            consumer = self.consumer.name(),
            event_type = %delivery.envelope.event_type,
            event_id = %delivery.envelope.event_id,
            attempt = delivery.attempt,
        )
    )]
    async fn settle(&self, delivery: Delivery) -> Result<DeliveryOutcome> {
        let start = Instant::now();
        let result = self.handle_isolated(&delivery).await;
        metrics::histogram!("consumer_handle_duration_seconds", "consumer" => self.consumer.name())
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                self.bus.ack(&delivery).await?;
                tracing::debug!("delivery acknowledged");
                Ok(DeliveryOutcome::Acked)
            }
            Err(e) => {
                let reason = e.to_string();
                match self.bus.nack(&delivery, &reason).await? {
                    NackOutcome::Requeued { delay } => {
                        tracing::warn!(
                            error = %reason,
                            retry_in_ms = delay.as_millis() as u64,
                            "consumer failed, message requeued"
                        );
                        Ok(DeliveryOutcome::Requeued {
                            attempt: delivery.attempt,
                        })
                    }
                    NackOutcome::DeadLettered => {
                        tracing::error!(error = %reason, "consumer failed, message dead-lettered");
                        Ok(DeliveryOutcome::DeadLettered {
                            attempt: delivery.attempt,
                        })
                    }
                }
            }
        }
    }

    /// Runs the handler on its own task so a panic fails only this delivery.
    async fn handle_isolated(&self, delivery: &Delivery) -> std::result::Result<(), ConsumerError> {
        let consumer = self.consumer.clone();
        let envelope = delivery.envelope.clone();
        match tokio::spawn(async move { consumer.handle(&envelope).await }).await {
            Ok(result) => result,
            Err(e) => Err(ConsumerError::Other(format!("consumer panicked: {e}"))),
        }
    }

    /// Processes deliveries until nothing is due.
    ///
    /// Requeued messages whose backoff has not elapsed are left for later.
    pub async fn run_until_idle(&self) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();
        while let Some(outcome) = self.process_next().await? {
            stats.record(outcome);
        }
        Ok(stats)
    }

    /// Processes deliveries until `shutdown` becomes `true` or its sender
    /// is dropped.
    ///
    /// Bus errors are logged and the loop backs off for one poll interval.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            consumer = self.consumer.name(),
            queue = self.consumer.queue(),
            "consumer worker started"
        );

        while !*shutdown.borrow() {
            let idle = match self.process_next().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    tracing::error!(
                        consumer = self.consumer.name(),
                        error = %e,
                        "bus error in consumer worker"
                    );
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(consumer = self.consumer.name(), "consumer worker stopped");
    }
}
