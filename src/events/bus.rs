use crate::events::producer::EventProducer;
use crate::events::types::EventEnvelope;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Deterministic intra-core fan-out plus best-effort out-of-process
/// delivery, per §4.10: publishing to a subscriber group never blocks
/// on the Kafka round trip, and a slow/absent broker never stalls
/// in-process consumers.
///
/// One `broadcast::Sender<EventEnvelope<T>>` per payload type `T`,
/// created lazily on first subscribe/publish. Subscribers that lag
/// behind the channel capacity miss the oldest events first
/// (`broadcast`'s own semantics) rather than blocking the publisher.
pub struct EventBus {
    channels: Mutex<HashMap<TypeId, Box<dyn Any + Send>>>,
    capacity: usize,
    producer: Option<EventProducer>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
            producer: None,
        }
    }

    pub fn with_producer(mut self, producer: EventProducer) -> Self {
        self.producer = Some(producer);
        self
    }

    fn sender<T: Send + Sync + Clone + 'static>(&self) -> broadcast::Sender<EventEnvelope<T>> {
        let mut channels = self.channels.lock().expect("event bus mutex poisoned");
        let entry = channels
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel::<EventEnvelope<T>>(self.capacity);
                Box::new(tx)
            });
        entry
            .downcast_ref::<broadcast::Sender<EventEnvelope<T>>>()
            .expect("event bus type map corrupted")
            .clone()
    }

    /// In-process fan-out to every current subscriber of `T`.
    pub fn subscribe<T: Send + Sync + Clone + 'static>(&self) -> broadcast::Receiver<EventEnvelope<T>> {
        self.sender::<T>().subscribe()
    }

    /// Publishes in-process (synchronous, never fails if nobody is
    /// listening) and, when a producer is configured, asynchronously
    /// mirrors the event out-of-process on its family topic.
    pub async fn publish<T>(&self, envelope: EventEnvelope<T>)
    where
        T: Serialize + Send + Sync + Clone + 'static,
    {
        let topic = envelope.topic();
        let _ = self.sender::<T>().send(envelope.clone());

        if let Some(producer) = &self.producer {
            if let Err(err) = producer.send(topic, Some(&envelope.subject.to_string()), &envelope).await {
                tracing::warn!(topic, error = %err, "out-of-process event publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{EventType, RefundIssued};
    use crate::models::Currency;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscriber_receives_published_envelope() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe::<RefundIssued>();

        let subject = Uuid::new_v4();
        let envelope = EventEnvelope::new(
            EventType::RefundIssued,
            subject,
            RefundIssued {
                refund_id: Uuid::new_v4(),
                transaction_id: subject,
                amount_minor: 1200,
                currency: Currency::USD,
            },
        );
        bus.publish(envelope.clone()).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_id, envelope.event_id);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new(16);
        let subject = Uuid::new_v4();
        bus.publish(EventEnvelope::new(
            EventType::RefundIssued,
            subject,
            RefundIssued {
                refund_id: Uuid::new_v4(),
                transaction_id: subject,
                amount_minor: 1200,
                currency: Currency::USD,
            },
        ))
        .await;
    }
}
