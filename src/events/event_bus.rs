use super::types::Event;
use log::{debug, trace};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// In-process broadcast relay for [`Event`]s.
///
/// Each subscriber owns an unbounded queue, so a publisher never waits on a
/// consumer and a stalled consumer only grows its own backlog. Subscribers see
/// every event published after they subscribed, in publish order. Nothing is
/// retained for late subscribers.
///
/// Cloning the bus is cheap and every clone publishes to the same subscribers.
///
/// # Examples
///
/// ```
/// # tokio_test::block_on(async {
/// use snare::events::event_bus::EventBus;
///
/// let bus = EventBus::new();
/// let mut monitor = bus.subscribe();
/// assert_eq!(bus.subscriber_count(), 1);
/// drop(bus);
/// assert!(monitor.recv().await.is_none());
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Debug, Default)]
struct BusState {
    subscribers: Vec<UnboundedSender<Event>>,
    closed: bool,
}

/// Receiving half handed out by [`EventBus::subscribe`].
///
/// Dropping it unregisters the consumer on the next publish.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: UnboundedReceiver<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock();
        if state.closed {
            // Dropping the sender ends the subscription straight away.
            debug!("Subscription refused, event bus closed");
            return EventSubscription { receiver };
        }
        state.subscribers.push(sender);
        debug!("Event bus subscriber registered ({} total)", state.subscribers.len());
        EventSubscription { receiver }
    }

    /// Delivers a copy of `event` to every live subscriber.
    ///
    /// Subscribers whose receiving half was dropped are pruned. Returns the
    /// number of subscribers the event reached.
    pub fn publish(&self, event: Event) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        trace!(
            "Published {} event to {} subscriber(s)",
            event.kind().as_str(),
            state.subscribers.len()
        );
        state.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Ends every subscription, for all clones at once.
    ///
    /// Subscribers still drain their backlog before seeing `None`. Later
    /// publishes reach nobody and later subscriptions end immediately.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.subscribers.len();
        state.subscribers.clear();
        debug!("Event bus closed, {} subscriber(s) released", dropped);
    }

    // The state is only touched through calls that cannot panic midway, so a
    // poisoned lock still guards a consistent list.
    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSubscription {
    /// Waits for the next event. `None` once the bus is closed (or every
    /// clone is gone) and the backlog is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`EventSubscription::recv`]; `None` when the
    /// backlog is currently empty.
    pub fn try_recv(&mut self) -> Option<Event> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{EventKind, NetworkEvent};
    use chrono::Utc;

    fn generic(n: u16) -> Event {
        Event::Generic(NetworkEvent {
            session_id: None,
            ts: Utc::now(),
            src_ip: "10.0.0.1".parse().unwrap(),
            src_port: Some(n),
            dest_port: Some(2222),
            protocol: Some("tcp".to_string()),
            service: None,
            payload_preview: None,
        })
    }

    fn port_of(event: &Event) -> Option<u16> {
        match event {
            Event::Generic(e) => e.src_port,
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_every_consumer_gets_every_event_in_order() {
        let bus = EventBus::new();
        let mut consumers: Vec<EventSubscription> = (0..4).map(|_| bus.subscribe()).collect();

        for n in 0..100 {
            assert_eq!(bus.publish(generic(n)), 4);
        }

        for consumer in consumers.iter_mut() {
            for n in 0..100 {
                let event = consumer.recv().await.unwrap();
                assert_eq!(port_of(&event), Some(n));
            }
            assert!(consumer.try_recv().is_none());
        }
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscriber() {
        let bus = EventBus::new();
        bus.publish(generic(1));

        let mut late = bus.subscribe();
        bus.publish(generic(2));

        assert_eq!(port_of(&late.recv().await.unwrap()), Some(2));
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let mut kept = bus.subscribe();
        let dropped = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        assert_eq!(bus.publish(generic(7)), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.recv().await.unwrap().kind(), EventKind::Generic);
    }

    #[tokio::test]
    async fn test_stalled_consumer_does_not_block_publishers() {
        let bus = EventBus::new();
        let _stalled = bus.subscribe();
        let mut active = bus.subscribe();

        for n in 0..10_000 {
            bus.publish(generic(n));
        }
        assert_eq!(port_of(&active.recv().await.unwrap()), Some(0));
    }

    #[tokio::test]
    async fn test_concurrent_producers_preserve_per_producer_order() {
        let bus = EventBus::new();
        let mut consumer = bus.subscribe();

        let producers: Vec<_> = (0..4u16)
            .map(|p| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for n in 0..50 {
                        bus.publish(generic(p * 1000 + n));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        drop(bus);

        let mut last = [None::<u16>; 4];
        let mut total = 0;
        while let Some(event) = consumer.recv().await {
            let port = port_of(&event).unwrap();
            let producer = (port / 1000) as usize;
            if let Some(previous) = last[producer] {
                assert!(port > previous);
            }
            last[producer] = Some(port);
            total += 1;
        }
        assert_eq!(total, 200);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions_while_clones_live() {
        let bus = EventBus::new();
        let held = bus.clone();
        let mut consumer = bus.subscribe();
        bus.publish(generic(1));

        held.close();
        assert_eq!(bus.publish(generic(2)), 0);
        assert_eq!(port_of(&consumer.recv().await.unwrap()), Some(1));
        assert!(consumer.recv().await.is_none());

        let mut late = bus.subscribe();
        assert!(late.recv().await.is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
