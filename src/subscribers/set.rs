//! # Subscriber fan-out
//!
//! `SubscriberSet` owns one worker per subscriber plus a bounded queue in
//! front of it, and fans each engine event out to every queue.
//!
//! ```text
//!                    emit(&event)
//!                         |
//!            +------------+------------+
//!            |            |            |
//!        [queue A]    [queue B]    [queue C]      (bounded, per subscriber)
//!            |            |            |
//!        worker A     worker B     worker C       (io lane)
//!            |            |            |
//!        on_event     on_event     on_event
//! ```
//!
//! ## Rules
//! - A slow subscriber only ever loses **its own** events: `emit` uses
//!   `try_send` and never waits for a full queue.
//! - A dropped event is reported as a `SubscriberOverflow` event on the
//!   broadcast bus.
//! - Subscriber diagnostics (`SubscriberOverflow`, `SubscriberPanicked`) stay
//!   on the broadcast bus and are never queued for subscribers; feeding them
//!   back would let one failing subscriber ping-pong with its own reports.
//! - A panicking subscriber does not kill its worker: the panic is caught and
//!   published as `SubscriberPanicked`, and the worker keeps draining.

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Slot {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out stage between the event bus and the registered subscribers.
pub struct SubscriberSet {
    slots: Mutex<Vec<Slot>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber on `handle` and wires up the queues.
    pub(crate) fn new(subscribers: Vec<Arc<dyn Subscribe>>, bus: Bus, handle: &Handle) -> Self {
        let mut slots = Vec::with_capacity(subscribers.len());
        let mut workers = Vec::with_capacity(subscribers.len());

        for subscriber in subscribers {
            let name = subscriber.name();
            let capacity = subscriber.queue_capacity().max(1);
            let (tx, rx) = mpsc::channel::<Arc<Event>>(capacity);

            slots.push(Slot { name, tx });
            workers.push(handle.spawn(worker_loop(subscriber, rx, bus.clone())));
        }

        Self {
            slots: Mutex::new(slots),
            workers: Mutex::new(workers),
            bus,
        }
    }

    /// Fans `event` out to every subscriber queue without waiting.
    ///
    /// Full or closed queues drop the event for that subscriber only.
    pub(crate) fn emit(&self, event: &Arc<Event>) {
        if event.is_subscriber_overflow() || event.is_subscriber_panic() {
            return;
        }
        for slot in self.slots.lock().iter() {
            match slot.tx.try_send(Arc::clone(event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.bus.publish(Event::subscriber_overflow(slot.name, "queue full"));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.bus.publish(Event::subscriber_overflow(slot.name, "worker gone"));
                }
            }
        }
    }

    /// Closes all queues and waits for the workers to drain what was already
    /// enqueued.
    pub(crate) async fn shutdown(&self) {
        self.slots.lock().clear();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// `true` when no subscribers are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

async fn worker_loop(subscriber: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(event) = rx.recv().await {
        let outcome = std::panic::AssertUnwindSafe(subscriber.on_event(&event))
            .catch_unwind()
            .await;
        if let Err(payload) = outcome {
            let info = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "opaque panic payload".to_string());
            bus.publish(Event::subscriber_panicked(subscriber.name(), info));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::events::EventKind;

    struct Counting {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Subscribe for Counting {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _event: &Event) {
            panic!("boom");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[tokio::test]
    async fn test_events_reach_every_subscriber() {
        let bus = Bus::new(64);
        let counting = Arc::new(Counting {
            seen: AtomicUsize::new(0),
        });
        let set = SubscriberSet::new(
            vec![counting.clone() as Arc<dyn Subscribe>],
            bus,
            &Handle::current(),
        );

        for _ in 0..3 {
            set.emit(&Arc::new(Event::new(EventKind::ShutdownRequested)));
        }
        set.shutdown().await;

        assert_eq!(counting.seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_reported_and_survives() {
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let set = SubscriberSet::new(
            vec![Arc::new(Panicky) as Arc<dyn Subscribe>],
            bus,
            &Handle::current(),
        );

        set.emit(&Arc::new(Event::new(EventKind::ShutdownRequested)));
        set.emit(&Arc::new(Event::new(EventKind::ShutdownRequested)));
        set.shutdown().await;

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert!(first.is_subscriber_panic());
        assert!(second.is_subscriber_panic());
    }
}
