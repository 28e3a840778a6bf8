use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::protocol::{BusEvent, Topic};

/// What a handler returns; errors are logged by the bus and never reach the
/// publisher.
pub type HandlerResult = anyhow::Result<()>;

type Handler = Rc<dyn Fn(&BusEvent) -> HandlerResult>;

/// Identifies one handler registration for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    topic: Topic,
    id: u64,
}

impl SubscriptionToken {
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// Outcome of one [`EventBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Registration {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    next_id: Cell<u64>,
    handlers: RefCell<HashMap<Topic, Vec<Registration>>>,
    channels: RefCell<Vec<(Topic, flume::Sender<BusEvent>)>>,
}

/// Topic-keyed publish/subscribe hub decoupling UI, auth and chat.
///
/// Delivery is synchronous: `publish` returns after every handler that was
/// registered for the topic has run, in registration order. A handler that
/// fails or panics is logged and skipped; the rest still run. The handler
/// list is snapshotted per publish, so handlers registered during a publish
/// only see later events, and handlers removed during a publish are not
/// called again.
///
/// Besides callbacks, [`subscribe_channel`](Self::subscribe_channel) hands out
/// flume receivers for consumers that prefer to drain events in their own
/// loop. Receivers that have been dropped are pruned on the next publish.
///
/// The bus is single-threaded and cloned cheaply (it wraps an `Rc`).
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`.
    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl Fn(&BusEvent) -> HandlerResult + 'static,
    ) -> SubscriptionToken {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .handlers
            .borrow_mut()
            .entry(topic)
            .or_default()
            .push(Registration {
                id,
                handler: Rc::new(handler),
            });
        SubscriptionToken { topic, id }
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut handlers = self.inner.handlers.borrow_mut();
        let Some(list) = handlers.get_mut(&token.topic) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != token.id);
        before != list.len()
    }

    /// Receive every future event on `topic` through a channel.
    pub fn subscribe_channel(&self, topic: Topic) -> flume::Receiver<BusEvent> {
        let (tx, rx) = flume::unbounded();
        self.inner.channels.borrow_mut().push((topic, tx));
        rx
    }

    /// Deliver `event` to every current subscriber of its topic.
    pub fn publish(&self, event: BusEvent) -> DeliveryReport {
        let topic = event.topic();
        let snapshot: Vec<(u64, Handler)> = self
            .inner
            .handlers
            .borrow()
            .get(&topic)
            .map(|list| list.iter().map(|r| (r.id, Rc::clone(&r.handler))).collect())
            .unwrap_or_default();

        tracing::trace!(topic = %topic, handlers = snapshot.len(), "publishing");

        let mut report = DeliveryReport::default();
        for (id, handler) in snapshot {
            if !self.is_registered(topic, id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(topic = %topic, error = %e, "bus handler failed");
                }
                Err(payload) => {
                    report.failed += 1;
                    tracing::error!(
                        topic = %topic,
                        panic = panic_message(payload.as_ref()),
                        "bus handler panicked"
                    );
                }
            }
        }

        let mut channels = self.inner.channels.borrow_mut();
        channels.retain(|(t, tx)| {
            if *t != topic {
                return true;
            }
            let ok = tx.send(event.clone()).is_ok();
            if ok {
                report.delivered += 1;
            }
            ok
        });

        report
    }

    /// Number of live subscribers (handlers plus channels) on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        let handlers = self
            .inner
            .handlers
            .borrow()
            .get(&topic)
            .map_or(0, Vec::len);
        let channels = self
            .inner
            .channels
            .borrow()
            .iter()
            .filter(|(t, tx)| *t == topic && !tx.is_disconnected())
            .count();
        handlers + channels
    }

    fn is_registered(&self, topic: Topic, id: u64) -> bool {
        self.inner
            .handlers
            .borrow()
            .get(&topic)
            .is_some_and(|list| list.iter().any(|r| r.id == id))
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.inner.channels.borrow().len())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
