//! StageBus — publish/subscribe fan-out of stage events
//!
//! Subscribers own a channel receiver. Detaching is deterministic: either
//! call [`StageBus::unsubscribe`] or drop the receiver, and the sender is
//! pruned on the next publish.

use crossbeam_channel::{Receiver, Sender, TryIter, unbounded};

use crate::event::StageEvent;

/// Subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving half of a bus subscription
pub struct StageSubscription {
    id: SubscriptionId,
    rx: Receiver<StageEvent>,
}

impl StageSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Drain everything published so far without blocking
    pub fn try_iter(&self) -> TryIter<'_, StageEvent> {
        self.rx.try_iter()
    }

    /// Collect everything published so far
    pub fn drain(&self) -> Vec<StageEvent> {
        self.rx.try_iter().collect()
    }
}

/// Fan-out bus
#[derive(Default)]
pub struct StageBus {
    subscribers: Vec<(SubscriptionId, Sender<StageEvent>)>,
    next_id: u64,
}

impl StageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> StageSubscription {
        let (tx, rx) = unbounded();
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, tx));
        StageSubscription { id, rx }
    }

    /// Detach a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver to every live subscriber, pruning disconnected ones
    pub fn publish(&mut self, event: &StageEvent) {
        self.subscribers.retain(|(id, tx)| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                log::debug!("stage subscriber {:?} disconnected", id);
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;

    #[test]
    fn test_fan_out() {
        let mut bus = StageBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(&StageEvent::new(Stage::GateOpen, 0.0));

        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
    }

    #[test]
    fn test_unsubscribe_and_drop_detach() {
        let mut bus = StageBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        assert!(bus.unsubscribe(a.id()));
        assert!(!bus.unsubscribe(a.id()));

        drop(b);
        bus.publish(&StageEvent::new(Stage::GateClose, 1.0));
        assert_eq!(bus.subscriber_count(), 0);
        assert!(a.drain().is_empty());
    }
}
