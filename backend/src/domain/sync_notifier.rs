//! # Sync Notifier
//!
//! Payload-free publish/subscribe bus that lets one screen tell another to
//! reload. Callers notify only after their write has been persisted, so a
//! woken subscriber that re-fetches sees the new state.
//!
//! Delivery is a synchronous fan-out into per-subscriber channels. There is no
//! replay: a subscription only observes notifications sent after it was made.

use log::debug;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// The closed set of change kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEvent {
    ExpensesChanged,
    SavingsChanged,
}

impl SyncEvent {
    pub const ALL: [SyncEvent; 2] = [SyncEvent::ExpensesChanged, SyncEvent::SavingsChanged];
}

struct Subscriber {
    kinds: Vec<SyncEvent>,
    tx: UnboundedSender<SyncEvent>,
}

#[derive(Clone, Default)]
pub struct SyncNotifier {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    rx: UnboundedReceiver<SyncEvent>,
}

impl Subscription {
    /// Wait for the next notification
    pub async fn next(&mut self) -> Option<SyncEvent> {
        self.rx.recv().await
    }

    /// A pending notification, if one has already been delivered
    pub fn try_next(&mut self) -> Option<SyncEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Number of notifications delivered but not yet consumed
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while self.try_next().is_some() {
            n += 1;
        }
        n
    }
}

impl SyncNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kinds: &[SyncEvent]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock();
        subscribers.push(Subscriber {
            kinds: kinds.to_vec(),
            tx,
        });
        Subscription { rx }
    }

    /// Wake every current subscriber of `event` once. Returns how many were woken.
    pub fn notify(&self, event: SyncEvent) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.tx.is_closed());

        let woken = subscribers
            .iter()
            .filter(|s| s.kinds.contains(&event))
            .filter(|s| s.tx.send(event).is_ok())
            .count();
        debug!("{:?} delivered to {} subscriber(s)", event, woken);
        woken
    }

    pub fn notify_expense_changed(&self) -> usize {
        self.notify(SyncEvent::ExpensesChanged)
    }

    pub fn notify_savings_changed(&self) -> usize {
        self.notify(SyncEvent::SavingsChanged)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        // A panic while holding the lock cannot leave the list inconsistent
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
