//! In-process flight registry.
//!
//! One entry per [`OperationKey`] currently executing on this node. The
//! first caller for a key becomes the executor and receives a
//! [`FlightGuard`]; later callers receive a [`Waiter`] subscribed to the same
//! `watch` channel. Completing the guard removes the entry and publishes the
//! result in one critical section, so a caller arriving afterwards always
//! starts a fresh flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arraylink_types::OperationKey;
use tokio::sync::watch;
use tracing::debug;

use crate::FlightError;

type Slot<V, E> = Option<Result<V, E>>;

struct Flight<V, E> {
    id: u64,
    rx: watch::Receiver<Slot<V, E>>,
}

/// Registry of flights in progress on this node.
pub(crate) struct FlightRegistry<V, E> {
    inflight: Mutex<HashMap<OperationKey, Flight<V, E>>>,
    next_id: AtomicU64,
}

/// Role handed to a caller of [`FlightRegistry::claim`].
pub(crate) enum Role<V, E>
where
    V: Clone,
    E: Clone + From<FlightError>,
{
    Executor(FlightGuard<V, E>),
    Waiter(Waiter<V, E>),
}

impl<V, E> FlightRegistry<V, E>
where
    V: Clone,
    E: Clone + From<FlightError>,
{
    pub(crate) fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationKey, Flight<V, E>>> {
        // The map holds no invariant a panicking holder could break halfway.
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins the flight for `key`, or opens one if none exists.
    pub(crate) fn claim(self: &Arc<Self>, key: &OperationKey) -> Role<V, E> {
        let mut inflight = self.lock();

        if let Some(flight) = inflight.get(key) {
            return Role::Waiter(Waiter {
                key: key.clone(),
                rx: flight.rx.clone(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        inflight.insert(key.clone(), Flight { id, rx });

        Role::Executor(FlightGuard {
            registry: Arc::clone(self),
            key: key.clone(),
            id,
            tx: Some(tx),
        })
    }

    pub(crate) fn contains(&self, key: &OperationKey) -> bool {
        self.lock().contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Removes the flight `id` for `key` and, if given, publishes `result`.
    fn finish(&self, key: &OperationKey, id: u64, tx: watch::Sender<Slot<V, E>>, result: Slot<V, E>) {
        let mut inflight = self.lock();
        if inflight.get(key).is_some_and(|flight| flight.id == id) {
            inflight.remove(key);
        }
        if result.is_some() {
            tx.send_replace(result);
        }
        // Dropping `tx` with no value closes the channel: waiters see `Abandoned`.
        drop(tx);
    }
}

/// Held by the executor of a flight until it delivers the result.
///
/// Dropping the guard without calling [`FlightGuard::complete`] clears the
/// flight and fails its waiters with [`FlightError::Abandoned`].
pub(crate) struct FlightGuard<V, E>
where
    V: Clone,
    E: Clone + From<FlightError>,
{
    registry: Arc<FlightRegistry<V, E>>,
    key: OperationKey,
    id: u64,
    tx: Option<watch::Sender<Slot<V, E>>>,
}

impl<V, E> FlightGuard<V, E>
where
    V: Clone,
    E: Clone + From<FlightError>,
{
    /// A waiter on this guard's own flight, for a caller that opened the
    /// flight but hands the execution to someone else.
    pub(crate) fn subscribe(&self) -> Waiter<V, E> {
        let rx = match &self.tx {
            Some(tx) => tx.subscribe(),
            // Unreachable while the guard is alive; a fresh closed channel
            // reports abandonment.
            None => watch::channel(None).1,
        };
        Waiter {
            key: self.key.clone(),
            rx,
        }
    }

    /// Clears the flight and hands `result` to every waiter.
    pub(crate) fn complete(mut self, result: Result<V, E>) {
        if let Some(tx) = self.tx.take() {
            let waiters = tx.receiver_count().saturating_sub(1);
            debug!(key = %self.key, waiters, ok = result.is_ok(), "flight completed");
            self.registry.finish(&self.key, self.id, tx, Some(result));
        }
    }
}

impl<V, E> Drop for FlightGuard<V, E>
where
    V: Clone,
    E: Clone + From<FlightError>,
{
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            debug!(key = %self.key, "flight abandoned by its executor");
            self.registry.finish(&self.key, self.id, tx, None);
        }
    }
}

/// A caller waiting on another caller's flight.
pub(crate) struct Waiter<V, E> {
    key: OperationKey,
    rx: watch::Receiver<Slot<V, E>>,
}

impl<V, E> Waiter<V, E>
where
    V: Clone,
    E: Clone + From<FlightError>,
{
    /// Waits up to `bound` for the executor's result.
    pub(crate) async fn wait(mut self, bound: Duration) -> Result<V, E> {
        let key = self.key;
        match tokio::time::timeout(bound, self.rx.wait_for(Option::is_some)).await {
            Err(_elapsed) => Err(FlightError::Timeout {
                waited_ms: u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
                key,
            }
            .into()),
            Ok(Err(_closed)) => Err(FlightError::Abandoned(key).into()),
            Ok(Ok(slot)) => slot
                .clone()
                .unwrap_or_else(|| Err(FlightError::Abandoned(key).into())),
        }
    }
}
