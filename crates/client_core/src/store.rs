//! Keyed observable store.
//!
//! A [`Store`] owns one value set `S` and an ordered list of subscribers,
//! each watching a single field of `S`. [`Store::update`] applies a batch of
//! field replacements to a copy of the values, commits the merged copy, and
//! only then calls every subscriber whose field changed, in registration
//! order. Subscribers never see a half-applied batch.
//!
//! Callbacks cannot re-enter the store. Instead they get a [`Deferred`]
//! handle; batches pushed there are queued and applied once the current
//! notification round is over.

use std::{collections::VecDeque, fmt};

use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound on notification rounds a single `update` call may trigger
/// through deferred batches.
pub const MAX_UPDATE_ROUNDS: usize = 64;

/// Value set held by a [`Store`].
///
/// `Field` is the closed set of subscribable fields; `Update` is a
/// replacement of one field's value.
pub trait StoreState: Clone + Send + 'static {
    type Field: Copy + Eq + fmt::Debug + Send + 'static;
    type Update: Send + 'static;

    fn apply(&mut self, update: Self::Update);

    /// Whether `field` differs between `previous` and `self`.
    fn field_changed(&self, previous: &Self, field: Self::Field) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store updates kept re-triggering each other for {rounds} rounds")]
    UpdateCycle { rounds: usize },
}

/// Updates requested from inside a subscriber callback.
pub struct Deferred<S: StoreState> {
    batches: Vec<Vec<S::Update>>,
}

impl<S: StoreState> Deferred<S> {
    fn new() -> Self {
        Self {
            batches: Vec::new(),
        }
    }

    /// Queues one batch; it is applied as a single `update` after the
    /// current round of callbacks.
    pub fn update(&mut self, updates: impl IntoIterator<Item = S::Update>) {
        let batch: Vec<_> = updates.into_iter().collect();
        if !batch.is_empty() {
            self.batches.push(batch);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

type Callback<S> = Box<dyn FnMut(&S, &mut Deferred<S>) + Send>;

struct Subscriber<S: StoreState> {
    id: SubscriptionId,
    field: S::Field,
    callback: Callback<S>,
}

pub struct Store<S: StoreState> {
    values: S,
    subscribers: Vec<Subscriber<S>>,
    next_id: u64,
}

impl<S: StoreState> Store<S> {
    pub fn new(initial: S) -> Self {
        Self {
            values: initial,
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    pub fn values(&self) -> &S {
        &self.values
    }

    /// Registers `callback` for `field`. Registering the same callback twice
    /// makes it run twice per change.
    pub fn subscribe<F>(&mut self, field: S::Field, callback: F) -> SubscriptionId
    where
        F: FnMut(&S, &mut Deferred<S>) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            field,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        before != self.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Applies `updates` and notifies subscribers of changed fields.
    ///
    /// Returns how many callbacks ran, deferred rounds included.
    pub fn update<I>(&mut self, updates: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S::Update>,
    {
        let mut queue: VecDeque<Vec<S::Update>> = VecDeque::new();
        queue.push_back(updates.into_iter().collect());

        let mut rounds = 0;
        let mut notified = 0;
        while let Some(batch) = queue.pop_front() {
            if rounds == MAX_UPDATE_ROUNDS {
                warn!(rounds, "store: deferred updates did not settle");
                return Err(StoreError::UpdateCycle { rounds });
            }
            rounds += 1;

            let mut next = self.values.clone();
            for update in batch {
                next.apply(update);
            }

            let pending: Vec<usize> = self
                .subscribers
                .iter()
                .enumerate()
                .filter(|(_, subscriber)| next.field_changed(&self.values, subscriber.field))
                .map(|(index, _)| index)
                .collect();

            self.values = next;

            let mut deferred = Deferred::new();
            for index in pending {
                let subscriber = &mut self.subscribers[index];
                debug!(field = ?subscriber.field, "store: notifying subscriber");
                (subscriber.callback)(&self.values, &mut deferred);
                notified += 1;
            }
            queue.extend(deferred.batches);
        }

        Ok(notified)
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
