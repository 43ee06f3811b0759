//! Single-shot publish/subscribe scoped to one phase of one request.
//!
//! An [`Operation`] lives for exactly one phase: subscribers register interest
//! in a set of data keys, data is published once per key, and each subscriber
//! fires the first time all of its keys are available. Everything runs
//! synchronously on the publishing thread; there is no queue and no lock.
//!
//! # At-most-once guarantees
//!
//! - A key can be published once. A second publish is a
//!   [`ViolationKind::DuplicateKey`] error.
//! - A subscriber fires at most once, even if later publishes would satisfy it
//!   again.
//! - The same subscriber cannot register twice for the same key set
//!   ([`ViolationKind::DuplicateSubscription`]).
//!
//! Violations indicate miswired pipelines and are always raised.
//!
//! # Examples
//!
//! ```
//! use appsec_gateway::reactive::Operation;
//!
//! let mut op: Operation<'_, u32, u32> = Operation::new("example");
//! op.subscribe("sum", ["a", "b"], |data| {
//!     Ok(data.get("a").copied().unwrap_or(0) + data.get("b").copied().unwrap_or(0))
//! })
//! .unwrap();
//!
//! assert!(op.publish("a", 1).unwrap().is_empty());
//! assert_eq!(op.publish("b", 2).unwrap(), vec![3]);
//! op.finish();
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, ProtocolViolation, ViolationKind};

/// Data published into an operation so far.
#[derive(Debug)]
pub struct Published<T> {
    values: BTreeMap<&'static str, T>,
}

impl<T> Published<T> {
    fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Returns the value published under `key`.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.values.get(key)
    }

    /// Returns true if `key` has been published.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the published keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    /// Returns the number of published keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type Callback<'a, T, R> = Box<dyn FnMut(&Published<T>) -> Result<R, Error> + 'a>;

struct Subscription<'a, T, R> {
    subscriber: &'static str,
    keys: BTreeSet<&'static str>,
    callback: Callback<'a, T, R>,
    fired: bool,
}

impl<T, R> Subscription<'_, T, R> {
    fn satisfied_by(&self, published: &Published<T>) -> bool {
        self.keys.iter().all(|k| published.contains(k))
    }
}

/// A single-shot publish/subscribe context.
///
/// `T` is the type of published values, `R` the type subscribers return.
/// The operation never interprets `R`.
pub struct Operation<'a, T, R> {
    name: &'static str,
    subscriptions: Vec<Subscription<'a, T, R>>,
    published: Published<T>,
}

impl<'a, T, R> Operation<'a, T, R> {
    /// Creates an empty operation. `name` is used for diagnostics only.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscriptions: Vec::new(),
            published: Published::new(),
        }
    }

    /// Returns the operation name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers `callback` to fire once every key in `keys` is published.
    ///
    /// `subscriber` identifies the callback; registering the same subscriber
    /// for the same key set twice is refused. A subscriber is only evaluated
    /// by later calls to [`publish`](Self::publish).
    ///
    /// # Errors
    ///
    /// Returns [`ViolationKind::DuplicateSubscription`] on a repeated
    /// (subscriber, key set) pair.
    pub fn subscribe<K, F>(
        &mut self,
        subscriber: &'static str,
        keys: K,
        callback: F,
    ) -> Result<(), Error>
    where
        K: IntoIterator<Item = &'static str>,
        F: FnMut(&Published<T>) -> Result<R, Error> + 'a,
    {
        let keys: BTreeSet<&'static str> = keys.into_iter().collect();

        if self
            .subscriptions
            .iter()
            .any(|s| s.subscriber == subscriber && s.keys == keys)
        {
            return Err(ProtocolViolation::new(
                ViolationKind::DuplicateSubscription { subscriber },
                format!(
                    "subscriber already registered for {:?} in operation '{}'",
                    keys, self.name
                ),
            )
            .into());
        }

        self.subscriptions.push(Subscription {
            subscriber,
            keys,
            callback: Box::new(callback),
            fired: false,
        });
        Ok(())
    }

    /// Publishes `value` under `key` and fires every subscriber this
    /// completes, in subscription order.
    ///
    /// Returns the results of the subscribers fired by this call.
    ///
    /// # Errors
    ///
    /// Returns [`ViolationKind::DuplicateKey`] if `key` was already
    /// published, or the first error raised by a subscriber. A subscriber
    /// that fails still counts as fired.
    pub fn publish(&mut self, key: &'static str, value: T) -> Result<Vec<R>, Error> {
        if self.published.contains(key) {
            return Err(ProtocolViolation::new(
                ViolationKind::DuplicateKey { key },
                format!("already published in operation '{}'", self.name),
            )
            .into());
        }
        self.published.values.insert(key, value);

        let mut results = Vec::new();
        for subscription in self.subscriptions.iter_mut() {
            if subscription.fired || !subscription.satisfied_by(&self.published) {
                continue;
            }
            subscription.fired = true;
            tracing::debug!(
                operation = self.name,
                subscriber = subscription.subscriber,
                key,
                "firing subscriber"
            );
            results.push((subscription.callback)(&self.published)?);
        }
        Ok(results)
    }

    /// Returns true if `key` has been published.
    pub fn is_published(&self, key: &str) -> bool {
        self.published.contains(key)
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Ends the operation. It cannot be reused afterwards.
    pub fn finish(self) {
        let fired = self.subscriptions.iter().filter(|s| s.fired).count();
        tracing::debug!(
            operation = self.name,
            published = self.published.len(),
            subscribers = self.subscriptions.len(),
            fired,
            "operation finished"
        );
    }
}

impl<T, R> fmt::Debug for Operation<'_, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("subscribers", &self.subscriptions.len())
            .field("published", &self.published.values.keys().collect::<Vec<_>>())
            .finish()
    }
}
