// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-flight resolution.
//!
//! At most one resolution per key is ever created. The future is registered
//! under the lock before anyone awaits it, so a caller arriving while the
//! first resolution is still pending gets a clone of the same shared future.
//! Entries are never evicted.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

/// A shared, cloneable resolution.
pub type Flight<V> = Shared<BoxFuture<'static, V>>;

/// Maps keys to in-flight or resolved values.
pub struct SingleFlight<K, V> {
    flights: Mutex<HashMap<K, Flight<V>>>,
}

impl<K, V> fmt::Debug for SingleFlight<K, V>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flights = self.flights.lock();
        let keys: Vec<_> = flights.keys().collect();
        f.debug_struct("SingleFlight").field("keys", &keys).finish()
    }
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the flight registered for `key`, creating it with `start`
    /// when there is none. `start` runs at most once per key.
    pub fn get_or_create<F, Fut>(&self, key: K, start: F) -> Flight<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        self.flights
            .lock()
            .entry(key)
            .or_insert_with(|| start().boxed().shared())
            .clone()
    }

    /// Whether a flight exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.flights.lock().contains_key(key)
    }

    /// Number of registered flights.
    pub fn len(&self) -> usize {
        self.flights.lock().len()
    }

    /// Whether no flight has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.flights.lock().is_empty()
    }
}
