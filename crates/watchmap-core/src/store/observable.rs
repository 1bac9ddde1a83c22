// ── Observable store ──
//
// Thread-safe mapping with two notification channels. Every mutation and
// every subscriber-list change is serialized behind one lock; callbacks run
// after the lock is released, against the subscriber snapshot taken while
// it was held.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use super::builder::StoreBuilder;
use super::fanout::FailureHook;
use super::subscription::{Callback, Registry, Slot, SubscriptionHandle};
use super::{Channel, SubscriberId};
use crate::config::{MAX_CHANGE_BUFFER, StoreConfig};
use crate::error::{BoxError, ClearError, FanoutError};
use crate::stream::{Change, ChangeStream};

type SlotList<K, V> = ArcSwap<Vec<Arc<Slot<K, V>>>>;

/// State shared by every clone of an [`ObservableStore`].
pub(crate) struct Shared<K, V> {
    pub(super) config: StoreConfig,
    /// The store lock. Also guards writes to both subscriber lists.
    entries: Mutex<HashMap<K, V>>,
    added_or_updated: SlotList<K, V>,
    removed: SlotList<K, V>,
    next_subscriber: AtomicU64,
    pub(super) failure_hook: Option<FailureHook>,
    changes: broadcast::Sender<Change<K, V>>,
    version: watch::Sender<u64>,
}

impl<K, V> Shared<K, V> {
    fn list(&self, channel: Channel) -> &SlotList<K, V> {
        match channel {
            Channel::AddedOrUpdated => &self.added_or_updated,
            Channel::Removed => &self.removed,
        }
    }

    /// Must be called with the store lock held.
    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    /// Must be called with the store lock held so streams see commit order.
    fn publish(&self, change: impl FnOnce() -> Change<K, V>) {
        if self.changes.receiver_count() > 0 {
            // A receiver may disappear between the check and the send.
            let _ = self.changes.send(change());
        }
    }
}

impl<K: Clone, V: Clone> Shared<K, V> {
    pub(super) fn new(
        config: StoreConfig,
        entries: HashMap<K, V>,
        failure_hook: Option<FailureHook>,
    ) -> Self {
        let (changes, _) = broadcast::channel(config.change_buffer.clamp(1, MAX_CHANGE_BUFFER));
        let (version, _) = watch::channel(0u64);

        Self {
            config,
            entries: Mutex::new(entries),
            added_or_updated: ArcSwap::from_pointee(Vec::new()),
            removed: ArcSwap::from_pointee(Vec::new()),
            next_subscriber: AtomicU64::new(1),
            failure_hook,
            changes,
            version,
        }
    }
}

impl<K, V> Registry for Shared<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn unregister(&self, channel: Channel, id: SubscriberId) -> bool {
        let slot = {
            let _entries = self.entries.lock();
            let list = self.list(channel);
            let current = list.load_full();
            let Some(pos) = current.iter().position(|slot| slot.id == id) else {
                return false;
            };
            let mut next: Vec<_> = current.iter().cloned().collect();
            let slot = next.remove(pos);
            list.store(Arc::new(next));
            slot
        };
        // Outside the store lock: an in-flight callback may still need it.
        slot.retire();
        true
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

/// A thread-safe key-value store that notifies subscribers of every change.
///
/// Cloning an `ObservableStore` creates a new handle to the **same** state:
/// entries, subscribers and version are shared.
///
/// # Notification order
///
/// For one mutation, subscribers of the affected channel are invoked in
/// registration order, on the calling thread, before the mutating call
/// returns. The subscriber list is snapshotted when the mutation commits,
/// so a subscriber added by a callback does not see the event that is
/// currently being delivered.
///
/// # Deadlocks
///
/// Callbacks may call back into the store. The closure passed to
/// [`with`](Self::with) may not: it runs under the store lock.
pub struct ObservableStore<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for ObservableStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> ObservableStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        StoreBuilder::new().build()
    }

    /// Create an empty store tuned by `config`.
    pub fn with_config(config: StoreConfig) -> Self {
        StoreBuilder::new().config(config).build()
    }

    /// Create a store seeded with `entries`. Seeding does not notify.
    pub fn from_map<S: BuildHasher>(entries: HashMap<K, V, S>) -> Self {
        StoreBuilder::new().seed(entries).build()
    }

    /// Start a [`StoreBuilder`] for a store with a failure hook or seed data.
    pub fn builder() -> StoreBuilder<K, V> {
        StoreBuilder::new()
    }

    pub(super) fn from_shared(shared: Shared<K, V>) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert or overwrite `key`, then notify `added_or_updated`.
    ///
    /// Observer failures are logged and passed to the failure hook; use
    /// [`put_checked`](Self::put_checked) to receive them as well.
    pub fn put(&self, key: K, value: V) {
        // Already reported through the log and the hook.
        let _ = self.put_checked(key, value);
    }

    /// Like [`put`](Self::put), returning every observer failure after all
    /// subscribers ran. The entry is stored either way.
    pub fn put_checked(&self, key: K, value: V) -> Result<(), FanoutError> {
        // The replaced value is dropped outside the lock.
        let (_replaced, subscribers) = {
            let mut entries = self.shared.entries.lock();
            let replaced = entries.insert(key.clone(), value.clone());
            self.shared.bump_version();
            self.shared.publish(|| Change::AddedOrUpdated {
                key: key.clone(),
                value: value.clone(),
            });
            (replaced, self.shared.added_or_updated.load_full())
        };

        FanoutError::check(self.shared.fan_out(
            Channel::AddedOrUpdated,
            &subscribers,
            &key,
            &value,
        ))
    }

    /// Remove `key`, notifying `removed` with the old value.
    ///
    /// Returns `false` without notifying anyone when the key is absent.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // Failures only happen after a successful removal.
        self.remove_checked(key).unwrap_or(true)
    }

    /// Like [`remove`](Self::remove), returning every observer failure after
    /// all subscribers ran. An `Err` means the key was removed.
    pub fn remove_checked<Q>(&self, key: &Q) -> Result<bool, FanoutError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (key, value, subscribers) = {
            let mut entries = self.shared.entries.lock();
            let Some((key, value)) = entries.remove_entry(key) else {
                return Ok(false);
            };
            self.shared.bump_version();
            self.shared.publish(|| Change::Removed {
                key: key.clone(),
                value: value.clone(),
            });
            (key, value, self.shared.removed.load_full())
        };

        FanoutError::check(self.shared.fan_out(Channel::Removed, &subscribers, &key, &value))?;
        Ok(true)
    }

    /// Remove every entry, notifying `removed` once per entry in unspecified
    /// order. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        self.clear_checked().unwrap_or_else(|err| err.cleared)
    }

    /// Like [`clear`](Self::clear), returning every observer failure from
    /// every per-entry fan-out. All entries are removed either way.
    pub fn clear_checked(&self) -> Result<usize, ClearError> {
        let (drained, subscribers) = {
            let mut entries = self.shared.entries.lock();
            if entries.is_empty() {
                return Ok(0);
            }
            let drained: Vec<(K, V)> = entries.drain().collect();
            self.shared.bump_version();
            for (key, value) in &drained {
                self.shared.publish(|| Change::Removed {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            (drained, self.shared.removed.load_full())
        };

        let mut failures = Vec::new();
        for (key, value) in &drained {
            failures.extend(self.shared.fan_out(Channel::Removed, &subscribers, key, value));
        }
        match FanoutError::check(failures) {
            Ok(()) => Ok(drained.len()),
            Err(source) => Err(ClearError {
                cleared: drained.len(),
                source,
            }),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Whether `key` is currently present.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.entries.lock().contains_key(key)
    }

    /// Clone of the value for `key`, if present.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.entries.lock().get(key).cloned()
    }

    /// Access the value for `key` by reference without cloning.
    pub fn with<Q, R>(&self, key: &Q, f: impl FnOnce(Option<&V>) -> R) -> R
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entries = self.shared.entries.lock();
        f(entries.get(key))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shared.entries.lock().is_empty()
    }

    /// Keys at the time of the call, in unspecified order.
    pub fn keys(&self) -> Vec<K> {
        self.shared.entries.lock().keys().cloned().collect()
    }

    /// Detached copy of all entries.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.shared.entries.lock().clone()
    }

    /// Number of committed mutations since creation.
    pub fn version(&self) -> u64 {
        *self.shared.version.borrow()
    }

    /// Watch the version counter from async code.
    pub fn watch_version(&self) -> watch::Receiver<u64> {
        self.shared.version.subscribe()
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to inserts and overwrites. Existing entries are not replayed.
    pub fn subscribe_added_or_updated<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.subscribe(Channel::AddedOrUpdated, callback)
    }

    /// Subscribe to removals; the callback receives the removed value.
    pub fn subscribe_removed<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.subscribe(Channel::Removed, callback)
    }

    /// Subscribe to `channel`. Existing entries are not replayed.
    pub fn subscribe<F>(&self, channel: Channel, callback: F) -> SubscriptionHandle
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.register(
            channel,
            Box::new(move |key: &K, value: &V| -> Result<(), BoxError> {
                callback(key, value);
                Ok(())
            }),
        )
    }

    /// Subscribe with a callback whose `Err` is reported as an observer
    /// failure, exactly like a panic.
    pub fn subscribe_fallible<F>(&self, channel: Channel, callback: F) -> SubscriptionHandle
    where
        F: Fn(&K, &V) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(channel, Box::new(callback))
    }

    /// Release `handle` through this store.
    ///
    /// Returns `true` when this call unregistered the subscriber. A handle
    /// issued by a different store is left untouched.
    pub fn unsubscribe(&self, handle: &mut SubscriptionHandle) -> bool {
        if !handle.belongs_to(Arc::as_ptr(&self.shared).cast()) {
            return false;
        }
        handle.release_inner()
    }

    /// Number of live subscribers on `channel`.
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.shared.list(channel).load().len()
    }

    /// Async stream of every change committed after this call.
    pub fn changes(&self) -> ChangeStream<K, V> {
        ChangeStream::new(self.shared.changes.subscribe(), self.shared.config.name.clone())
    }

    fn register(&self, channel: Channel, callback: Callback<K, V>) -> SubscriptionHandle {
        let id = SubscriberId::from_raw(self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(Slot::new(id, callback));
        {
            let _entries = self.shared.entries.lock();
            let list = self.shared.list(channel);
            let mut next: Vec<_> = list.load().iter().cloned().collect();
            next.push(slot);
            list.store(Arc::new(next));
        }

        tracing::debug!(
            store = %self.shared.config.name,
            %channel,
            subscriber = %id,
            "subscribed"
        );

        let weak = Arc::downgrade(&self.shared);
        let registry: Weak<dyn Registry> = weak;
        SubscriptionHandle::new(id, channel, registry)
    }
}

impl<K, V> Default for ObservableStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> From<HashMap<K, V, S>> for ObservableStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher,
{
    fn from(entries: HashMap<K, V, S>) -> Self {
        Self::from_map(entries)
    }
}

impl<K, V> FromIterator<(K, V)> for ObservableStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        StoreBuilder::new().seed(iter).build()
    }
}

impl<K, V> fmt::Debug for ObservableStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableStore")
            .field("name", &self.shared.config.name)
            .field("len", &self.shared.entries.lock().len())
            .field("version", &*self.shared.version.borrow())
            .field("added_or_updated", &self.shared.added_or_updated.load().len())
            .field("removed", &self.shared.removed.load().len())
            .finish()
    }
}
