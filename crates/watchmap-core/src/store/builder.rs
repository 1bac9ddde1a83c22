use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use super::fanout::FailureHook;
use super::observable::{ObservableStore, Shared};
use crate::config::StoreConfig;
use crate::error::ObserverFailure;

/// Builder for an [`ObservableStore`] with seed entries, configuration and
/// a diagnostic hook for observer failures.
pub struct StoreBuilder<K, V> {
    config: StoreConfig,
    entries: HashMap<K, V>,
    failure_hook: Option<FailureHook>,
}

impl<K, V> StoreBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Empty builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            entries: HashMap::new(),
            failure_hook: None,
        }
    }

    /// Replace the whole configuration, including the name.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the store name used in log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Add initial entries. Later seeds overwrite earlier ones.
    pub fn seed<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.entries.extend(entries);
        self
    }

    /// Called once per observer failure, after it was logged. A panic in
    /// the hook is caught and logged.
    pub fn on_observer_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ObserverFailure) + Send + Sync + 'static,
    {
        self.failure_hook = Some(Box::new(hook));
        self
    }

    /// Build the store. A capacity hint the allocator refuses is logged
    /// and ignored.
    pub fn build(self) -> ObservableStore<K, V> {
        let Self {
            config,
            mut entries,
            failure_hook,
        } = self;
        let additional = config.initial_capacity.saturating_sub(entries.len());
        if let Err(err) = entries.try_reserve(additional) {
            tracing::warn!(
                store = %config.name,
                initial_capacity = config.initial_capacity,
                error = %err,
                "ignoring capacity hint"
            );
        }

        tracing::debug!(
            store = %config.name,
            entries = entries.len(),
            "store created"
        );
        ObservableStore::from_shared(Shared::new(config, entries, failure_hook))
    }
}

impl<K, V> Default for StoreBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for StoreBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .field("failure_hook", &self.failure_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::store::Channel;

    #[test]
    fn seeds_and_names() {
        let store = StoreBuilder::new()
            .name("users")
            .seed([(1u32, "ann"), (2, "bob")])
            .seed([(2, "bea")])
            .build();

        assert_eq!(store.config().name, "users");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&2), Some("bea"));
    }

    #[test]
    fn capacity_hint_is_applied() {
        let store: ObservableStore<u8, u8> = StoreBuilder::new()
            .config(StoreConfig {
                initial_capacity: 128,
                ..StoreConfig::default()
            })
            .build();
        assert!(store.is_empty());
        assert_eq!(store.config().initial_capacity, 128);
    }

    #[test]
    fn unsatisfiable_capacity_hint_is_ignored() {
        let store: ObservableStore<u8, u8> = StoreBuilder::new()
            .config(StoreConfig {
                initial_capacity: usize::MAX,
                ..StoreConfig::default()
            })
            .seed([(1, 1)])
            .build();
        store.put(2, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn failure_hook_sees_every_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let store: ObservableStore<u8, u8> = StoreBuilder::new()
            .on_observer_failure(move |failure| seen_clone.lock().push(failure.clone()))
            .build();

        let sub = store.subscribe(Channel::AddedOrUpdated, |_, _| panic!("first"));
        let _ok = store.subscribe(Channel::AddedOrUpdated, |_, _| {});
        store.put(1, 1);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].subscriber, sub.id());
        assert_eq!(seen[0].channel, Channel::AddedOrUpdated);
        assert_eq!(seen[0].message, "first");
    }

    #[test]
    fn panicking_hook_is_contained() {
        let store: ObservableStore<u8, u8> = StoreBuilder::new()
            .on_observer_failure(|_| panic!("hook"))
            .build();
        let _sub = store.subscribe(Channel::Removed, |_, _| panic!("observer"));

        store.put(1, 1);
        assert!(store.remove(&1));
        assert!(!store.contains(&1));
    }
}
