// Model-based properties: the store must agree with a plain `HashMap` fed
// the same operations, and its notifications must mirror that history.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use watchmap_core::{Change, ObservableStore};

#[derive(Debug, Clone)]
enum Op {
    Put(u8, i32),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, any::<i32>()).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..8).prop_map(Op::Remove),
    ]
}

proptest! {
    /// `get` reflects the last put not followed by a remove.
    #[test]
    fn last_write_wins(ops in prop::collection::vec(op(), 0..64)) {
        let store: ObservableStore<u8, i32> = ObservableStore::new();
        let mut model = HashMap::new();

        for op in &ops {
            match *op {
                Op::Put(k, v) => {
                    store.put(k, v);
                    model.insert(k, v);
                }
                Op::Remove(k) => {
                    prop_assert_eq!(store.remove(&k), model.remove(&k).is_some());
                }
            }
        }

        for k in 0u8..8 {
            prop_assert_eq!(store.get(&k), model.get(&k).copied());
        }
        prop_assert_eq!(store.snapshot(), model);
    }

    /// Each put yields one added event; each effective remove yields one
    /// removed event carrying the old value; nothing else is emitted.
    #[test]
    fn notifications_mirror_history(ops in prop::collection::vec(op(), 0..64)) {
        let store: ObservableStore<u8, i32> = ObservableStore::new();
        let events: Arc<Mutex<Vec<Change<u8, i32>>>> = Arc::default();

        let _added = {
            let events = Arc::clone(&events);
            store.subscribe_added_or_updated(move |k, v| {
                events.lock().push(Change::AddedOrUpdated { key: *k, value: *v });
            })
        };
        let _removed = {
            let events = Arc::clone(&events);
            store.subscribe_removed(move |k, v| {
                events.lock().push(Change::Removed { key: *k, value: *v });
            })
        };

        let mut model = HashMap::new();
        let mut expected = Vec::new();
        for op in &ops {
            match *op {
                Op::Put(k, v) => {
                    store.put(k, v);
                    model.insert(k, v);
                    expected.push(Change::AddedOrUpdated { key: k, value: v });
                }
                Op::Remove(k) => {
                    store.remove(&k);
                    if let Some(old) = model.remove(&k) {
                        expected.push(Change::Removed { key: k, value: old });
                    }
                }
            }
        }

        let seen = events.lock().clone();
        prop_assert_eq!(seen, expected.clone());
        prop_assert_eq!(store.version(), u64::try_from(expected.len()).unwrap());
    }
}
