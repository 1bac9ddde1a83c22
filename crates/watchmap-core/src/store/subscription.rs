// ── Subscriber slots and handles ──
//
// A `Slot` owns one registered callback and tracks which threads are
// currently inside it. Retiring a slot stops new invocations and waits
// for in-flight ones on other threads, which is what makes `release`
// safe to rely on.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use super::{Channel, SubscriberId};
use crate::error::{BoxError, panic_message};

/// Type-erased subscriber callback.
pub(crate) type Callback<K, V> = Box<dyn Fn(&K, &V) -> Result<(), BoxError> + Send + Sync>;

#[derive(Default)]
struct SlotState {
    retired: bool,
    /// One entry per active invocation; a thread appears more than once
    /// when a callback mutates the store and re-enters itself.
    in_flight: Vec<ThreadId>,
}

pub(crate) struct Slot<K, V> {
    pub(crate) id: SubscriberId,
    callback: Callback<K, V>,
    state: Mutex<SlotState>,
    idle: Condvar,
}

impl<K, V> Slot<K, V> {
    pub(crate) fn new(id: SubscriberId, callback: Callback<K, V>) -> Self {
        Self {
            id,
            callback,
            state: Mutex::new(SlotState::default()),
            idle: Condvar::new(),
        }
    }

    /// Run the callback unless the slot is retired.
    ///
    /// Returns `None` when skipped, otherwise the outcome with panics and
    /// errors flattened to a message.
    pub(crate) fn invoke(&self, key: &K, value: &V) -> Option<Result<(), String>> {
        let me = thread::current().id();
        {
            let mut state = self.state.lock();
            if state.retired {
                return None;
            }
            state.in_flight.push(me);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(key, value)));

        {
            let mut state = self.state.lock();
            if let Some(pos) = state.in_flight.iter().position(|t| *t == me) {
                state.in_flight.swap_remove(pos);
            }
            if state.retired {
                self.idle.notify_all();
            }
        }

        Some(match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        })
    }

    /// Stop all future invocations and wait for in-flight ones running on
    /// other threads. An invocation on the current thread (release from
    /// inside the callback) is not waited for.
    pub(crate) fn retire(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        state.retired = true;
        while state.in_flight.iter().any(|t| *t != me) {
            self.idle.wait(&mut state);
        }
    }
}

/// Store-side operations a handle needs, erased over `K` and `V`.
pub(crate) trait Registry: Send + Sync {
    /// Unlink the subscriber and retire its slot. Returns `false` when it
    /// was not registered.
    fn unregister(&self, channel: Channel, id: SubscriberId) -> bool;

    /// Diagnostic store name for logs.
    fn name(&self) -> &str;
}

/// Capability to unregister one callback from one channel of one store.
///
/// Dropping the handle releases the subscription. Use
/// [`detach`](Self::detach) to keep the callback registered for the rest of
/// the store's lifetime instead.
#[must_use = "dropping a SubscriptionHandle immediately unsubscribes the callback"]
pub struct SubscriptionHandle {
    id: SubscriberId,
    channel: Channel,
    registry: Weak<dyn Registry>,
    released: bool,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriberId, channel: Channel, registry: Weak<dyn Registry>) -> Self {
        Self {
            id,
            channel,
            registry,
            released: false,
        }
    }

    /// Identity of the subscriber, unique within its store.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Channel the callback is registered on.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// `true` until released, and while the owning store is alive.
    pub fn is_active(&self) -> bool {
        !self.released && self.registry.strong_count() > 0
    }

    /// Unregister the callback.
    ///
    /// Blocks until no invocation of the callback is running on another
    /// thread; after it returns the callback is never invoked again.
    /// Calling it again, or after the store was dropped, does nothing.
    pub fn release(&mut self) {
        self.release_inner();
    }

    /// Keep the subscription alive for as long as the store lives.
    pub fn detach(mut self) {
        if let Some(registry) = self.registry.upgrade() {
            tracing::debug!(
                store = registry.name(),
                channel = %self.channel,
                subscriber = %self.id,
                "subscription detached"
            );
        }
        self.released = true;
    }

    /// Returns `true` when this call performed the unregistration.
    pub(crate) fn release_inner(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.unregister(self.channel, self.id);
        if removed {
            tracing::debug!(
                store = registry.name(),
                channel = %self.channel,
                subscriber = %self.id,
                "subscription released"
            );
        }
        removed
    }

    pub(crate) fn belongs_to(&self, registry: *const ()) -> bool {
        std::ptr::addr_eq(self.registry.as_ptr(), registry)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}
