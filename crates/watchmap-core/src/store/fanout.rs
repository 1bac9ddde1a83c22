// ── Fan-out and failure reporting ──
//
// Invokes a snapshot of subscribers for one mutation event. Each callback
// is isolated: a panic or error is recorded and the loop moves on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::Channel;
use super::observable::Shared;
use super::subscription::Slot;
use crate::config::FailureLevel;
use crate::error::ObserverFailure;

/// Diagnostic callback for observer failures.
pub(crate) type FailureHook = Box<dyn Fn(&ObserverFailure) + Send + Sync>;

impl<K, V> Shared<K, V> {
    /// Invoke every live subscriber in `subscribers`, in order.
    pub(super) fn fan_out(
        &self,
        channel: Channel,
        subscribers: &[Arc<Slot<K, V>>],
        key: &K,
        value: &V,
    ) -> Vec<ObserverFailure> {
        let mut failures = Vec::new();
        if subscribers.is_empty() {
            return failures;
        }

        tracing::trace!(
            store = %self.config.name,
            %channel,
            subscribers = subscribers.len(),
            "fan-out"
        );

        for slot in subscribers {
            let Some(Err(message)) = slot.invoke(key, value) else {
                continue;
            };
            let failure = ObserverFailure {
                channel,
                subscriber: slot.id,
                message,
            };
            self.report(&failure);
            failures.push(failure);
        }
        failures
    }

    fn report(&self, failure: &ObserverFailure) {
        match self.config.failure_level {
            FailureLevel::Off => {}
            FailureLevel::Warn => tracing::warn!(
                store = %self.config.name,
                channel = %failure.channel,
                subscriber = %failure.subscriber,
                error = %failure.message,
                "observer failed"
            ),
            FailureLevel::Error => tracing::error!(
                store = %self.config.name,
                channel = %failure.channel,
                subscriber = %failure.subscriber,
                error = %failure.message,
                "observer failed"
            ),
        }

        if let Some(hook) = &self.failure_hook {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(failure))).is_err() {
                tracing::error!(
                    store = %self.config.name,
                    subscriber = %failure.subscriber,
                    "observer failure hook panicked"
                );
            }
        }
    }
}
