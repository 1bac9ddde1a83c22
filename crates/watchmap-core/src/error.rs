// ── Core error types ──
//
// Observer failures never abort a mutation. They are collected per
// fan-out and surfaced through logs, the diagnostic hook, or the
// `*_checked` mutation variants. Missing keys and repeated releases are
// not errors at all.

use std::any::Any;

use thiserror::Error;

use crate::store::{Channel, SubscriberId};

/// Error type accepted from fallible subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single subscriber that panicked or returned an error during fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("subscriber {subscriber} on {channel} failed: {message}")]
pub struct ObserverFailure {
    /// Channel whose fan-out invoked the subscriber.
    pub channel: Channel,
    /// Identity of the failing subscriber.
    pub subscriber: SubscriberId,
    /// Panic payload or error message.
    pub message: String,
}

/// Aggregated observer failures from one mutation.
///
/// The mutation that produced this error has already been committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} observer(s) failed during fan-out", .failures.len())]
pub struct FanoutError {
    pub failures: Vec<ObserverFailure>,
}

impl FanoutError {
    /// `Ok(())` when nothing failed, otherwise the aggregated error.
    pub(crate) fn check(failures: Vec<ObserverFailure>) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }
}

/// Observer failures from [`clear_checked`](crate::ObservableStore::clear_checked).
///
/// Every entry has already been removed; `cleared` counts them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cleared {cleared} entries: {source}")]
pub struct ClearError {
    pub cleared: usize,
    #[source]
    pub source: FanoutError,
}

/// Render a `catch_unwind` payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}
