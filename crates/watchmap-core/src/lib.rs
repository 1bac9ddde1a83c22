//! Observable key-value storage with synchronous change notification.
//!
//! This crate owns the reactive store and everything a subscriber needs
//! to consume it:
//!
//! - **[`ObservableStore`]** — Thread-safe mapping from `K` to `V`. Every
//!   [`put`](ObservableStore::put) fans out to the `added_or_updated`
//!   channel and every successful [`remove`](ObservableStore::remove) fans
//!   out to the `removed` channel, on the caller's thread, in subscription
//!   order.
//!
//! - **[`SubscriptionHandle`]** — Returned by every subscribe call. Dropping
//!   or [`release`](SubscriptionHandle::release)-ing it unregisters the
//!   callback exactly once; no invocation starts after release returns.
//!
//! - **[`ChangeStream`]** — Async `Stream` of [`Change`] events for consumers
//!   living on an executor instead of inside the fan-out.
//!
//! - **Observer failures** — A callback that panics or returns an error is
//!   isolated: the mutation stays committed, the remaining subscribers still
//!   run, and the failure is logged, passed to the diagnostic hook, and
//!   returned by the `*_checked` mutation variants as a [`FanoutError`].
//!
//! Subscribers only see future changes. Call
//! [`snapshot()`](ObservableStore::snapshot) first when the current state
//! is needed as well.

pub mod config;
pub mod error;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{FailureLevel, StoreConfig};
pub use error::{BoxError, ClearError, FanoutError, ObserverFailure};
pub use store::{Channel, ObservableStore, StoreBuilder, SubscriberId, SubscriptionHandle};
pub use stream::{Change, ChangeStream};
