// ── Async change streams ──
//
// Broadcast-backed subscription for consumers that live on an executor
// rather than inside the synchronous fan-out.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// One committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<K, V> {
    AddedOrUpdated { key: K, value: V },
    Removed { key: K, value: V },
}

impl<K, V> Change<K, V> {
    /// Key the change applies to.
    pub fn key(&self) -> &K {
        match self {
            Self::AddedOrUpdated { key, .. } | Self::Removed { key, .. } => key,
        }
    }

    /// New value for an insert or overwrite, old value for a removal.
    pub fn value(&self) -> &V {
        match self {
            Self::AddedOrUpdated { value, .. } | Self::Removed { value, .. } => value,
        }
    }

    /// Notification channel the change was delivered on.
    pub fn channel(&self) -> crate::Channel {
        match self {
            Self::AddedOrUpdated { .. } => crate::Channel::AddedOrUpdated,
            Self::Removed { .. } => crate::Channel::Removed,
        }
    }
}

/// A subscription to every change committed after its creation.
///
/// Changes arrive in commit order. A receiver that falls more than the
/// configured `change_buffer` behind skips the oldest changes and logs a
/// warning. The stream ends when every clone of the store is dropped.
pub struct ChangeStream<K, V> {
    inner: BroadcastStream<Change<K, V>>,
    store: String,
}

impl<K, V> ChangeStream<K, V>
where
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub(crate) fn new(receiver: broadcast::Receiver<Change<K, V>>, store: String) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            store,
        }
    }

    /// Wait for the next change.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Change<K, V>> {
        self.next().await
    }
}

impl<K, V> Stream for ChangeStream<K, V>
where
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    type Item = Change<K, V>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let polled = ready!(Pin::new(&mut self.inner).poll_next(cx));
            match polled {
                Some(Ok(change)) => return Poll::Ready(Some(change)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(store = %self.store, skipped, "change stream lagged");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}
