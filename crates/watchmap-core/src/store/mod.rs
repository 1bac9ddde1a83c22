// ── Observable key-value store ──
//
// Mapping storage behind a single lock, with per-channel subscriber lists
// published through `ArcSwap` so fan-out works on an immutable snapshot.

mod builder;
mod fanout;
mod observable;
mod subscription;

use std::fmt;

use strum::{Display, EnumIter};

pub use builder::StoreBuilder;
pub use observable::ObservableStore;
pub use subscription::SubscriptionHandle;

/// One of the two independent notification streams of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    /// Fired by every `put`, whether the key was new or overwritten.
    AddedOrUpdated,
    /// Fired by every `remove` that found its key, with the old value.
    Removed,
}

/// Store-unique identity of a registered callback.
///
/// Allocated monotonically starting at 1; never reused within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn channel_display_is_snake_case() {
        let names: Vec<String> = Channel::iter().map(|c| c.to_string()).collect();
        assert_eq!(names, ["added_or_updated", "removed"]);
    }

    #[test]
    fn subscriber_id_roundtrips_raw_value() {
        let id = SubscriberId::from_raw(9);
        assert_eq!(id.get(), 9);
        assert_eq!(id.to_string(), "9");
    }
}
