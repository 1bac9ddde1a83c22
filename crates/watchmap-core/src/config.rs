// ── Runtime store configuration ──
//
// These types describe *how* a store behaves: capacity hints, diagnostic
// naming, and failure reporting. They never touch disk; the
// `watchmap-config` crate builds a `StoreConfig` and hands it in.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Level at which observer failures are logged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FailureLevel {
    /// Only the diagnostic hook and `*_checked` results see failures.
    Off,
    #[default]
    Warn,
    Error,
}

/// Configuration for a single store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name attached to every tracing event emitted by the store.
    pub name: String,
    /// Capacity hint for the entry map. At most `MAX_INITIAL_CAPACITY`;
    /// a hint the allocator refuses is ignored.
    pub initial_capacity: usize,
    /// Per-receiver buffer of [`ChangeStream`](crate::ChangeStream)s.
    /// Clamped to `1..=MAX_CHANGE_BUFFER`.
    pub change_buffer: usize,
    /// Log level for observer failures.
    pub failure_level: FailureLevel,
}

pub const DEFAULT_STORE_NAME: &str = "store";
pub const DEFAULT_CHANGE_BUFFER: usize = 64;
/// Largest accepted change buffer; larger values are clamped.
pub const MAX_CHANGE_BUFFER: usize = 1 << 20;
/// Largest accepted capacity hint.
pub const MAX_INITIAL_CAPACITY: usize = 1 << 24;

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STORE_NAME.into(),
            initial_capacity: 0,
            change_buffer: DEFAULT_CHANGE_BUFFER,
            failure_level: FailureLevel::default(),
        }
    }
}

impl StoreConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
