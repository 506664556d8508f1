//! Engine configuration

use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

/// Default cap on the length of a gap-filled sequence axis
pub const DEFAULT_MAX_FILL: usize = 100_000;

/// Default time spent waiting for a locked database before giving up
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Final engine configuration
///
/// Usually assembled by the command-line front-end from its arguments. Please
/// refer to the CLI help to know more about individual fields.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    /// Subset of the configuration that affects how storage is accessed
    pub store: StoreConfig,

    /// Maximal number of buckets in a gap-filled sequence axis
    pub max_fill: NonZeroUsize,
}
//
impl Config {
    /// Assemble the configuration from its parts
    pub fn new(store: StoreConfig, max_fill: NonZeroUsize) -> Arc<Self> {
        Arc::new(Self { store, max_fill })
    }
}

/// Subset of the configuration that affects how storage is accessed
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StoreConfig {
    /// Location of the SQLite database, or `None` for a private in-memory one
    pub path: Option<PathBuf>,

    /// How long a connection waits on a locked database, in milliseconds
    pub busy_timeout_ms: u64,
}
//
impl StoreConfig {
    /// Configuration for a database file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Configuration for a throwaway in-memory database
    pub fn in_memory() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Busy timeout as a [`Duration`]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
