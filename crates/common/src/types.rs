//! Shared value types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Hex-encoded SHA-256 digest of a query result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Login block policy of the application under test.
///
/// After `attempts` consecutive failures the account is refused for
/// `block_secs` seconds counted from the last failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    pub attempts: u32,
    pub block_secs: u64,
}

impl LockoutPolicy {
    pub fn block(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            block_secs: 30,
        }
    }
}
