//! Cache-wide configuration.
//!
//! ```
//! use refetch::CacheConfig;
//! use refetch::offload::TimeoutPolicy;
//! use std::time::Duration;
//!
//! let config: CacheConfig = serde_json::from_str(r#"{
//!     "defaults": { "ttl": "1m", "max_attempts": 2 },
//!     "offload": { "timeout_policy": { "Cancel": "30s" } }
//! }"#).unwrap();
//!
//! assert_eq!(config.defaults.ttl, Duration::from_secs(60));
//! assert_eq!(config.offload.timeout_policy, TimeoutPolicy::Cancel(Duration::from_secs(30)));
//! ```

use refetch_core::FetchOptions;
use serde::{Deserialize, Serialize};

use crate::offload::OffloadConfig;

/// Configuration of a [`RequestCache`](crate::RequestCache).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Options used by [`RequestCache::load`](crate::RequestCache::load).
    pub defaults: FetchOptions,
    /// Background revalidation settings.
    pub offload: OffloadConfig,
}
