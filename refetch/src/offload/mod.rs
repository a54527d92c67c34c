//! Offload manager for background task execution.
//!
//! Used for the stale-while-revalidate path: a stale payload is returned to
//! the caller immediately while the refresh runs as an offloaded task.
//!
//! # Example
//!
//! ```
//! use refetch::offload::{OffloadConfig, OffloadManager};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = OffloadConfig::builder()
//!     .timeout(Duration::from_secs(30))
//!     .build();
//! let manager = OffloadManager::new(config);
//!
//! manager.spawn("revalidate", async {
//!     // refresh logic here
//! });
//! manager.wait_all().await;
//! # }
//! ```

mod manager;
mod policy;

pub use manager::{OffloadHandle, OffloadKey, OffloadManager};
pub use policy::{OffloadConfig, OffloadConfigBuilder, TimeoutPolicy};
