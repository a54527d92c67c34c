#![warn(missing_docs)]
//! # refetch-core
//!
//! Core types for the refetch request cache.
//!
//! This crate holds everything a caller needs to *talk* to the cache without
//! depending on its engine:
//!
//! - **Address** a resource ([`CacheKey`], [`KeyPart`])
//! - **Produce** a payload ([`Producer`], [`CancellationToken`])
//! - **Tune** a request ([`FetchOptions`])
//! - **Inspect** results ([`CacheEntry`], [`EntryState`], [`CacheStatus`], [`FetchError`])

pub mod entry;
pub mod error;
pub mod key;
pub mod options;
pub mod producer;
pub mod status;

pub use entry::{CacheEntry, EntryState};
pub use error::{FetchError, InvalidKeyError, OptionsError};
pub use key::{CacheKey, KeyBuilder, KeyPart};
pub use options::{BackoffBase, FetchOptions, FetchOptionsBuilder, MaxAttempts};
pub use producer::Producer;
pub use status::CacheStatus;
#[doc(hidden)]
pub use smol_str::SmolStr;
pub use tokio_util::sync::CancellationToken;

/// Outcome delivered to every observer of a request.
pub type FetchResult<T, E> = Result<T, FetchError<E>>;
