//! How a subscription was served.

/// Whether a fetch was answered from the cache, joined another request,
/// or started a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStatus {
    /// Fresh cached payload was returned; the producer was not called.
    Hit,
    /// No usable payload; a new in-flight request was started.
    #[default]
    Miss,
    /// Stale payload was returned and a background refresh was scheduled.
    Stale,
    /// Attached as an observer to a request that was already in flight.
    Joined,
}

impl CacheStatus {
    /// Returns the status as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Stale => "stale",
            CacheStatus::Joined => "joined",
        }
    }
}
