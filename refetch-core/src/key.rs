//! Cache key types and construction.
//!
//! A [`CacheKey`] identifies one logical fetchable resource. It is derived
//! from the identity of the fetch function and its ordered call parameters:
//!
//! 1. **Prefix** - Name of the fetch function (e.g. `"ads.by_category"`)
//! 2. **Version** - Numeric version, bumped to invalidate a whole family of keys
//! 3. **Parts** - Ordered list of parameter name/value pairs
//!
//! ## Format
//!
//! When displayed, keys follow this format:
//! `{prefix}:v{version}:key1=value1&key2=value2`
//!
//! - Prefix is omitted if empty
//! - Version is omitted if zero
//!
//! ```
//! use refetch_core::{CacheKey, KeyPart};
//!
//! let key = CacheKey::new("ads", 1, vec![KeyPart::new("category", Some("cars"))]);
//! assert_eq!(format!("{}", key), "ads:v1:category=cars");
//!
//! let key = CacheKey::builder("wishlist").part("user", 42).flag("compact").build();
//! assert_eq!(format!("{}", key), "wishlist:user=42&compact");
//! ```
//!
//! ## Determinism
//!
//! Equality and hashing are structural: two keys built from the same prefix,
//! version and parts (in the same order) are equal. Parameter order is
//! significant, so callers should add parts in a fixed order.
//!
//! [`CacheKey`] uses `Arc` internally, so cloning a key only increments a
//! reference count.

use smol_str::SmolStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::InvalidKeyError;

#[derive(Debug, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
struct CacheKeyInner {
    prefix: SmolStr,
    version: u32,
    parts: Vec<KeyPart>,
}

/// A cache key identifying one logical resource.
///
/// # Example
///
/// ```
/// use refetch_core::{CacheKey, KeyPart};
///
/// let key = CacheKey::new(
///     "orders",
///     2,
///     vec![
///         KeyPart::new("user", Some("17")),
///         KeyPart::new("page", Some("3")),
///     ],
/// );
///
/// assert_eq!(key.prefix(), "orders");
/// assert_eq!(key.version(), 2);
/// assert_eq!(format!("{}", key), "orders:v2:user=17&page=3");
/// ```
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(from = "CacheKeyInner", into = "CacheKeyInner")]
pub struct CacheKey {
    inner: Arc<CacheKeyInner>,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl From<CacheKeyInner> for CacheKey {
    fn from(inner: CacheKeyInner) -> Self {
        CacheKey {
            inner: Arc::new(inner),
        }
    }
}

impl From<CacheKey> for CacheKeyInner {
    fn from(key: CacheKey) -> Self {
        Arc::try_unwrap(key.inner).unwrap_or_else(|arc| (*arc).clone())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.inner.prefix.is_empty() {
            write!(f, "{}:", self.inner.prefix)?;
        }
        if self.inner.version > 0 {
            write!(f, "v{}:", self.inner.version)?;
        }
        for (i, part) in self.inner.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "&")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl CacheKey {
    /// Creates a new cache key with the given components.
    pub fn new(prefix: impl Into<SmolStr>, version: u32, parts: Vec<KeyPart>) -> Self {
        CacheKey {
            inner: Arc::new(CacheKeyInner {
                prefix: prefix.into(),
                version,
                parts,
            }),
        }
    }

    /// Starts building a key for the fetch function named `prefix`.
    pub fn builder(prefix: impl Into<SmolStr>) -> KeyBuilder {
        KeyBuilder {
            prefix: prefix.into(),
            version: 0,
            parts: Vec::new(),
        }
    }

    /// Creates a key that consists of a prefix only.
    ///
    /// Useful for parameterless fetches such as "all categories".
    pub fn named(prefix: impl Into<SmolStr>) -> Self {
        CacheKey::new(prefix, 0, Vec::new())
    }

    /// Creates a cache key from a slice of key-value pairs.
    ///
    /// The prefix is empty and version is 0.
    pub fn from_slice(parts: &[(&str, Option<&str>)]) -> Self {
        let parts = parts
            .iter()
            .map(|(key, value)| KeyPart::new(key, *value))
            .collect();
        CacheKey::new(SmolStr::default(), 0, parts)
    }

    /// Returns an iterator over the key parts.
    pub fn parts(&self) -> impl Iterator<Item = &KeyPart> {
        self.inner.parts.iter()
    }

    /// Returns the cache key version number.
    pub fn version(&self) -> u32 {
        self.inner.version
    }

    /// Returns the cache key prefix.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Returns `true` if the key has neither a prefix nor any parts.
    pub fn is_empty(&self) -> bool {
        self.inner.prefix.is_empty() && self.inner.parts.is_empty()
    }

    /// Checks that this key can be used to address the cache.
    ///
    /// A key must carry a prefix or at least one part, and every part must
    /// have a non-empty name.
    pub fn validate(&self) -> Result<(), InvalidKeyError> {
        if self.is_empty() {
            return Err(InvalidKeyError::Empty);
        }
        if let Some(position) = self.inner.parts.iter().position(|p| p.key.is_empty()) {
            return Err(InvalidKeyError::UnnamedPart { position });
        }
        Ok(())
    }
}

/// A single component of a cache key.
///
/// The value is optional; key-only parts act as flags.
///
/// ```
/// use refetch_core::KeyPart;
///
/// let page = KeyPart::new("page", Some("2"));
/// assert_eq!(page.key(), "page");
/// assert_eq!(page.value(), Some("2"));
///
/// let flag = KeyPart::new("featured", None::<&str>);
/// assert_eq!(flag.value(), None);
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct KeyPart {
    key: SmolStr,
    value: Option<SmolStr>,
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(ref value) = self.value {
            write!(f, "={}", value)?;
        }
        Ok(())
    }
}

impl KeyPart {
    /// Creates a new key part.
    pub fn new<K: AsRef<str>, V: AsRef<str>>(key: K, value: Option<V>) -> Self {
        KeyPart {
            key: SmolStr::new(key),
            value: value.map(SmolStr::new),
        }
    }

    /// Returns the key name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the optional value.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Builder accumulating the ordered parameters of a fetch call.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: SmolStr,
    version: u32,
    parts: Vec<KeyPart>,
}

impl KeyBuilder {
    /// Sets the key version.
    pub fn version(self, version: u32) -> Self {
        Self { version, ..self }
    }

    /// Appends a named parameter. The value is rendered with `Display`.
    pub fn part(mut self, key: impl AsRef<str>, value: impl fmt::Display) -> Self {
        self.parts.push(KeyPart::new(key, Some(value.to_string())));
        self
    }

    /// Appends a named parameter only when `value` is present.
    ///
    /// Absent optional parameters leave no trace, so `f(x, None)` and `f(x)`
    /// share a key.
    pub fn optional(self, key: impl AsRef<str>, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(value) => self.part(key, value),
            None => self,
        }
    }

    /// Appends a key-only part.
    pub fn flag(mut self, key: impl AsRef<str>) -> Self {
        self.parts.push(KeyPart::new(key, None::<&str>));
        self
    }

    /// Builds the key.
    pub fn build(self) -> CacheKey {
        CacheKey::new(self.prefix, self.version, self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(key: &CacheKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equal_parameters_give_equal_keys() {
        let a = CacheKey::builder("ads").part("category", "cars").part("page", 2).build();
        let b = CacheKey::builder("ads").part("category", "cars").part("page", 2).build();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn parameter_order_is_significant() {
        let a = CacheKey::builder("ads").part("a", 1).part("b", 2).build();
        let b = CacheKey::builder("ads").part("b", 2).part("a", 1).build();
        assert_ne!(a, b);
    }

    #[test]
    fn display_omits_empty_prefix_and_zero_version() {
        assert_eq!(CacheKey::named("categories").to_string(), "categories:");
        assert_eq!(
            CacheKey::from_slice(&[("id", Some("42"))]).to_string(),
            "id=42"
        );
        let key = CacheKey::builder("ads").version(3).part("id", 7).build();
        assert_eq!(key.to_string(), "ads:v3:id=7");
    }

    #[test]
    fn optional_parts_are_skipped_when_absent() {
        let with_none = CacheKey::builder("search")
            .part("q", "bike")
            .optional("city", None::<&str>)
            .build();
        let without = CacheKey::builder("search").part("q", "bike").build();
        assert_eq!(with_none, without);
    }

    #[test]
    fn empty_key_is_rejected() {
        let key = CacheKey::new("", 0, Vec::new());
        assert_eq!(key.validate(), Err(InvalidKeyError::Empty));
    }

    #[test]
    fn unnamed_part_is_rejected() {
        let key = CacheKey::builder("ads").part("page", 1).part("", "x").build();
        assert_eq!(
            key.validate(),
            Err(InvalidKeyError::UnnamedPart { position: 1 })
        );
    }

    #[test]
    fn serde_keeps_structure() {
        let key = CacheKey::builder("ads").version(1).part("id", 5).flag("full").build();
        let json = serde_json::to_string(&key).unwrap();
        let restored: CacheKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, restored);
    }
}
