//! Typed, keyed property bag for pipeline assembly.
//!
//! Handler factories pull their shared dependencies (settings, counters,
//! transport handles) out of a [`PipelineContext`] instead of a rigid
//! constructor signature. The bag is populated single-threaded while the
//! pipeline is assembled and is read-only afterwards, so concurrent reads
//! through the finished chain need no synchronization.

use std::any::{Any, TypeId};
use std::collections::HashMap;

type Key = (TypeId, Option<String>);

/// A mapping from (type identity, optional string discriminator) to a value.
///
/// At most one value per key; last write wins. Lookups with the wrong type
/// simply miss rather than fault.
#[derive(Debug, Default)]
pub struct PipelineContext {
    entries: HashMap<Key, Box<dyn Any + Send + Sync>>,
}

impl PipelineContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value keyed by its own type identity.
    pub fn set<T: Any + Send + Sync>(&mut self, value: T) {
        self.entries
            .insert((TypeId::of::<T>(), None), Box::new(value));
    }

    /// Stores a value under an explicit string discriminator.
    pub fn set_keyed<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries
            .insert((TypeId::of::<T>(), Some(key.into())), Box::new(value));
    }

    /// Retrieves a value by type identity, or `None` if absent.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.entries
            .get(&(TypeId::of::<T>(), None))
            .and_then(|value| value.downcast_ref())
    }

    /// Retrieves a value by type identity and discriminator.
    #[must_use]
    pub fn get_keyed<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries
            .get(&(TypeId::of::<T>(), Some(key.to_owned())))
            .and_then(|value| value.downcast_ref())
    }

    /// Retrieves a value by type identity, falling back to `default`.
    #[must_use]
    pub fn get_or<'a, T: Any>(&'a self, default: &'a T) -> &'a T {
        self.get().unwrap_or(default)
    }

    /// Retrieves a value by discriminator, falling back to `default`.
    #[must_use]
    pub fn get_keyed_or<'a, T: Any>(&'a self, key: &str, default: &'a T) -> &'a T {
        self.get_keyed(key).unwrap_or(default)
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the context holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq)]
    struct Settings {
        timeout_ms: u64,
    }

    #[test]
    fn test_set_and_get_by_type() {
        let mut ctx = PipelineContext::new();
        ctx.set(Settings { timeout_ms: 100 });

        assert_eq!(ctx.get::<Settings>(), Some(&Settings { timeout_ms: 100 }));
    }

    #[test]
    fn test_get_missing_type_is_none() {
        let ctx = PipelineContext::new();
        assert_eq!(ctx.get::<Settings>(), None);
        assert_eq!(ctx.get::<u64>(), None);
    }

    #[test]
    fn test_last_write_wins() {
        let mut ctx = PipelineContext::new();
        ctx.set(Settings { timeout_ms: 100 });
        ctx.set(Settings { timeout_ms: 200 });

        assert_eq!(ctx.get::<Settings>(), Some(&Settings { timeout_ms: 200 }));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_keyed_entries_are_distinct() {
        let mut ctx = PipelineContext::new();
        ctx.set(1u64);
        ctx.set_keyed("send", 2u64);
        ctx.set_keyed("open", 3u64);

        assert_eq!(ctx.get::<u64>(), Some(&1));
        assert_eq!(ctx.get_keyed::<u64>("send"), Some(&2));
        assert_eq!(ctx.get_keyed::<u64>("open"), Some(&3));
        assert_eq!(ctx.get_keyed::<u64>("close"), None);
    }

    #[test]
    fn test_same_key_different_types_do_not_collide() {
        let mut ctx = PipelineContext::new();
        ctx.set_keyed("limit", 5u64);
        ctx.set_keyed("limit", "five".to_string());

        assert_eq!(ctx.get_keyed::<u64>("limit"), Some(&5));
        assert_eq!(ctx.get_keyed::<String>("limit"), Some(&"five".to_string()));
    }

    #[test]
    fn test_get_or_returns_default_on_miss() {
        let mut ctx = PipelineContext::new();
        let fallback = Settings { timeout_ms: 60_000 };

        assert_eq!(ctx.get_or(&fallback), &fallback);

        ctx.set(Settings { timeout_ms: 5 });
        assert_eq!(ctx.get_or(&fallback), &Settings { timeout_ms: 5 });
        assert_eq!(ctx.get_keyed_or("x", &fallback), &fallback);
    }

    #[test]
    fn test_is_empty() {
        let mut ctx = PipelineContext::new();
        assert!(ctx.is_empty());
        ctx.set(0u8);
        assert!(!ctx.is_empty());
    }
}
