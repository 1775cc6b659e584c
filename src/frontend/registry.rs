//! Parser registry
//!
//! Maps (format, operator name) pairs to parser instances. The registry is
//! an explicit object constructed once during pipeline initialization —
//! population order is deterministic and testable — and is read-only while
//! parsing runs. Conflict policy: **first registration wins**; a later
//! registration under an occupied key is refused and reported to the caller.

use std::sync::Arc;

use log::warn;
use rustc_hash::FxHashMap;

use crate::frontend::{flat, native, Format, Parser};

/// Registry of (format, operator) → parser
pub struct ParserRegistry {
    parsers: FxHashMap<(Format, String), Arc<dyn Parser>>,
}

impl ParserRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            parsers: FxHashMap::default(),
        }
    }

    /// Create a registry populated with every built-in frontend
    ///
    /// Frontends register in a fixed order (flat, then native), so the
    /// resulting table is identical across runs.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        flat::register_all(&mut registry);
        native::register_all(&mut registry);
        registry
    }

    /// Install a parser for a (format, operator) key
    ///
    /// Returns true if the parser was installed; false if the key was already
    /// taken (the existing parser is kept).
    pub fn register(&mut self, format: Format, op: &str, parser: Arc<dyn Parser>) -> bool {
        let key = (format, op.to_string());
        if self.parsers.contains_key(&key) {
            warn!(
                "duplicate parser registration for ({}, {}) ignored",
                format.name(),
                op
            );
            return false;
        }
        self.parsers.insert(key, parser);
        true
    }

    /// Look up the parser for a (format, operator) key
    pub fn lookup(&self, format: Format, op: &str) -> Option<&dyn Parser> {
        self.parsers
            .get(&(format, op.to_string()))
            .map(|p| p.as_ref())
    }

    /// Check whether a key is registered
    pub fn contains(&self, format: Format, op: &str) -> bool {
        self.parsers.contains_key(&(format, op.to_string()))
    }

    /// Number of registered parsers
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
