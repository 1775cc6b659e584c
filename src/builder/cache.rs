//! Tensor cache
//!
//! Deduplicates source-graph tensors during parsing: the first registration
//! of a source identity allocates an IR tensor, every later registration of
//! the same identity returns the existing id. Re-registering an identity
//! with a different requested layout is an explicit error rather than a
//! silent pick of one layout.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::ParseError;
use crate::ir::{Graph, Layout, TensorId};

/// Format-specific identity of a source tensor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    /// Tensor table index (flat format)
    Index(u32),
    /// Tensor name (native format)
    Named(String),
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Index(i) => write!(f, "#{}", i),
            SourceKey::Named(n) => write!(f, "'{}'", n),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    id: TensorId,
    layout: Layout,
}

/// Source identity → canonical IR tensor id
#[derive(Debug, Default)]
pub struct TensorCache {
    entries: FxHashMap<SourceKey, CacheEntry>,
}

impl TensorCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source tensor, allocating an IR tensor on first sight
    ///
    /// Idempotent: the same key always yields the same id. A layout conflict
    /// between registrations fails with [`ParseError::CacheConflict`].
    pub fn register(
        &mut self,
        graph: &mut Graph,
        key: SourceKey,
        name: &str,
        layout: Layout,
    ) -> Result<TensorId, ParseError> {
        if let Some(entry) = self.entries.get(&key) {
            if entry.layout != layout {
                return Err(ParseError::CacheConflict {
                    key: key.to_string(),
                    requested: layout.name(),
                    cached: entry.layout.name(),
                });
            }
            return Ok(entry.id);
        }

        let id = graph.alloc_tensor(name);
        if let Some(tensor) = graph.tensor_mut(id) {
            tensor.layout = layout;
        }
        self.entries.insert(key, CacheEntry { id, layout });
        Ok(id)
    }

    /// Look up a previously registered source identity
    pub fn lookup(&self, key: &SourceKey) -> Option<TensorId> {
        self.entries.get(key).map(|e| e.id)
    }

    /// Number of cached identities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_idempotent() {
        let mut graph = Graph::new();
        let mut cache = TensorCache::new();

        let first = cache
            .register(&mut graph, SourceKey::Index(3), "x", Layout::Plain)
            .unwrap();
        let second = cache
            .register(&mut graph, SourceKey::Index(3), "x", Layout::Plain)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(graph.tensor_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_keys_distinct_tensors() {
        let mut graph = Graph::new();
        let mut cache = TensorCache::new();

        let a = cache
            .register(&mut graph, SourceKey::Index(0), "a", Layout::Plain)
            .unwrap();
        let b = cache
            .register(&mut graph, SourceKey::Named("a".to_string()), "a", Layout::Plain)
            .unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_layout_conflict_is_error() {
        let mut graph = Graph::new();
        let mut cache = TensorCache::new();

        cache
            .register(&mut graph, SourceKey::Index(1), "w", Layout::Khwc)
            .unwrap();
        let result = cache.register(&mut graph, SourceKey::Index(1), "w", Layout::Plain);

        assert!(matches!(result, Err(ParseError::CacheConflict { .. })));
    }

    #[test]
    fn test_layout_stamped_on_allocation() {
        let mut graph = Graph::new();
        let mut cache = TensorCache::new();

        let id = cache
            .register(&mut graph, SourceKey::Index(2), "w", Layout::Khwc)
            .unwrap();
        assert_eq!(graph.tensor(id).unwrap().layout, Layout::Khwc);
    }
}
