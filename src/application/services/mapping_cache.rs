//! Bidirectional original ↔ CDN URL table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

/// In-memory URL pair table for one page session.
///
/// Inserting `(original, cdn)` makes each URL resolve to the other.
/// Entries live as long as the session; nothing is evicted.
#[derive(Debug, Default)]
pub struct MappingCache {
    pairs: HashMap<String, String>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MappingCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transcoded pair in both directions.
    pub fn insert_pair(&mut self, original: &str, cdn: &str) {
        trace!(original = %original, cdn = %cdn, "Caching URL pair");
        self.pairs.insert(original.to_string(), cdn.to_string());
        self.pairs.insert(cdn.to_string(), original.to_string());
    }

    /// Returns the URL paired with `url`, if any.
    #[must_use]
    pub fn lookup(&self, url: &str) -> Option<&str> {
        if let Some(paired) = self.pairs.get(url) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(paired.as_str())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Number of directed entries (two per pair).
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns lookup statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> MappingStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        MappingStats {
            hits,
            misses,
            hit_rate,
            entries: self.len(),
        }
    }
}

/// Statistics about mapping lookups.
#[derive(Debug, Clone)]
pub struct MappingStats {
    /// Lookups that found a pair.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Directed entries held.
    pub entries: usize,
}

impl std::fmt::Display for MappingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mappings: {} entries, {:.1}% hit rate ({} hits, {} misses)",
            self.entries, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_symmetric() {
        let mut cache = MappingCache::new();
        cache.insert_pair("https://a.com/x.jpg", "https://cdn/a.com/x.webp");

        assert_eq!(
            cache.lookup("https://a.com/x.jpg"),
            Some("https://cdn/a.com/x.webp")
        );
        assert_eq!(
            cache.lookup("https://cdn/a.com/x.webp"),
            Some("https://a.com/x.jpg")
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_miss() {
        let cache = MappingCache::new();
        assert!(cache.lookup("https://nowhere/").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats() {
        let mut cache = MappingCache::new();
        cache.insert_pair("a", "b");

        let _ = cache.lookup("a");
        let _ = cache.lookup("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 2);
        assert!(stats.to_string().contains("50.0%"));
    }
}
