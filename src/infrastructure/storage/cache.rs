// Per-provider result cache
use crate::domain::model::MatchRecord;
use std::collections::HashMap;

/// Results a single provider produced, keyed by the exact query string.
///
/// Keys are not normalized: `"Hello"` and `"hello "` are different entries.
/// There is no expiry; `clear()` is the only way entries go away. The cache
/// is not synchronized, its owner serializes access.
#[derive(Debug, Default)]
pub struct ResultCache {
    map: HashMap<String, Vec<MatchRecord>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get(&self, query: &str) -> Option<&[MatchRecord]> {
        self.map.get(query).map(Vec::as_slice)
    }

    pub fn put(&mut self, query: String, results: Vec<MatchRecord>) {
        self.map.insert(query, results);
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target: &str) -> MatchRecord {
        MatchRecord::new("Hello", target, Some(100), None)
    }

    #[test]
    fn keys_are_exact() {
        let mut cache = ResultCache::new();
        cache.put("Hello".to_string(), vec![record("Bonjour")]);

        assert_eq!(cache.get("Hello"), Some(&[record("Bonjour")][..]));
        assert!(cache.get("hello").is_none());
        assert!(cache.get("Hello ").is_none());
    }

    #[test]
    fn put_replaces_and_keeps_order() {
        let mut cache = ResultCache::new();
        cache.put("Hello".to_string(), vec![record("Salut")]);
        cache.put(
            "Hello".to_string(),
            vec![record("Bonjour"), record("Salut")],
        );

        let hit = cache.get("Hello").unwrap();
        assert_eq!(hit[0].target_text(), "Bonjour");
        assert_eq!(hit[1].target_text(), "Salut");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let mut cache = ResultCache::new();
        cache.put("a".to_string(), vec![]);
        cache.put("b".to_string(), vec![record("x")]);
        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }
}
