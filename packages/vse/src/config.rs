use serde::Deserialize;
use std::time::Duration;

/// Engine tuning knobs. Every field has a default so partial documents parse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of row ids stored per selection chunk.
    pub selection_chunk_size: usize,
    /// Page requests longer than this are clamped.
    pub max_page_length: usize,
    /// Capacity of the computed-layout LRU.
    pub layout_cache_capacity: usize,
    /// Capacity of the loaded-record cache used by the row materializer.
    pub record_cache_capacity: usize,
    /// Optional time-to-live of cached records.
    pub record_cache_ttl_secs: Option<u64>,
    /// Upper bound for attribute typeahead suggestions.
    pub typeahead_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            selection_chunk_size: 1000,
            max_page_length: 1000,
            layout_cache_capacity: 10,
            record_cache_capacity: 2048,
            record_cache_ttl_secs: None,
            typeahead_limit: 10,
        }
    }
}

impl EngineConfig {
    /// Reads `VSE_*` environment variables, keeping defaults for missing or unparsable ones.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |name: &str, default: usize| {
            lookup(name)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        Self {
            selection_chunk_size: parse("VSE_SELECTION_CHUNK_SIZE", defaults.selection_chunk_size),
            max_page_length: parse("VSE_MAX_PAGE_LENGTH", defaults.max_page_length),
            layout_cache_capacity: parse("VSE_LAYOUT_CACHE_CAPACITY", defaults.layout_cache_capacity),
            record_cache_capacity: parse("VSE_RECORD_CACHE_CAPACITY", defaults.record_cache_capacity),
            record_cache_ttl_secs: lookup("VSE_RECORD_CACHE_TTL_SECS")
                .and_then(|s| s.trim().parse::<u64>().ok()),
            typeahead_limit: parse("VSE_TYPEAHEAD_LIMIT", defaults.typeahead_limit),
        }
    }

    pub fn record_cache_ttl(&self) -> Option<Duration> {
        self.record_cache_ttl_secs.map(Duration::from_secs)
    }

    /// Chunk size with a floor of one.
    pub(crate) fn chunk_size(&self) -> usize {
        self.selection_chunk_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"selection_chunk_size": 64}"#).unwrap();
        assert_eq!(config.selection_chunk_size, 64);
        assert_eq!(config.typeahead_limit, 10);
        assert_eq!(config.record_cache_ttl(), None);
    }

    #[test]
    fn test_lookup_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("VSE_MAX_PAGE_LENGTH", "250"),
            ("VSE_TYPEAHEAD_LIMIT", "lots"),
            ("VSE_SELECTION_CHUNK_SIZE", "0"),
            ("VSE_RECORD_CACHE_TTL_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.max_page_length, 250);
        assert_eq!(config.typeahead_limit, 10);
        assert_eq!(config.selection_chunk_size, 1000);
        assert_eq!(config.record_cache_ttl(), Some(Duration::from_secs(30)));
    }
}
