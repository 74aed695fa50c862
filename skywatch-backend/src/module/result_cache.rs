//! Short-lived memo of serialized responses, keyed by a canonical request
//! fingerprint.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct CachedPayload {
    body: String,
    expires_at: Instant,
}

pub struct ResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedPayload>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Payload stored under `key`, unless it has expired.
    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.body.clone())
    }

    /// Store `body` under `key`, replacing any earlier payload.
    pub async fn put(&self, key: impl Into<String>, body: impl Into<String>) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        if entries.len() < before {
            debug!("Pruned {} expired results", before - entries.len());
        }

        entries.insert(
            key.into(),
            CachedPayload {
                body: body.into(),
                expires_at: now + self.ttl,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Canonical key: `kind?a=1&b=2` with parameters sorted by name.
pub fn fingerprint(kind: &str, params: &[(&str, String)]) -> String {
    let mut params: Vec<&(&str, String)> = params.iter().collect();
    params.sort_by(|a, b| a.0.cmp(b.0));

    let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", kind, query.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hit_returns_stored_bytes() {
        let cache = ResultCache::new(Duration::from_secs(30));
        cache.put("passes?lat=1", r#"{"passes":[]}"#).await;

        assert_eq!(cache.get("passes?lat=1").await.as_deref(), Some(r#"{"passes":[]}"#));
        assert_eq!(cache.get("passes?lat=2").await, None);
    }

    #[tokio::test]
    async fn test_later_put_replaces_earlier() {
        let cache = ResultCache::new(Duration::from_secs(30));
        cache.put("k", "one").await;
        cache.put("k", "two").await;

        assert_eq!(cache.get("k").await.as_deref(), Some("two"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_miss_and_get_pruned() {
        let cache = ResultCache::new(Duration::ZERO);
        cache.put("a", "1").await;
        assert_eq!(cache.get("a").await, None);

        cache.put("b", "2").await;
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn test_fingerprint_ignores_parameter_order() {
        let a = fingerprint("passes", &[("lat", "29.760000".into()), ("lon", "-95.370000".into())]);
        let b = fingerprint("passes", &[("lon", "-95.370000".into()), ("lat", "29.760000".into())]);

        assert_eq!(a, b);
        assert_eq!(a, "passes?lat=29.760000&lon=-95.370000");
        assert_ne!(a, fingerprint("track", &[("lat", "29.760000".into())]));
    }
}
