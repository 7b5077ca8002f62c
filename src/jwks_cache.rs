use std::collections::HashSet;
use std::time::Duration;

use moka::future::Cache;

use crate::jwk_set::{KeyMaterial, KeySet};

const MAX_CACHED_KEYS: u64 = 1024;
const MAX_CACHED_DOMAINS: u64 = 64;

/// Decoded verification keys, keyed by `(domain, kid)`.
///
/// Can safely be cloned and shared across tasks since moka internally uses an `Arc`.
#[derive(Clone)]
pub(crate) struct JwksCache {
    keys: Cache<(String, String), KeyMaterial>,
    /// The last fetched set per domain, kept for the minimum refetch interval.
    recent_key_sets: Option<Cache<String, KeySet>>,
}

impl JwksCache {
    pub(crate) fn new(time_to_live: Duration) -> Self {
        let keys = Cache::builder()
            .max_capacity(MAX_CACHED_KEYS)
            .time_to_live(time_to_live)
            .build();
        Self {
            keys,
            recent_key_sets: None,
        }
    }

    /// Lets at most one fetch per domain through within `interval`. Never longer than the key time to live, so an
    /// expired key is always fetched again.
    pub(crate) fn with_refetch_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            return self;
        }
        let interval = match self.keys.policy().time_to_live() {
            Some(time_to_live) => interval.min(time_to_live),
            None => interval,
        };
        self.recent_key_sets = Some(
            Cache::builder()
                .max_capacity(MAX_CACHED_DOMAINS)
                .time_to_live(interval)
                .build(),
        );
        self
    }

    pub(crate) async fn get(&self, domain: &str, kid: &str) -> Option<KeyMaterial> {
        self.keys.get(&(domain.to_owned(), kid.to_owned())).await
    }

    /// The set fetched for `domain` less than a refetch interval ago, if any.
    pub(crate) async fn recent_key_set(&self, domain: &str) -> Option<KeySet> {
        match &self.recent_key_sets {
            Some(recent) => recent.get(domain).await,
            None => None,
        }
    }

    /// Caches the decodable entries of a freshly fetched set and drops whatever else was cached for `domain`.
    ///
    /// New keys are inserted before stale ones are invalidated, so concurrent lookups of a key present in both sets
    /// keep hitting.
    pub(crate) async fn replace_domain(&self, domain: &str, key_set: &KeySet) {
        if let Some(recent) = &self.recent_key_sets {
            recent.insert(domain.to_owned(), key_set.clone()).await;
        }

        let mut current = HashSet::new();
        for entry in &key_set.keys {
            // Only the first entry per kid is reachable through a lookup.
            if !current.insert(entry.kid.as_str()) {
                continue;
            }
            match entry.key_material() {
                Ok(material) => {
                    self.keys
                        .insert((domain.to_owned(), entry.kid.clone()), material)
                        .await;
                }
                Err(err) => {
                    tracing::warn!(domain, kid = %entry.kid, error = %err, "skipping undecodable JWK");
                }
            }
        }

        let stale: Vec<(String, String)> = self
            .keys
            .iter()
            .filter(|(cached, _)| cached.0 == domain && !current.contains(cached.1.as_str()))
            .map(|(cached, _)| (*cached).clone())
            .collect();
        for key in &stale {
            self.keys.invalidate(key).await;
        }
    }
}
