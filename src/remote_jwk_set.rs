use std::time::Duration;

use http::StatusCode;
use reqwest::Client;
use url::Url;

use crate::jwk_set::{KeyMaterial, KeySet};
use crate::jwks_cache::JwksCache;
use crate::Error;

/// Path below the provider domain where the JWK set is published.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Upper bound on the size of a JWK set response body.
pub const MAX_JWKS_SIZE: usize = 1 << 20;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

/// Builder for configuring a [`KeyResolver`] with an optional key cache.
pub struct KeyResolverBuilder {
    cache_time_to_live: Option<Duration>,
    refetch_interval: Option<Duration>,
    http_timeout: Duration,
    scheme: &'static str,
}

impl KeyResolverBuilder {
    pub fn new() -> Self {
        Self {
            cache_time_to_live: None,
            refetch_interval: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            scheme: "https",
        }
    }

    /// Caches decoded keys per `(domain, kid)` for at most `time_to_live`.
    ///
    /// A lookup for an unknown kid refetches the JWK set, so rotated keys are picked up immediately. Use
    /// [`KeyResolverBuilder::with_refetch_interval`] to bound how often that happens.
    pub fn with_cache(mut self, time_to_live: Duration) -> Self {
        self.cache_time_to_live = Some(time_to_live);
        self
    }

    /// Fetches a domain's JWK set at most once per `interval`. Lookups for unknown kids in between are answered from
    /// the last fetched set.
    ///
    /// Tokens carrying made-up key IDs would otherwise cost one request to the provider each. Only takes effect
    /// together with [`KeyResolverBuilder::with_cache`], and never exceeds its time to live.
    pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    /// Bounds every JWK set request, including connecting and reading the body.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Fetches JWK sets over plain HTTP. Only meant for local test providers.
    pub fn with_plain_http(mut self) -> Self {
        self.scheme = "http";
        self
    }

    pub fn build(self) -> KeyResolver {
        let refetch_interval = self.refetch_interval;
        let cache = self.cache_time_to_live.map(|time_to_live| {
            let cache = JwksCache::new(time_to_live);
            match refetch_interval {
                Some(interval) => cache.with_refetch_interval(interval),
                None => cache,
            }
        });

        KeyResolver {
            http_client: Client::new(),
            http_timeout: self.http_timeout,
            cache,
            scheme: self.scheme,
        }
    }
}

impl Default for KeyResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the verification key for a token by looking up its `kid` in the provider's published JWK set.
#[derive(Clone)]
pub struct KeyResolver {
    http_client: Client,
    http_timeout: Duration,
    cache: Option<JwksCache>,
    scheme: &'static str,
}

impl KeyResolver {
    /// Creates a builder for configuring a `KeyResolver`.
    pub fn builder() -> KeyResolverBuilder {
        KeyResolverBuilder::new()
    }

    /// The JWK set location for a bare provider domain such as `example.auth0.com`.
    pub fn jwks_url(&self, domain: &str) -> Result<Url, Error> {
        if domain.is_empty() || domain.contains("://") || domain.contains('/') {
            return Err(Error::InvalidDomain(domain.to_owned()));
        }
        Url::parse(&format!("{}://{domain}{JWKS_PATH}", self.scheme))
            .map_err(|_| Error::InvalidDomain(domain.to_owned()))
    }

    /// Fetches and parses the provider's JWK set. Never consults the cache.
    pub async fn fetch_key_set(&self, domain: &str) -> Result<KeySet, Error> {
        let url = self.jwks_url(domain)?;
        tracing::debug!(%url, "fetching JWK set");

        let mut response = self
            .http_client
            .get(url)
            .timeout(self.http_timeout)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(Error::JwkSetRequestErrorResponse {
                status_code: response.status(),
            });
        }

        if let Some(length) = response.content_length() {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if length > MAX_JWKS_SIZE {
                return Err(Error::JwkSetTooLarge(length));
            }
        }

        // The declared length may be missing or wrong, so the cap is enforced while reading as well.
        let mut payload = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let length = payload.len() + chunk.len();
            if length > MAX_JWKS_SIZE {
                return Err(Error::JwkSetTooLarge(length));
            }
            payload.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&payload).map_err(Error::MalformedJwkSet)
    }

    /// Returns the key published under `kid` by `domain`.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_key(&self, kid: &str, domain: &str) -> Result<KeyMaterial, Error> {
        let key_set = match &self.cache {
            Some(cache) => {
                if let Some(material) = cache.get(domain, kid).await {
                    tracing::debug!("key cache hit");
                    return Ok(material);
                }

                match cache.recent_key_set(domain).await {
                    Some(key_set) => {
                        tracing::debug!("key cache miss, JWK set fetched too recently to refetch");
                        key_set
                    }
                    None => {
                        tracing::debug!("key cache miss");
                        let key_set = self.fetch_key_set(domain).await?;
                        cache.replace_domain(domain, &key_set).await;
                        key_set
                    }
                }
            }
            None => self.fetch_key_set(domain).await?,
        };

        key_set
            .find(kid)
            .ok_or_else(|| Error::KeyNotFound(kid.to_owned()))?
            .key_material()
    }
}
