use std::time::Duration;

use crate::authorization::AuthorizationLayer;
use crate::claims::ClaimNamespace;
use crate::remote_jwk_set::{KeyResolver, DEFAULT_HTTP_TIMEOUT, DEFAULT_REFETCH_INTERVAL};
use crate::validator::TokenValidator;

pub const DOMAIN_VAR: &str = "AUTH0_DOMAIN";
pub const AUDIENCE_VAR: &str = "AUTH0_AUDIENCE";
pub const CLAIM_NAMESPACE_VAR: &str = "AUTH0_CLAIM_NAMESPACE";
pub const JWKS_CACHE_TTL_VAR: &str = "AUTH0_JWKS_CACHE_TTL";
pub const JWKS_REFETCH_INTERVAL_VAR: &str = "AUTH0_JWKS_REFETCH_INTERVAL";
pub const HTTP_TIMEOUT_VAR: &str = "AUTH0_HTTP_TIMEOUT";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("{var} must be a bare domain without scheme or path, got {value:?}")]
    InvalidDomain { var: &'static str, value: String },
    #[error("{var} is not a valid duration")]
    InvalidDuration {
        var: &'static str,
        #[source]
        source: humantime::DurationError,
    },
}

/// Identity provider settings for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Provider domain, e.g. `example.auth0.com`.
    pub domain: String,
    /// API identifier access tokens must be issued for.
    pub audience: String,
    /// Prefix of the namespaced identity claims. Defaults to `https://{domain}/`.
    pub claim_namespace: Option<String>,
    /// Enables the key cache when set.
    pub jwks_cache_ttl: Option<Duration>,
    /// Minimum time between two JWK set fetches for the domain while the key cache is on. Zero disables it.
    pub jwks_refetch_interval: Duration,
    pub http_timeout: Duration,
}

impl AuthConfig {
    pub fn new(domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            audience: audience.into(),
            claim_namespace: None,
            jwks_cache_ttl: None,
            jwks_refetch_interval: DEFAULT_REFETCH_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Reads `AUTH0_DOMAIN`, `AUTH0_AUDIENCE` and the optional `AUTH0_CLAIM_NAMESPACE`, `AUTH0_JWKS_CACHE_TTL`,
    /// `AUTH0_JWKS_REFETCH_INTERVAL` and `AUTH0_HTTP_TIMEOUT` (durations such as `10s` or `5m`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let duration = |var: &'static str| {
            non_empty(var)
                .map(|value| {
                    humantime::parse_duration(value.trim())
                        .map_err(|source| ConfigError::InvalidDuration { var, source })
                })
                .transpose()
        };

        let domain = non_empty(DOMAIN_VAR).ok_or(ConfigError::Missing(DOMAIN_VAR))?;
        let domain = domain.trim();
        if domain.contains("://") || domain.contains('/') {
            return Err(ConfigError::InvalidDomain {
                var: DOMAIN_VAR,
                value: domain.to_owned(),
            });
        }
        let audience = non_empty(AUDIENCE_VAR).ok_or(ConfigError::Missing(AUDIENCE_VAR))?;

        Ok(Self {
            domain: domain.to_owned(),
            audience: audience.trim().to_owned(),
            claim_namespace: non_empty(CLAIM_NAMESPACE_VAR),
            jwks_cache_ttl: duration(JWKS_CACHE_TTL_VAR)?,
            jwks_refetch_interval: duration(JWKS_REFETCH_INTERVAL_VAR)?.unwrap_or(DEFAULT_REFETCH_INTERVAL),
            http_timeout: duration(HTTP_TIMEOUT_VAR)?.unwrap_or(DEFAULT_HTTP_TIMEOUT),
        })
    }

    pub fn claim_namespace(&self) -> ClaimNamespace {
        match &self.claim_namespace {
            Some(namespace) => ClaimNamespace::new(namespace),
            None => ClaimNamespace::new(&self.domain),
        }
    }

    pub fn resolver(&self) -> KeyResolver {
        let builder = KeyResolver::builder().with_http_timeout(self.http_timeout);
        let builder = match self.jwks_cache_ttl {
            Some(ttl) => builder.with_cache(ttl),
            None => builder,
        };
        let builder = if self.jwks_refetch_interval.is_zero() {
            builder
        } else {
            builder.with_refetch_interval(self.jwks_refetch_interval)
        };
        builder.build()
    }

    pub fn validator(&self) -> TokenValidator {
        TokenValidator::new(self.resolver(), self.claim_namespace())
    }

    /// The Gate middleware for this provider and audience.
    pub fn layer(&self) -> AuthorizationLayer {
        AuthorizationLayer::new(self.validator(), &self.domain, &self.audience)
    }
}
