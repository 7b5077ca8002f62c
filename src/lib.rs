//! Bearer token authentication and permission checks for [`axum`](https://docs.rs/axum) services whose users sign
//! in through a hosted identity provider such as Auth0.
//!
//! ## Overview
//!
//! The provider signs access tokens ([JWT](https://datatracker.ietf.org/doc/html/rfc7519)) with RSA keys it
//! publishes as a [JWK set](https://datatracker.ietf.org/doc/html/rfc7517) at
//! `https://{domain}/.well-known/jwks.json`. Validating a token takes two steps:
//!
//! 1. **Key resolution**: [`KeyResolver`] fetches the JWK set, picks the entry whose `kid` matches the token header
//!    and turns its certificate into an RS256 verification key.
//! 2. **Verification**: [`TokenValidator`] checks the signature (RS256 only), the issuer `https://{domain}/`, the
//!    audience and the expiry, then hands out the token's [`Claims`].
//!
//! On top of that, two modes are offered:
//!
//! - **Gate**: reject any request without a valid token. Available as a `tower` layer, [`AuthorizationLayer`], and
//!   as [`TokenValidator::authenticate`].
//! - **Scope check**: [`TokenValidator::check_scope`] extracts identity and permission claims and tells whether a
//!   permission such as `write:items` was granted. It never fails; rejected tokens come back with `valid == false`.
//!
//! Keys are fetched per validation unless [`KeyResolverBuilder::with_cache`] is used, in which case they are cached
//! per `(domain, kid)` and unknown key IDs trigger a refetch to pick up rotated keys, at most once per
//! [`KeyResolverBuilder::with_refetch_interval`].
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{routing::get, Extension};
//! use auth0_gate::{AuthConfig, Claims};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // AUTH0_DOMAIN=example.auth0.com AUTH0_AUDIENCE=https://api.example.com
//!     let config = AuthConfig::from_env()?;
//!
//!     let router = axum::Router::new()
//!         .route("/protected", get(|Extension(claims): Extension<Claims>| async move {
//!             format!("Hello {}!", claims.sub)
//!         }))
//!         .layer(config.layer());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```
//!
//! Handlers that need finer grained decisions can check a permission explicitly:
//!
//! ```rust,no_run
//! # async fn handler(validator: auth0_gate::TokenValidator, authorization: &str) {
//! let result = validator
//!     .check_scope(authorization, "write:items", "example.auth0.com")
//!     .await;
//! if !result.valid {
//!     // 403
//! }
//! # }
//! ```

pub mod authorization;
pub mod bearer;
pub mod claims;
pub mod config;
pub mod jwk_set;
pub mod remote_jwk_set;
pub mod validator;

pub use authorization::AuthorizationLayer;
pub use claims::{Audience, AuthorizationResult, ClaimNamespace, Claims};
pub use config::{AuthConfig, ConfigError};
pub use error::Error;
pub use jwk_set::{KeyEntry, KeyMaterial, KeySet};
pub use remote_jwk_set::{KeyResolver, KeyResolverBuilder};
pub use validator::TokenValidator;

mod error;
mod jwks_cache;

#[cfg(test)]
mod testutil;
