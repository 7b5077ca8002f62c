use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, Validation};
use serde::Deserialize;

use crate::bearer::parse_authorization_header;
use crate::claims::{Audience, AuthorizationResult, ClaimNamespace, Claims};
use crate::jwk_set::KeyMaterial;
use crate::remote_jwk_set::KeyResolver;
use crate::Error;

/// The only accepted signing algorithm, enforced before the token's own header is trusted for anything else.
pub const REQUIRED_ALGORITHM: Algorithm = Algorithm::RS256;

/// Validates provider-issued access tokens against the provider's published keys.
///
/// Two modes are offered:
///
/// - **Gate** ([`TokenValidator::validate_for_request`], [`TokenValidator::authenticate`]): accept or reject a
///   request purely on token validity, failing with a typed [`Error`].
/// - **Scope check** ([`TokenValidator::check_scope`]): additionally extract identity and permission claims and test
///   for a required permission. Never fails; rejected tokens yield an [`AuthorizationResult`] with `valid == false`.
#[derive(Clone)]
pub struct TokenValidator {
    resolver: KeyResolver,
    namespace: ClaimNamespace,
    scope_audience: Option<String>,
}

impl TokenValidator {
    pub fn new(resolver: KeyResolver, namespace: ClaimNamespace) -> Self {
        Self {
            resolver,
            namespace,
            scope_audience: None,
        }
    }

    /// Makes [`TokenValidator::check_scope`] verify the `aud` claim too. Gate mode always does.
    pub fn require_audience(mut self, audience: impl Into<String>) -> Self {
        self.scope_audience = Some(audience.into());
        self
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    pub fn namespace(&self) -> &ClaimNamespace {
        &self.namespace
    }

    /// Gate mode key lookup: checks audience and issuer, then resolves the key the token claims to be signed with.
    ///
    /// Audience and issuer are read from the not yet verified payload so that foreign tokens are turned away without
    /// a round trip to the provider. The returned key still has to verify the signature, see
    /// [`TokenValidator::authenticate`].
    #[tracing::instrument(skip(self, raw_token))]
    pub async fn validate_for_request(
        &self,
        raw_token: &str,
        audience: &str,
        domain: &str,
    ) -> Result<KeyMaterial, Error> {
        let kid = signing_kid(raw_token)?;
        let unverified = unverified_claims(raw_token)?;

        if !unverified
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(audience))
        {
            return Err(Error::InvalidAudience);
        }
        if unverified.iss.as_deref() != Some(expected_issuer(domain).as_str()) {
            return Err(Error::InvalidIssuer);
        }

        self.resolver.resolve_key(&kid, domain).await
    }

    /// Gate mode: a fully verified token for `audience` issued by `domain`, or the reason it was rejected.
    pub async fn authenticate(
        &self,
        raw_token: &str,
        audience: &str,
        domain: &str,
    ) -> Result<Claims, Error> {
        let key = self
            .validate_for_request(raw_token, audience, domain)
            .await?;
        verify_with_key(raw_token, &key, domain, Some(audience))
    }

    /// Resolves the signing key and verifies signature, issuer, expiry and (if given) audience.
    pub async fn verify(
        &self,
        raw_token: &str,
        domain: &str,
        audience: Option<&str>,
    ) -> Result<Claims, Error> {
        let kid = signing_kid(raw_token)?;
        let key = self.resolver.resolve_key(&kid, domain).await?;
        verify_with_key(raw_token, &key, domain, audience)
    }

    /// Scope-check mode for a raw `Authorization` header value.
    #[tracing::instrument(skip(self, authorization_header))]
    pub async fn check_scope(
        &self,
        authorization_header: &str,
        required_scope: &str,
        domain: &str,
    ) -> AuthorizationResult {
        let verified = match parse_authorization_header(authorization_header) {
            Ok(token) => {
                self.verify(token, domain, self.scope_audience.as_deref())
                    .await
            }
            Err(err) => Err(err),
        };

        match verified {
            Ok(claims) => {
                let result = AuthorizationResult::from_claims(&claims, &self.namespace, required_scope);
                if !result.valid {
                    tracing::debug!(sub = %claims.sub, "token lacks required scope");
                }
                result
            }
            Err(err) => {
                tracing::warn!(error = %err, "rejecting token");
                AuthorizationResult::rejected(err)
            }
        }
    }
}

/// The `iss` value tokens issued by `domain` carry.
pub fn expected_issuer(domain: &str) -> String {
    format!("https://{domain}/")
}

/// Verifies `raw_token` with an already resolved key.
pub fn verify_with_key(
    raw_token: &str,
    key: &KeyMaterial,
    domain: &str,
    audience: Option<&str>,
) -> Result<Claims, Error> {
    let kid = signing_kid(raw_token)?;
    if kid != key.kid() {
        return Err(Error::KeyNotFound(kid));
    }

    let mut validation = Validation::new(REQUIRED_ALGORITHM);
    validation.set_issuer(&[expected_issuer(domain)]);
    validation.validate_nbf = true;
    match audience {
        Some(audience) => {
            validation.set_audience(&[audience]);
            validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
        }
        None => {
            validation.validate_aud = false;
            validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        }
    }

    decode::<Claims>(raw_token, key.decoding_key(), &validation)
        .map(|token| token.claims)
        .map_err(map_decode_error)
}

/// The `kid` of an RS256 token. Any other algorithm is refused here, whatever key the token points at.
fn signing_kid(raw_token: &str) -> Result<String, Error> {
    let header = decode_header(raw_token).map_err(Error::MalformedToken)?;
    if header.alg != REQUIRED_ALGORITHM {
        return Err(Error::UnsupportedAlgorithm(header.alg));
    }
    header
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(Error::MissingKid)
}

#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
}

fn unverified_claims(raw_token: &str) -> Result<UnverifiedClaims, Error> {
    let malformed = || Error::MalformedToken(ErrorKind::InvalidToken.into());
    let payload = raw_token.split('.').nth(1).ok_or_else(malformed)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload.as_bytes())
        .map_err(|_| malformed())?;
    serde_json::from_slice(&payload).map_err(|_| malformed())
}

fn map_decode_error(error: jsonwebtoken::errors::Error) -> Error {
    match error.kind() {
        ErrorKind::ExpiredSignature => Error::ExpiredToken,
        ErrorKind::InvalidAudience => Error::InvalidAudience,
        ErrorKind::InvalidIssuer => Error::InvalidIssuer,
        _ => Error::InvalidJwt(error),
    }
}
