use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use jsonwebtoken::Algorithm;
use serde_json::json;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("failed to decode token")]
    MalformedToken(#[source] jsonwebtoken::errors::Error),
    #[error("missing kid in token header")]
    MissingKid,
    #[error("unsupported signing algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("invalid audience")]
    InvalidAudience,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("token has expired")]
    ExpiredToken,
    #[error("JWT validation failed")]
    InvalidJwt(#[source] jsonwebtoken::errors::Error),
    #[error("insufficient scope, {0:?} required")]
    InsufficientScope(String),
    #[error("invalid provider domain {0:?}")]
    InvalidDomain(String),
    #[error("failed to fetch JWK set")]
    FailedJwkSetRequest(#[from] reqwest::Error),
    #[error("received error response when fetching JWK set: {status_code}")]
    JwkSetRequestErrorResponse { status_code: StatusCode },
    #[error("JWK set payload too large: {0} bytes")]
    JwkSetTooLarge(usize),
    #[error("failed to parse JWK set")]
    MalformedJwkSet(#[source] serde_json::Error),
    #[error("unable to find appropriate key for kid {0:?}")]
    KeyNotFound(String),
    #[error("JWK {kid:?} carries no certificate or RSA components")]
    MissingKeyMaterial { kid: String },
    #[error("unsupported key type {0}")]
    UnsupportedKeyType(String),
    #[error("failed to decode PEM certificate")]
    InvalidCertificateEncoding(#[source] x509_cert::der::Error),
    #[error("failed to parse X.509 certificate")]
    InvalidCertificate(#[source] x509_cert::der::Error),
    #[error("failed to decode JWK into key")]
    InvalidJwk(#[source] jsonwebtoken::errors::Error),
}

impl Error {
    /// HTTP status the calling middleware answers with when this error rejects a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InsufficientScope(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (self.status_code(), body).into_response()
    }
}
