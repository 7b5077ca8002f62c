use http::{header::AUTHORIZATION, HeaderMap};

use crate::Error;

const BEARER_SCHEME: &str = "Bearer";

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// The value must consist of exactly two whitespace separated segments, the first being the (case-insensitive)
/// `Bearer` scheme.
pub fn parse_authorization_header(value: &str) -> Result<&str, Error> {
    let mut segments = value.split_whitespace();
    match (segments.next(), segments.next(), segments.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case(BEARER_SCHEME) => Ok(token),
        _ => Err(Error::MalformedHeader),
    }
}

/// Reads and parses the bearer token of a request's `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, Error> {
    let value = headers.get(AUTHORIZATION).ok_or(Error::MissingHeader)?;
    let value = value.to_str().map_err(|_| Error::MalformedHeader)?;
    parse_authorization_header(value)
}
