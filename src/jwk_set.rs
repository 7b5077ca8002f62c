use std::fmt;

use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use x509_cert::{
    der::{DecodePem, ErrorKind},
    spki::ObjectIdentifier,
    Certificate,
};

use crate::Error;

/// `rsaEncryption` (PKCS #1).
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

const PEM_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const PEM_FOOTER: &str = "-----END CERTIFICATE-----";
/// RFC 7468 line width of the base64 body.
const PEM_LINE_WIDTH: usize = 64;

/// A JWK set as published by the identity provider at `/.well-known/jwks.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    pub keys: Vec<KeyEntry>,
}

impl KeySet {
    /// Returns the first entry, in published order, whose key ID equals `kid`.
    pub fn find(&self, kid: &str) -> Option<&KeyEntry> {
        self.keys.iter().find(|entry| entry.kid == kid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub kid: String,
    #[serde(default, rename = "use")]
    pub key_use: String,
    #[serde(default)]
    pub n: String,
    #[serde(default)]
    pub e: String,
    /// Base64 (not URL-safe) DER certificates, leaf first.
    #[serde(default)]
    pub x5c: Vec<String>,
}

impl KeyEntry {
    /// The leaf certificate of the chain wrapped in PEM armor, if the entry has one.
    pub fn certificate_pem(&self) -> Option<String> {
        let cert = self.x5c.first()?;
        let mut pem = String::with_capacity(cert.len() + cert.len() / PEM_LINE_WIDTH + 64);
        pem.push_str(PEM_HEADER);
        pem.push('\n');
        // Non-ASCII input is not base64 and fails PEM decoding regardless of where it is split.
        for line in cert.as_bytes().chunks(PEM_LINE_WIDTH) {
            pem.push_str(&String::from_utf8_lossy(line));
            pem.push('\n');
        }
        pem.push_str(PEM_FOOTER);
        pem.push('\n');
        Some(pem)
    }

    /// Turns this entry into an RS256 verification key.
    ///
    /// The leaf certificate is preferred. Entries without a certificate chain fall back to the `n`/`e` components.
    pub fn key_material(&self) -> Result<KeyMaterial, Error> {
        if self.kty != "RSA" {
            return Err(Error::UnsupportedKeyType(self.kty.clone()));
        }

        let decoding_key = match self.certificate_pem() {
            Some(pem) => decode_certificate_pem(&pem)?,
            None if !self.n.is_empty() && !self.e.is_empty() => {
                DecodingKey::from_rsa_components(&self.n, &self.e).map_err(Error::InvalidJwk)?
            }
            None => {
                return Err(Error::MissingKeyMaterial {
                    kid: self.kid.clone(),
                })
            }
        };

        Ok(KeyMaterial {
            kid: self.kid.clone(),
            decoding_key,
        })
    }
}

/// A public key ready for signature verification, tagged with the key ID it was published under.
#[derive(Clone)]
pub struct KeyMaterial {
    kid: String,
    decoding_key: DecodingKey,
}

impl KeyMaterial {
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Extracts the RSA public key from a PEM encoded X.509 certificate.
///
/// The armor must be labelled `CERTIFICATE`.
pub fn decode_certificate_pem(pem: &str) -> Result<DecodingKey, Error> {
    let certificate = Certificate::from_pem(pem).map_err(|err| match err.kind() {
        ErrorKind::Pem(_) => Error::InvalidCertificateEncoding(err),
        _ => Error::InvalidCertificate(err),
    })?;

    let spki = &certificate.tbs_certificate.subject_public_key_info;
    if spki.algorithm.oid != RSA_ENCRYPTION {
        return Err(Error::UnsupportedKeyType(spki.algorithm.oid.to_string()));
    }

    // The BIT STRING wraps a PKCS #1 RSAPublicKey, which is what `from_rsa_der` expects.
    Ok(DecodingKey::from_rsa_der(spki.subject_public_key.raw_bytes()))
}
