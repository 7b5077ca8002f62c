//! Fixtures shared by the unit tests: RSA signing keys with self-signed certificates, a mocked identity provider
//! serving its JWK set, and provider-shaped access tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    hash::MessageDigest,
    pkey::{PKey, Private},
    rsa::Rsa,
    x509::{X509NameBuilder, X509},
};
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::claims::ClaimNamespace;
use crate::jwk_set::{KeyEntry, KeySet};
use crate::remote_jwk_set::{KeyResolver, JWKS_PATH};
use crate::validator::TokenValidator;

pub(crate) const AUDIENCE: &str = "https://api.example.com";
pub(crate) const NAMESPACE: &str = "https://kapcomperu.com/";

pub(crate) struct TestKey {
    pub kid: String,
    rsa: Rsa<Private>,
    certificate_der: Vec<u8>,
}

impl TestKey {
    pub fn new(kid: &str) -> Self {
        let rsa = Rsa::generate(2048).unwrap();
        let pkey = PKey::from_rsa(rsa.clone()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "test-tenant.example.com").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder
            .set_serial_number(&BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();
        let certificate_der = builder.build().to_der().unwrap();

        Self {
            kid: kid.to_owned(),
            rsa,
            certificate_der,
        }
    }

    /// JWK as Auth0 publishes it, with both the certificate chain and the RSA components.
    pub fn jwk(&self) -> KeyEntry {
        KeyEntry {
            x5c: vec![STANDARD.encode(&self.certificate_der)],
            ..self.jwk_without_certificate()
        }
    }

    pub fn jwk_without_certificate(&self) -> KeyEntry {
        KeyEntry {
            kty: "RSA".to_owned(),
            kid: self.kid.clone(),
            key_use: "sig".to_owned(),
            n: URL_SAFE_NO_PAD.encode(self.rsa.n().to_vec()),
            e: URL_SAFE_NO_PAD.encode(self.rsa.e().to_vec()),
            x5c: Vec::new(),
        }
    }

    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        let key = EncodingKey::from_rsa_der(&self.rsa.private_key_to_der().unwrap());
        jsonwebtoken::encode(header, claims, &key).unwrap()
    }
}

/// An identity provider serving a JWK set at `/.well-known/jwks.json`.
pub(crate) struct MockProvider {
    server: MockServer,
}

impl MockProvider {
    pub async fn start(keys: Vec<KeyEntry>) -> Self {
        let provider = MockProvider {
            server: MockServer::start().await,
        };
        provider.publish(keys).await;
        provider
    }

    /// Replaces the published key set, e.g. to simulate key rotation.
    pub async fn publish(&self, keys: Vec<KeyEntry>) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(KeySet { keys }))
            .mount(&self.server)
            .await;
    }

    /// `host:port`, usable wherever a provider domain is expected.
    pub fn domain(&self) -> String {
        self.server.address().to_string()
    }

    pub async fn jwks_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Claims of an access token issued by `domain` for [`AUDIENCE`].
pub(crate) fn access_token_claims(domain: &str, permissions: &[&str]) -> Value {
    let now = unix_now();
    json!({
        "sub": "auth0|5f7c8ec7c33c6c004bbafe82",
        "iss": format!("https://{domain}/"),
        "aud": [AUDIENCE, format!("https://{domain}/userinfo")],
        "iat": now,
        "exp": now + 3600,
        "scope": "openid profile email",
        "permissions": permissions,
        "https://kapcomperu.com/email": "ada@example.com",
        "https://kapcomperu.com/name": "Ada Lovelace",
        "https://kapcomperu.com/roles": ["admin", "editor"],
    })
}

pub(crate) fn validator() -> TokenValidator {
    TokenValidator::new(
        KeyResolver::builder().with_plain_http().build(),
        ClaimNamespace::new(NAMESPACE),
    )
}
