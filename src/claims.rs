use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// The `aud` claim, which providers emit either as a single string or as an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(value) => value == audience,
            Audience::Many(values) => values.iter().any(|value| value == audience),
        }
    }
}

impl Default for Audience {
    fn default() -> Self {
        Audience::Many(Vec::new())
    }
}

/// Prefix of the provider-specific claims, e.g. `https://example.com/` for `https://example.com/email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimNamespace(String);

impl ClaimNamespace {
    /// Accepts either a bare host (`example.com`) or a full prefix (`https://example.com/`).
    pub fn new(namespace: impl AsRef<str>) -> Self {
        let namespace = namespace.as_ref().trim();
        let mut prefix = if namespace.starts_with("https://") || namespace.starts_with("http://") {
            namespace.to_owned()
        } else {
            format!("https://{namespace}")
        };
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self(prefix)
    }

    pub fn claim(&self, name: &str) -> String {
        format!("{}{name}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Payload of a verified access token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: Audience,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Everything else, including the namespaced provider claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn has_permission(&self, scope: &str) -> bool {
        self.permissions.iter().any(|permission| permission == scope)
    }

    pub fn email(&self, namespace: &ClaimNamespace) -> String {
        self.namespaced_string(namespace, "email")
    }

    pub fn name(&self, namespace: &ClaimNamespace) -> String {
        self.namespaced_string(namespace, "name")
    }

    /// Every role in the namespaced `roles` claim, in token order.
    ///
    /// Roles that are not JSON strings are kept in their JSON text form, and a lone string counts as one role.
    pub fn roles(&self, namespace: &ClaimNamespace) -> Vec<String> {
        match self.extra.get(&namespace.claim("roles")) {
            Some(Value::Array(roles)) => roles
                .iter()
                .map(|role| match role {
                    Value::String(role) => role.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(role)) => vec![role.clone()],
            _ => Vec::new(),
        }
    }

    fn namespaced_string(&self, namespace: &ClaimNamespace, name: &str) -> String {
        self.extra
            .get(&namespace.claim(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    }
}

/// Outcome of a scope check.
///
/// `valid` is only `true` for a verified token whose `permissions` contain the requested scope. Callers must treat
/// a result with `valid == false` as unauthenticated, whatever else it holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuthorizationResult {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub valid: bool,
    #[serde(skip)]
    failure: Option<Arc<Error>>,
}

impl AuthorizationResult {
    pub(crate) fn from_claims(claims: &Claims, namespace: &ClaimNamespace, scope: &str) -> Self {
        Self {
            name: claims.name(namespace),
            email: claims.email(namespace),
            subject: claims.sub.clone(),
            roles: claims.roles(namespace),
            permissions: claims.permissions.clone(),
            valid: claims.has_permission(scope),
            failure: None,
        }
    }

    pub(crate) fn rejected(error: Error) -> Self {
        Self {
            failure: Some(Arc::new(error)),
            ..Self::default()
        }
    }

    /// Why the token itself was rejected, for logs and diagnostics. Not meant to be shown to the caller.
    ///
    /// `None` for verified tokens, including those that merely lack the requested scope.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Audience, AuthorizationResult, ClaimNamespace, Claims};
    use crate::Error;

    fn claims() -> Claims {
        serde_json::from_value(json!({
            "sub": "auth0|42",
            "iss": "https://example.auth0.com/",
            "aud": "https://api.example.com",
            "exp": 1_700_000_000u64,
            "permissions": ["read:items", "write:items"],
            "https://kapcomperu.com/email": "ada@example.com",
            "https://kapcomperu.com/name": "Ada Lovelace",
            "https://kapcomperu.com/roles": ["admin", "editor"],
        }))
        .unwrap()
    }

    #[test]
    fn namespace_normalization() {
        assert_eq!(
            ClaimNamespace::new("kapcomperu.com").as_str(),
            "https://kapcomperu.com/"
        );
        assert_eq!(
            ClaimNamespace::new("https://kapcomperu.com/").claim("email"),
            "https://kapcomperu.com/email"
        );
    }

    #[test]
    fn audience_accepts_string_or_array() {
        let one: Audience = serde_json::from_value(json!("api")).unwrap();
        let many: Audience = serde_json::from_value(json!(["other", "api"])).unwrap();

        assert!(one.contains("api"));
        assert!(many.contains("api"));
        assert!(!many.contains("ap"));
    }

    #[test]
    fn extracts_namespaced_claims() {
        let namespace = ClaimNamespace::new("kapcomperu.com");
        let claims = claims();

        assert_eq!(claims.email(&namespace), "ada@example.com");
        assert_eq!(claims.name(&namespace), "Ada Lovelace");
        assert_eq!(claims.roles(&namespace), vec!["admin", "editor"]);
        assert_eq!(claims.email(&ClaimNamespace::new("other.com")), "");
    }

    #[test]
    fn roles_are_never_dropped() {
        let namespace = ClaimNamespace::new("kapcomperu.com");
        let mut claims = claims();

        claims.extra.insert(
            namespace.claim("roles"),
            json!(["admin", 7, {"team": "ops"}, null]),
        );
        assert_eq!(
            claims.roles(&namespace),
            vec!["admin", "7", r#"{"team":"ops"}"#, "null"]
        );

        claims.extra.insert(namespace.claim("roles"), json!("admin"));
        assert_eq!(claims.roles(&namespace), vec!["admin"]);

        claims.extra.remove(&namespace.claim("roles"));
        assert!(claims.roles(&namespace).is_empty());
    }

    #[test]
    fn scope_must_match_exactly() {
        let namespace = ClaimNamespace::new("kapcomperu.com");
        let claims = claims();

        let granted = AuthorizationResult::from_claims(&claims, &namespace, "write:items");
        assert!(granted.valid);
        assert_eq!(granted.subject, "auth0|42");
        assert_eq!(granted.permissions, vec!["read:items", "write:items"]);
        assert!(granted.failure().is_none());

        assert!(!AuthorizationResult::from_claims(&claims, &namespace, "delete:items").valid);
        assert!(!AuthorizationResult::from_claims(&claims, &namespace, "write").valid);
    }

    #[test]
    fn rejected_result_is_empty() {
        let result = AuthorizationResult::rejected(Error::ExpiredToken);

        assert!(!result.valid);
        assert!(result.subject.is_empty() && result.permissions.is_empty());
        assert!(matches!(result.failure(), Some(Error::ExpiredToken)));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "name": "",
                "email": "",
                "subject": "",
                "roles": [],
                "permissions": [],
                "valid": false,
            })
        );
    }
}
