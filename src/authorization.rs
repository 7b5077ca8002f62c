use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::Layer;
use tower_service::Service;

use crate::bearer::bearer_token;
use crate::claims::Claims;
use crate::validator::TokenValidator;
use crate::Error;

/// Gate mode as a `tower` layer: requests without a valid access token never reach the inner service.
///
/// Verified [`Claims`] are inserted into the request extensions, so handlers can take an `Extension<Claims>`.
#[derive(Clone)]
pub struct AuthorizationLayer {
    settings: Arc<Settings>,
}

#[derive(Clone)]
struct Settings {
    validator: TokenValidator,
    domain: String,
    audience: String,
    required_scope: Option<String>,
}

impl AuthorizationLayer {
    pub fn new(validator: TokenValidator, domain: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            settings: Arc::new(Settings {
                validator,
                domain: domain.into(),
                audience: audience.into(),
                required_scope: None,
            }),
        }
    }

    /// Additionally requires `scope` in the token's `permissions`, answering `403 Forbidden` otherwise.
    pub fn require_scope(self, scope: impl Into<String>) -> Self {
        let settings = Arc::unwrap_or_clone(self.settings);
        Self {
            settings: Arc::new(Settings {
                required_scope: Some(scope.into()),
                ..settings
            }),
        }
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationService<S> {
    inner: S,
    settings: Arc<Settings>,
}

impl<S> Service<Request> for AuthorizationService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // Move the original service into the future instead of its clone. The clone might not be ready yet since
        // `poll_ready` was only called on the original.
        // See [docs](https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services).
        let inner_clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner_clone);

        let token = bearer_token(req.headers()).map(str::to_owned);
        let settings = Arc::clone(&self.settings);
        Box::pin(async move {
            match authorize_token(token, &settings).await {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                    inner.call(req).await
                }
                Err(auth_error) => {
                    tracing::warn!(
                        error = %auth_error,
                        method = %req.method(),
                        path = req.uri().path(),
                        "rejecting request"
                    );
                    Ok(auth_error.into_response())
                }
            }
        })
    }
}

async fn authorize_token(token: Result<String, Error>, settings: &Settings) -> Result<Claims, Error> {
    let claims = settings
        .validator
        .authenticate(&token?, &settings.audience, &settings.domain)
        .await?;

    if let Some(scope) = &settings.required_scope {
        if !claims.has_permission(scope) {
            return Err(Error::InsufficientScope(scope.clone()));
        }
    }
    Ok(claims)
}
