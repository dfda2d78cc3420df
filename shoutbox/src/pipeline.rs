//! Middleware applied to every request, outermost first:
//!
//! 1. request tracing
//! 2. CORS response headers, added to every response including recovered 500s
//! 3. panic recovery: a panicking handler becomes a logged 500
//! 4. `OPTIONS` preflights answered directly
//! 5. user-identity extraction into a [`UserName`] request extension
//!
//! The identity is a display name read from the `Authorization` header. It is
//! never verified.

use std::any::Any;
use std::convert::Infallible;
use std::fmt;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, ORIGIN,
        },
        request::Parts,
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, error};

/// Display name used when a request carries no usable `Authorization` header.
pub const DEFAULT_USER_NAME: &str = "Gordon Ramsey";
/// Display name used when the credentials cannot be decoded.
pub const BROKEN_USER_NAME: &str = "Rordon Gamsey";

const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE";
const ALLOW_HEADERS: &str =
    "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Accept, Authorization";
const PREFLIGHT_BODY: &str = "Hello";

/// Wraps `router` in the request pipeline.
pub fn layer<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(cors_headers))
            .layer(CatchPanicLayer::custom(recover_panic))
            .layer(middleware::from_fn(preflight))
            .layer(middleware::from_fn(user_context)),
    )
}

fn recover_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else {
        "non-string panic payload"
    };
    error!(panic = %detail, "request handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

async fn cors_headers(request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .filter(|origin| !origin.is_empty())
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    response
}

async fn preflight(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return (StatusCode::OK, PREFLIGHT_BODY).into_response();
    }
    next.run(request).await
}

async fn user_context(mut request: Request, next: Next) -> Response {
    let user = UserName::from_headers(request.headers());
    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Display name of whoever sent the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserName(pub String);

impl UserName {
    /// Derives the display name from an `Authorization: <scheme> <credentials>`
    /// header, where the credentials are base64 `user:secret`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let authorization = match headers.get(AUTHORIZATION).map(HeaderValue::to_str) {
            None => "",
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                debug!(error = %err, "authorization header is not valid text");
                return Self(BROKEN_USER_NAME.to_string());
            }
        };

        let Some((_scheme, credentials)) = authorization.split_once(' ') else {
            return Self(DEFAULT_USER_NAME.to_string());
        };

        match user_from_credentials(credentials) {
            Ok(user) => Self(user),
            Err(err) => {
                debug!(error = %err, "falling back to broken user name");
                Self(BROKEN_USER_NAME.to_string())
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserName
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<UserName>() {
            Some(user) => user.clone(),
            None => UserName::from_headers(&parts.headers),
        };
        Ok(user)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("credentials are not properly encoded: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("decoded credentials are malformed")]
    Malformed,
}

/// Extracts the user part of base64-encoded `user:secret` credentials.
pub fn user_from_credentials(encoded: &str) -> Result<String, CredentialsError> {
    let decoded = STANDARD.decode(encoded)?;
    let decoded = String::from_utf8(decoded).map_err(|_| CredentialsError::Malformed)?;
    let (user, _secret) = decoded
        .split_once(':')
        .ok_or(CredentialsError::Malformed)?;
    Ok(user.to_string())
}
