//! Bearer-token authentication at the transport boundary (spec §4.6).
//!
//! The core authenticates clients only this far: either a statically
//! configured token compared for equality, or a caller-supplied async
//! validator. Full OAuth flows (authorization code, PKCE, token refresh) are
//! explicitly out of scope (spec §1 Non-goals) and are not implemented here.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::HeaderMap;

/// A caller-supplied async token validator, for deployments that back
/// tokens with an external introspection endpoint or database.
pub type TokenValidator =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

/// How the HTTP transport authenticates inbound requests.
#[derive(Clone)]
pub enum AuthMode {
    /// No authentication; every request is accepted.
    None,
    /// Accept only requests whose bearer token equals this value.
    StaticToken(String),
    /// Delegate the accept/reject decision to an async validator.
    Validator(TokenValidator),
}

impl std::fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "AuthMode::None"),
            Self::StaticToken(_) => write!(f, "AuthMode::StaticToken(..)"),
            Self::Validator(_) => write!(f, "AuthMode::Validator(..)"),
        }
    }
}

/// Why authentication failed, carrying enough detail to build the
/// `WWW-Authenticate` header (spec §4.6).
#[derive(Debug, Clone)]
pub struct AuthFailure {
    pub error: &'static str,
}

impl AuthMode {
    /// Check the `Authorization: Bearer <token>` header against this mode.
    pub async fn check(&self, headers: &HeaderMap) -> Result<(), AuthFailure> {
        match self {
            Self::None => Ok(()),
            Self::StaticToken(expected) => {
                let token = extract_bearer(headers);
                match token {
                    Some(t) if &t == expected => Ok(()),
                    _ => Err(AuthFailure { error: "invalid_token" }),
                }
            }
            Self::Validator(validator) => {
                let token = extract_bearer(headers);
                match token {
                    Some(t) if validator(t).await => Ok(()),
                    _ => Err(AuthFailure { error: "invalid_token" }),
                }
            }
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_owned)
}

/// Build the `WWW-Authenticate` header value for a 401 response, including a
/// `resource_metadata` hint if the deployment configured a discovery URL
/// (spec §4.6).
#[must_use]
pub fn www_authenticate_header(resource_metadata_url: Option<&str>, failure: &AuthFailure) -> String {
    match resource_metadata_url {
        Some(url) => {
            format!(r#"Bearer resource_metadata="{url}", error="{}""#, failure.error)
        }
        None => format!(r#"Bearer error="{}""#, failure.error),
    }
}
