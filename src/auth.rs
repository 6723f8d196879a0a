//! Credential source boundary.
//!
//! Login flows live outside this crate; the executor only asks for an
//! `Authorization` header and, after a 401, for a fresh one.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::AuthError;
use crate::payload::Args;

/// Supplies auth headers for endpoints that declare security.
pub trait Authenticator: Send + Sync {
    /// Headers to attach to a request. `retry` asks for a freshly minted
    /// credential instead of a cached one.
    fn auth_header(&self, args: &Args, retry: bool) -> Result<HeaderMap, AuthError>;
}

/// `Authorization: Bearer <token>`
pub fn bearer_header(token: &str) -> Result<HeaderMap, AuthError> {
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| AuthError::Credentials("token is not a valid header value".into()))?;
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// A fixed bearer token. Refreshing returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Authenticator for StaticToken {
    fn auth_header(&self, _args: &Args, _retry: bool) -> Result<HeaderMap, AuthError> {
        bearer_header(&self.token)
    }
}

/// No credentials available; secured endpoints fail before any request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Authenticator for Anonymous {
    fn auth_header(&self, _args: &Args, _retry: bool) -> Result<HeaderMap, AuthError> {
        Err(AuthError::Credentials("no token configured".into()))
    }
}
