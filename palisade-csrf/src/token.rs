use crate::config::CsrfConfig;
use crate::error::Result;
use crate::session::SessionHandle;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

/// A token written to the session together with the cookie mirroring it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Token value
    pub value: String,

    /// `Set-Cookie` header value carrying the token to the browser
    pub set_cookie: String,
}

/// Issues, stores, rotates and compares session tokens.
///
/// The session is the only authority for the token value. The cookie is
/// a read-only mirror for the browser agent and is never trusted on its own.
#[derive(Debug, Clone)]
pub struct TokenAuthority {
    config: Arc<CsrfConfig>,
}

impl TokenAuthority {
    pub fn new(config: Arc<CsrfConfig>) -> Self {
        Self { config }
    }

    /// Generate a token of exactly `length` alphanumeric characters
    /// from the thread-local CSPRNG.
    pub fn generate(length: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }

    /// The session's token, created if absent
    pub async fn current_token(&self, session: &SessionHandle) -> Result<String> {
        if let Some(token) = session.get(&self.config.token_name).await? {
            return Ok(token);
        }

        let token = Self::generate(self.config.token_length);
        session
            .set(&self.config.token_name, token.clone())
            .await?;
        debug!(session = %session.id(), "Issued CSRF token");
        Ok(token)
    }

    /// Replace the session's token and mirror the new value into a cookie
    pub async fn rotate(&self, session: &SessionHandle) -> Result<IssuedToken> {
        let value = Self::generate(self.config.token_length);
        session
            .set(&self.config.token_name, value.clone())
            .await?;
        debug!(session = %session.id(), "Rotated CSRF token");

        Ok(IssuedToken {
            set_cookie: self.cookie_header(&value),
            value,
        })
    }

    /// Make sure the session has a token and the browser has its mirror.
    ///
    /// Returns the cookie to emit, or `None` when the request already
    /// carries the current token.
    pub async fn ensure_token(
        &self,
        session: &SessionHandle,
        cookie: Option<&str>,
    ) -> Result<Option<IssuedToken>> {
        match session.get(&self.config.token_name).await? {
            None => self.rotate(session).await.map(Some),
            Some(value) if cookie != Some(value.as_str()) => Ok(Some(IssuedToken {
                set_cookie: self.cookie_header(&value),
                value,
            })),
            Some(_) => Ok(None),
        }
    }

    /// Constant-time comparison. An absent or empty submitted token never matches.
    pub fn compare(submitted: Option<&str>, session_token: Option<&str>) -> bool {
        match (submitted, session_token) {
            (Some(submitted), Some(expected)) if !submitted.is_empty() && !expected.is_empty() => {
                submitted.as_bytes().ct_eq(expected.as_bytes()).into()
            }
            _ => false,
        }
    }

    /// Format the `Set-Cookie` value for a token. Never `HttpOnly`: the
    /// browser agent reads it.
    pub fn cookie_header(&self, value: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path={}",
            self.config.cookie_name, value, self.config.cookie_path
        );

        if let Some(ref domain) = self.config.cookie_domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }

        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }

        cookie.push_str(&format!(
            "; SameSite={}",
            self.config.cookie_same_site.as_str()
        ));
        cookie
    }
}
