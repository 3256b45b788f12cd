//! Per-request authorization.
//!
//! ```text
//! Unchecked ──upstream flag──────────────> Bypassed
//!     │ ──GET, no pattern matches────────> Exempt
//!     │ ──token matches session──────────> Authorized (token rotated)
//!     └ ──token absent or wrong──────────> Rejected (failure action dispatched)
//! ```

use crate::action::{FailureActionDispatcher, Remediation};
use crate::audit::AuditLog;
use crate::config::CsrfConfig;
use crate::context::RequestContext;
use crate::error::Result;
use crate::matcher::UrlMatcher;
use crate::session::SessionHandle;
use crate::token::{IssuedToken, TokenAuthority};
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of one authorization pass
#[derive(Debug)]
pub enum Authorization {
    /// Already authorized upstream; nothing was checked or changed
    Bypassed,
    /// The request does not need a token
    Exempt,
    /// The token matched. Carries the rotated token when rotation is enabled.
    Authorized { rotated: Option<IssuedToken> },
    /// The token was missing or wrong and the failure action ran
    Rejected(Remediation),
}

impl Authorization {
    /// Response that ends the request, if the failure action halted it
    pub fn halt_response(self) -> Option<palisade_core::HttpResponse> {
        match self {
            Authorization::Rejected(Remediation::Halt(response)) => Some(response),
            _ => None,
        }
    }
}

/// Decides whether a request needs a token and enforces it
#[derive(Clone)]
pub struct RequestAuthorizer {
    config: Arc<CsrfConfig>,
    matcher: Arc<UrlMatcher>,
    tokens: TokenAuthority,
    dispatcher: FailureActionDispatcher,
}

impl RequestAuthorizer {
    /// Validate the configuration and compile its URL patterns.
    /// A malformed pattern fails here, never per request.
    pub fn new(config: Arc<CsrfConfig>, audit: Arc<dyn AuditLog>) -> Result<Self> {
        let matcher = Arc::new(config.validate()?);
        Ok(Self {
            tokens: TokenAuthority::new(config.clone()),
            dispatcher: FailureActionDispatcher::new(config.clone(), audit),
            matcher,
            config,
        })
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    pub fn matcher(&self) -> &UrlMatcher {
        &self.matcher
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    /// Protected methods always need a token; GET needs one only for URLs
    /// matched by a pattern. Anything else passes.
    pub fn requires_token(&self, ctx: &RequestContext) -> bool {
        let method = ctx.method();
        if self.config.is_protected_method(method) {
            return true;
        }
        if method == "GET" {
            return !self.matcher.is_exempt(&ctx.current_url());
        }
        false
    }

    /// Run the authorization state machine for one request.
    ///
    /// A validation failure is not an error: it yields
    /// [`Authorization::Rejected`]. Errors are reserved for configuration
    /// and storage problems, such as a missing audit log directory.
    pub async fn authorize(
        &self,
        ctx: &mut RequestContext,
        session: &SessionHandle,
    ) -> Result<Authorization> {
        if ctx.upstream_authorized {
            debug!(url = %ctx.current_url(), "Request already authorized upstream");
            return Ok(Authorization::Bypassed);
        }

        if !self.requires_token(ctx) {
            trace!(method = %ctx.method(), url = %ctx.current_url(), "Request exempt");
            return Ok(Authorization::Exempt);
        }

        let submitted = ctx.submitted_token(&self.config.token_name, &self.config.header_name);
        let expected = session.get(&self.config.token_name).await?;

        if TokenAuthority::compare(submitted.as_deref(), expected.as_deref()) {
            debug!(method = %ctx.method(), url = %ctx.current_url(), "CSRF token accepted");
            let rotated = if self.config.rotate_on_success {
                Some(self.tokens.rotate(session).await?)
            } else {
                None
            };
            return Ok(Authorization::Authorized { rotated });
        }

        let action = self.config.failed_auth_action.for_method(ctx.method());
        let remediation = self.dispatcher.dispatch(action, &mut ctx.request).await?;
        Ok(Authorization::Rejected(remediation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FailureAction;
    use crate::audit::MemoryAuditLog;
    use crate::session::{MemorySessionStore, SessionStore};
    use palisade_core::HttpRequest;

    async fn session_with(token: &str) -> SessionHandle {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let session = SessionHandle::new(store, "s1");
        session
            .set("csrfp_token", token.to_string())
            .await
            .unwrap();
        session
    }

    fn authorizer(config: CsrfConfig) -> (RequestAuthorizer, MemoryAuditLog) {
        let audit = MemoryAuditLog::new();
        let authorizer =
            RequestAuthorizer::new(Arc::new(config), Arc::new(audit.clone())).unwrap();
        (authorizer, audit)
    }

    fn strip_all() -> CsrfConfig {
        CsrfConfig::new()
            .with_token_length(20)
            .with_verify_get_for(["http://test/index*"])
            .with_failed_auth_action(FailureAction::StripParameters, FailureAction::StripParameters)
    }

    #[tokio::test]
    async fn test_post_mismatch_strips_parameters() {
        let (authorizer, audit) = authorizer(strip_all());
        let session = session_with("abc").await;
        let mut ctx = RequestContext::new(
            HttpRequest::new("POST", "/index.php")
                .with_host("test")
                .with_form("csrfp_token", "123")
                .with_form("param1", "1")
                .with_form("param2", "2"),
        );

        let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();

        assert!(matches!(
            outcome,
            Authorization::Rejected(Remediation::Stripped)
        ));
        assert!(ctx.request.form_params.is_empty());
        assert!(audit.entries().await.is_empty());
        assert_eq!(
            session.get("csrfp_token").await.unwrap(),
            Some("abc".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_mismatch_on_protected_url() {
        let (authorizer, _) = authorizer(strip_all());
        let session = session_with("abc").await;
        let mut ctx = RequestContext::new(
            HttpRequest::new("GET", "/index.php")
                .with_host("test")
                .with_query("csrfp_token", "123")
                .with_query("param1", "1")
                .with_query("param2", "2"),
        );

        let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();
        assert!(matches!(outcome, Authorization::Rejected(_)));
        assert!(ctx.request.query_params.is_empty());
    }

    #[tokio::test]
    async fn test_get_on_unlisted_url_is_exempt() {
        let (authorizer, _) = authorizer(strip_all());
        let session = session_with("abc").await;
        let mut ctx = RequestContext::new(
            HttpRequest::new("GET", "/other.php")
                .with_host("test")
                .with_query("param1", "1"),
        );

        let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();
        assert!(matches!(outcome, Authorization::Exempt));
        assert_eq!(ctx.request.query_params.len(), 1);
    }

    #[tokio::test]
    async fn test_post_match_rotates() {
        let (authorizer, _) = authorizer(strip_all());
        let session = session_with("abc").await;
        let mut ctx = RequestContext::new(
            HttpRequest::new("POST", "/index.php").with_form("csrfp_token", "abc"),
        );

        let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();

        let rotated = match outcome {
            Authorization::Authorized { rotated: Some(issued) } => issued,
            other => panic!("expected rotation, got {:?}", other),
        };
        assert_ne!(rotated.value, "abc");
        assert_eq!(rotated.value.len(), 20);
        assert!(
            rotated
                .set_cookie
                .starts_with(&format!("CSRF_AUTH_TOKEN={}", rotated.value))
        );
        assert_eq!(session.get("csrfp_token").await.unwrap(), Some(rotated.value));
    }

    #[tokio::test]
    async fn test_get_match_rotates() {
        let (authorizer, _) = authorizer(strip_all());
        let session = session_with("abc").await;
        let mut ctx = RequestContext::new(
            HttpRequest::new("GET", "/index.php")
                .with_host("test")
                .with_query("csrfp_token", "abc"),
        );

        let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();
        let rotated = match outcome {
            Authorization::Authorized { rotated: Some(issued) } => issued,
            other => panic!("expected rotation, got {:?}", other),
        };
        assert_ne!(rotated.value, "abc");
        assert!(
            rotated
                .set_cookie
                .starts_with(&format!("CSRF_AUTH_TOKEN={}", rotated.value))
        );
        assert_eq!(session.get("csrfp_token").await.unwrap(), Some(rotated.value));
    }

    #[tokio::test]
    async fn test_rotation_can_be_disabled() {
        let (authorizer, _) = authorizer(strip_all().with_rotate_on_success(false));
        let session = session_with("abc").await;
        let mut ctx = RequestContext::new(
            HttpRequest::new("POST", "/index.php").with_form("csrfp_token", "abc"),
        );

        let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();
        assert!(matches!(outcome, Authorization::Authorized { rotated: None }));
        assert_eq!(
            session.get("csrfp_token").await.unwrap(),
            Some("abc".to_string())
        );
    }

    #[tokio::test]
    async fn test_upstream_flag_skips_everything() {
        let (authorizer, audit) = authorizer(
            CsrfConfig::new()
                .with_failed_auth_action(FailureAction::Forbidden, FailureAction::Forbidden),
        );
        let session = session_with("abc").await;
        let mut ctx = RequestContext::new(
            HttpRequest::new("POST", "/index.php").with_form("param1", "1"),
        )
        .with_upstream_authorized(true);

        let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();

        assert!(matches!(outcome, Authorization::Bypassed));
        assert_eq!(ctx.request.form_params.len(), 1);
        assert_eq!(
            session.get("csrfp_token").await.unwrap(),
            Some("abc".to_string())
        );
        assert!(audit.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_session_token_rejects() {
        let (authorizer, audit) = authorizer(CsrfConfig::new());
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let session = SessionHandle::new(store, "fresh");
        let mut ctx = RequestContext::new(HttpRequest::new("POST", "/index.php"));

        let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();
        let response = outcome.halt_response().unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(audit.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_configured_methods_are_protected() {
        let (authorizer, _) = authorizer(
            CsrfConfig::new()
                .with_protected_methods(vec!["POST".to_string(), "DELETE".to_string()]),
        );
        let delete = RequestContext::new(HttpRequest::new("DELETE", "/item/1"));
        let put = RequestContext::new(HttpRequest::new("PUT", "/item/1"));
        assert!(authorizer.requires_token(&delete));
        assert!(!authorizer.requires_token(&put));
    }

    #[test]
    fn test_malformed_pattern_fails_construction() {
        let result = RequestAuthorizer::new(
            Arc::new(CsrfConfig::new().with_verify_get_for(["no-scheme"])),
            Arc::new(MemoryAuditLog::new()),
        );
        assert!(result.is_err());
    }
}
