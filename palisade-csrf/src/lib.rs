//! # Palisade CSRF Protection
//!
//! Synchronizer-token CSRF protection with a browser-side agent that keeps
//! every request of a page carrying the current token.
//!
//! ## Features
//!
//! - ✅ **Session Tokens** - Random alphanumeric tokens, rotated after each protected request
//! - ✅ **Wildcard Rules** - Anchored, linear-time URL patterns selecting protected GET URLs
//! - ✅ **Failure Actions** - 403, parameter stripping, redirect, custom message or 500
//! - ✅ **Audit Log** - One JSON line per rejected request
//! - ✅ **Client Agent** - Forms, XHR and links carry the token without page changes
//! - ✅ **Middleware Integration** - Plugs into a `palisade_core::MiddlewareChain`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use palisade_csrf::{CsrfConfig, CsrfMiddleware, FailureAction};
//!
//! let config = CsrfConfig::new()
//!     .with_verify_get_for(["https://example.com/account/delete*"])
//!     .with_failed_auth_action(FailureAction::Forbidden, FailureAction::Forbidden)
//!     .with_log_directory("/var/log/palisade");
//!
//! let csrf = CsrfMiddleware::new(config).unwrap();
//! ```
//!
//! ## URL Rules
//!
//! ```rust
//! use palisade_csrf::UrlMatcher;
//!
//! let matcher = UrlMatcher::compile(&["http://test/index*", "https://test/*"]).unwrap();
//!
//! // GET requests to matching URLs need a token
//! assert!(!matcher.is_exempt("http://test/index.php"));
//! assert!(!matcher.is_exempt("https://test/index.php"));
//! assert!(matcher.is_exempt("http://test/about.php"));
//! ```
//!
//! ## Tokens
//!
//! ```rust
//! use palisade_csrf::TokenAuthority;
//!
//! let token = TokenAuthority::generate(20);
//! assert_eq!(token.len(), 20);
//! assert!(TokenAuthority::compare(Some(token.as_str()), Some(token.as_str())));
//! assert!(!TokenAuthority::compare(Some(""), Some(token.as_str())));
//! ```
//!
//! ## Authorizing a Request
//!
//! ```rust
//! use palisade_core::HttpRequest;
//! use palisade_csrf::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = Arc::new(CsrfConfig::new());
//! let authorizer = RequestAuthorizer::new(config.clone(), Arc::new(MemoryAuditLog::new())).unwrap();
//!
//! let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
//! let session = SessionHandle::new(store, "visitor");
//! let token = TokenAuthority::new(config).current_token(&session).await.unwrap();
//!
//! let mut ctx = RequestContext::new(
//!     HttpRequest::new("POST", "/transfer").with_form("csrfp_token", token),
//! );
//! let outcome = authorizer.authorize(&mut ctx, &session).await.unwrap();
//! assert!(matches!(outcome, Authorization::Authorized { .. }));
//! # });
//! ```
//!
//! ## Loading a configuration file
//!
//! ```rust,no_run
//! use palisade_csrf::CsrfConfig;
//!
//! let config = CsrfConfig::from_file("config/csrf.json").unwrap();
//! ```

pub mod action;
pub mod agent;
pub mod asset;
pub mod audit;
pub mod authorizer;
pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod matcher;
pub mod middleware;
pub mod rewriter;
pub mod session;
pub mod token;

pub use action::{FailureAction, FailureActionDispatcher, Remediation};
pub use agent::{AgentConfig, ClientAgent};
pub use asset::{AssetCache, AssetStatus};
pub use audit::{AttackLogEntry, AuditLog, FileAuditLog, MemoryAuditLog};
pub use authorizer::{Authorization, RequestAuthorizer};
pub use config::{CsrfConfig, FailedAuthAction, SameSite};
pub use context::RequestContext;
pub use error::{CsrfError, Result, Result as CsrfResult};
pub use loader::{FileFormat, upstream_authorized_from_env};
pub use matcher::{PatternScope, UrlMatcher, UrlPattern};
pub use middleware::CsrfMiddleware;
pub use rewriter::ResponseRewriter;
pub use session::{MemorySessionStore, SessionHandle, SessionStore};
pub use token::{IssuedToken, TokenAuthority};
