use crate::action::Remediation;
use crate::agent::ClientAgent;
use crate::asset::{AssetCache, AssetStatus};
use crate::audit::{AuditLog, FileAuditLog};
use crate::authorizer::{Authorization, RequestAuthorizer};
use crate::config::CsrfConfig;
use crate::context::RequestContext;
use crate::error::Result;
use crate::loader::upstream_authorized_from_env;
use crate::rewriter::ResponseRewriter;
use crate::session::{MemorySessionStore, SessionHandle, SessionStore, generate_session_id};
use async_trait::async_trait;
use palisade_core::{Error as CoreError, HttpRequest, HttpResponse, Middleware, Next};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Minimum delay between attempts to build a missing or stale agent script
pub const DEFAULT_ASSET_RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct AssetState {
    status: Option<AssetStatus>,
    checked_at: Option<Instant>,
}

/// CSRF protection middleware.
///
/// Per request: resolve the session, authorize, run the handler unless
/// the failure action halted the request, emit pending cookies and inject
/// the client agent into HTML responses.
#[derive(Clone)]
pub struct CsrfMiddleware {
    config: Arc<CsrfConfig>,
    authorizer: RequestAuthorizer,
    rewriter: ResponseRewriter,
    agent: ClientAgent,
    assets: AssetCache,
    asset_state: Arc<Mutex<AssetState>>,
    asset_retry_interval: Duration,
    sessions: Arc<dyn SessionStore>,
}

impl CsrfMiddleware {
    /// Create the middleware with an in-memory session store and the file
    /// audit log in `config.log_directory`
    pub fn new(config: CsrfConfig) -> Result<Self> {
        let audit = Arc::new(FileAuditLog::new(config.log_directory.clone()));
        Self::with_stores(config, Arc::new(MemorySessionStore::new()), audit)
    }

    /// Create the middleware on the host's session store and audit log
    pub fn with_stores(
        config: CsrfConfig,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditLog>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let authorizer = RequestAuthorizer::new(config.clone(), audit)?;
        let agent = ClientAgent::new(&config, authorizer.matcher());

        Ok(Self {
            rewriter: ResponseRewriter::new(&config)?,
            assets: AssetCache::new(config.js_path.clone(), config.config_path.clone()),
            asset_state: Arc::new(Mutex::new(AssetState::default())),
            asset_retry_interval: DEFAULT_ASSET_RETRY_INTERVAL,
            agent,
            authorizer,
            sessions,
            config,
        })
    }

    /// Set how long a failed agent build is served before retrying
    pub fn with_asset_retry_interval(mut self, interval: Duration) -> Self {
        self.asset_retry_interval = interval;
        self
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    pub fn authorizer(&self) -> &RequestAuthorizer {
        &self.authorizer
    }

    pub fn agent(&self) -> &ClientAgent {
        &self.agent
    }

    /// Build or reuse the agent script.
    ///
    /// A current script is kept for the life of the middleware. A stale or
    /// missing one is retried at most once per retry interval.
    pub async fn prepare_asset(&self) -> AssetStatus {
        let mut state = self.asset_state.lock().await;
        if let (Some(status), Some(checked_at)) = (state.status, state.checked_at) {
            if status.is_current() || checked_at.elapsed() < self.asset_retry_interval {
                return status;
            }
        }

        let status = self.assets.ensure(&self.agent).await;
        state.status = Some(status);
        state.checked_at = Some(Instant::now());
        status
    }

    /// Session of the request, minting one when the request carries no
    /// session id or an id without a stored token. The second value is
    /// the cookie announcing a new session.
    async fn resolve_session(
        &self,
        request: &HttpRequest,
    ) -> Result<(SessionHandle, Option<String>)> {
        if let Some(id) = request
            .cookie(&self.config.session_cookie_name)
            .filter(|id| !id.is_empty())
        {
            let session = SessionHandle::new(self.sessions.clone(), id.clone());
            if session.get(&self.config.token_name).await?.is_some() {
                return Ok((session, None));
            }
            debug!(session = %id, "Unknown session id, starting a new session");
        }

        let id = generate_session_id();
        debug!(session = %id, "Starting session");
        let cookie = self.session_cookie(&id);
        Ok((SessionHandle::new(self.sessions.clone(), id), Some(cookie)))
    }

    fn session_cookie(&self, id: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; HttpOnly",
            self.config.session_cookie_name, id, self.config.cookie_path
        );
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str(&format!(
            "; SameSite={}",
            self.config.cookie_same_site.as_str()
        ));
        cookie
    }

    /// Run one request through the protection layer
    pub async fn process(
        &self,
        mut ctx: RequestContext,
        next: Next,
    ) -> std::result::Result<HttpResponse, CoreError> {
        if ctx.upstream_authorized {
            debug!(url = %ctx.current_url(), "CSRF check handled upstream");
            return next(ctx.into_request()).await;
        }

        let (session, session_cookie) = self.resolve_session(&ctx.request).await?;
        let mut cookies: Vec<String> = session_cookie.into_iter().collect();

        let rotated = match self.authorizer.authorize(&mut ctx, &session).await? {
            Authorization::Rejected(Remediation::Halt(mut response)) => {
                response.set_cookies.extend(cookies);
                return Ok(response);
            }
            Authorization::Authorized { rotated: Some(issued) } => {
                cookies.push(issued.set_cookie);
                true
            }
            _ => false,
        };

        if !rotated {
            let mirrored = ctx.request.cookie(&self.config.cookie_name).cloned();
            if let Some(issued) = self
                .authorizer
                .tokens()
                .ensure_token(&session, mirrored.as_deref())
                .await?
            {
                cookies.push(issued.set_cookie);
            }
        }

        let mut response = next(ctx.into_request()).await?;
        response.set_cookies.extend(cookies);

        let status = self.prepare_asset().await;
        Ok(self.rewriter.rewrite_response(response, status.is_available()))
    }
}

#[async_trait]
impl Middleware for CsrfMiddleware {
    async fn handle(
        &self,
        req: HttpRequest,
        next: Next,
    ) -> std::result::Result<HttpResponse, CoreError> {
        let ctx = RequestContext::new(req).with_upstream_authorized(upstream_authorized_from_env());
        self.process(ctx, next).await
    }
}
