use crate::action::FailureAction;
use crate::error::{CsrfError, Result};
use crate::matcher::UrlMatcher;
use std::path::PathBuf;
use tracing::warn;

/// Shortest token length accepted without a warning
const RECOMMENDED_MIN_TOKEN_LENGTH: usize = 16;

/// Longest token length accepted at all
const MAX_TOKEN_LENGTH: usize = 4096;

/// CSRF protection configuration
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Form field, query parameter and session key carrying the token
    pub token_name: String,

    /// Cookie mirroring the token for the browser agent
    pub cookie_name: String,

    /// Request header the agent also sends the token in, for bodies it
    /// cannot extend
    pub header_name: String,

    /// Number of characters in a generated token
    pub token_length: usize,

    /// Wildcard URL patterns for which GET requests must carry a token
    pub verify_get_for: Vec<String>,

    /// Methods that always require a token
    pub protected_methods: Vec<String>,

    /// Remediation per request method
    pub failed_auth_action: FailedAuthAction,

    /// Target of the redirect action
    pub error_redirection_page: Option<String>,

    /// Body rendered by the custom message action
    pub custom_error_message: String,

    /// Directory receiving the audit log of failed requests
    pub log_directory: PathBuf,

    /// Shown in the `<noscript>` block injected into HTML pages
    pub disabled_javascript_message: String,

    /// URL the injected `<script>` loads the client agent from
    pub js_url: String,

    /// Filesystem location of the generated client agent
    pub js_path: PathBuf,

    /// File this configuration was loaded from, if any
    pub config_path: Option<PathBuf>,

    /// Cookie path
    pub cookie_path: String,

    /// Cookie domain
    pub cookie_domain: Option<String>,

    /// Cookie secure flag (HTTPS only)
    pub cookie_secure: bool,

    /// Cookie SameSite policy
    pub cookie_same_site: SameSite,

    /// Cookie carrying the host session id
    pub session_cookie_name: String,

    /// Replace the token after every successful protected request
    pub rotate_on_success: bool,
}

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Failure actions selected by request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAuthAction {
    pub get: FailureAction,
    pub post: FailureAction,
}

impl FailedAuthAction {
    /// GET uses its own action; every protected method uses the POST action
    pub fn for_method(&self, method: &str) -> FailureAction {
        if method.eq_ignore_ascii_case("GET") {
            self.get
        } else {
            self.post
        }
    }
}

impl Default for FailedAuthAction {
    fn default() -> Self {
        Self {
            get: FailureAction::Forbidden,
            post: FailureAction::Forbidden,
        }
    }
}

impl CsrfConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            token_name: "csrfp_token".to_string(),
            cookie_name: "CSRF_AUTH_TOKEN".to_string(),
            header_name: "X-CSRF-Token".to_string(),
            token_length: 32,
            verify_get_for: Vec::new(),
            protected_methods: vec!["POST".to_string()],
            failed_auth_action: FailedAuthAction::default(),
            error_redirection_page: None,
            custom_error_message: String::new(),
            log_directory: PathBuf::from("log"),
            disabled_javascript_message: "This site attempts to protect users against \
                Cross-Site Request Forgeries attacks. In order to do so, you must have \
                JavaScript enabled in your web browser otherwise this site will fail to \
                work correctly for you."
                .to_string(),
            js_url: "/js/csrfprotector.js".to_string(),
            js_path: PathBuf::from("js/csrfprotector.js"),
            config_path: None,
            cookie_path: "/".to_string(),
            cookie_domain: None,
            cookie_secure: false,
            cookie_same_site: SameSite::Lax,
            session_cookie_name: "PALISADE_SESSID".to_string(),
            rotate_on_success: true,
        }
    }

    /// Set the token field / parameter name
    pub fn with_token_name(mut self, name: impl Into<String>) -> Self {
        self.token_name = name.into();
        self
    }

    /// Set cookie name
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set header name
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Set token length
    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length;
        self
    }

    /// Set the URL patterns whose GET requests need a token
    pub fn with_verify_get_for<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verify_get_for = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the methods that always need a token
    pub fn with_protected_methods(mut self, methods: Vec<String>) -> Self {
        self.protected_methods = methods.into_iter().map(|m| m.to_uppercase()).collect();
        self
    }

    /// Set the failure actions for GET and POST
    pub fn with_failed_auth_action(mut self, get: FailureAction, post: FailureAction) -> Self {
        self.failed_auth_action = FailedAuthAction { get, post };
        self
    }

    /// Set the redirect target used by [`FailureAction::Redirect`]
    pub fn with_error_redirection_page(mut self, url: impl Into<String>) -> Self {
        self.error_redirection_page = Some(url.into());
        self
    }

    /// Set the message used by [`FailureAction::CustomMessage`]
    pub fn with_custom_error_message(mut self, message: impl Into<String>) -> Self {
        self.custom_error_message = message.into();
        self
    }

    /// Set the audit log directory
    pub fn with_log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_directory = dir.into();
        self
    }

    /// Set the `<noscript>` message
    pub fn with_disabled_javascript_message(mut self, message: impl Into<String>) -> Self {
        self.disabled_javascript_message = message.into();
        self
    }

    /// Set the public URL of the client agent
    pub fn with_js_url(mut self, url: impl Into<String>) -> Self {
        self.js_url = url.into();
        self
    }

    /// Set where the generated client agent is written
    pub fn with_js_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.js_path = path.into();
        self
    }

    /// Set cookie path
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Set cookie domain
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set cookie secure flag
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Set cookie SameSite policy
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    /// Set the session id cookie name
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    /// Enable or disable rotation after successful authorization
    pub fn with_rotate_on_success(mut self, rotate: bool) -> Self {
        self.rotate_on_success = rotate;
        self
    }

    /// Whether `method` always requires a token
    pub fn is_protected_method(&self, method: &str) -> bool {
        self.protected_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Check the configuration and compile its URL patterns
    pub fn validate(&self) -> Result<UrlMatcher> {
        if self.token_name.is_empty() || self.cookie_name.is_empty() {
            return Err(CsrfError::Configuration(
                "Token and cookie names must not be empty".to_string(),
            ));
        }
        if self.token_length == 0 || self.token_length > MAX_TOKEN_LENGTH {
            return Err(CsrfError::Configuration(format!(
                "Token length must be between 1 and {}, got {}",
                MAX_TOKEN_LENGTH, self.token_length
            )));
        }
        if self.token_length < RECOMMENDED_MIN_TOKEN_LENGTH {
            warn!(
                token_length = self.token_length,
                "Configured CSRF token length is short"
            );
        }

        UrlMatcher::compile(&self.verify_get_for)
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = CsrfConfig::new();
        assert_eq!(config.token_name, "csrfp_token");
        assert_eq!(config.cookie_name, "CSRF_AUTH_TOKEN");
        assert_eq!(config.token_length, 32);
        assert!(config.is_protected_method("post"));
        assert!(!config.is_protected_method("GET"));
    }

    #[test]
    fn test_config_builder() {
        let config = CsrfConfig::default()
            .with_token_length(128)
            .with_cookie_name("_csrf")
            .with_cookie_secure(true)
            .with_protected_methods(vec!["post".to_string(), "delete".to_string()])
            .with_failed_auth_action(FailureAction::Redirect, FailureAction::InternalError);

        assert_eq!(config.token_length, 128);
        assert_eq!(config.cookie_name, "_csrf");
        assert!(config.cookie_secure);
        assert!(config.is_protected_method("DELETE"));
        assert_eq!(
            config.failed_auth_action.for_method("GET"),
            FailureAction::Redirect
        );
        assert_eq!(
            config.failed_auth_action.for_method("DELETE"),
            FailureAction::InternalError
        );
    }

    #[test]
    fn test_invalid_token_length() {
        assert!(CsrfConfig::new().with_token_length(0).validate().is_err());
        assert!(CsrfConfig::new().with_token_length(20).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_pattern() {
        let err = CsrfConfig::new()
            .with_verify_get_for(["http://test/index*", ""])
            .validate()
            .unwrap_err();
        assert!(matches!(err, CsrfError::MalformedPattern { .. }));
    }

    #[test]
    fn test_same_site_enum() {
        assert_eq!(SameSite::Strict.as_str(), "Strict");
        assert_eq!(SameSite::Lax.as_str(), "Lax");
        assert_eq!(SameSite::None.as_str(), "None");
    }
}
