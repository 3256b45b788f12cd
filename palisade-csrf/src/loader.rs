// Configuration file loading

use crate::action::FailureAction;
use crate::config::{CsrfConfig, SameSite};
use crate::error::{CsrfError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable set by an upstream module that already validated
/// the request
pub const UPSTREAM_AUTHORIZED_VAR: &str = "mod_csrfp_enabled";

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CsrfError::ConfigParse("No file extension found".to_string()))?;

        Self::from_extension(ext)
            .ok_or_else(|| CsrfError::ConfigParse(format!("Unsupported format: {}", ext)))
    }
}

/// On-disk layout. Key names follow the established CSRF protector
/// configuration files.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    #[serde(rename = "CSRFP_TOKEN")]
    token_name: Option<String>,
    #[serde(rename = "cookieName")]
    cookie_name: Option<String>,
    #[serde(rename = "headerName")]
    header_name: Option<String>,
    #[serde(rename = "tokenLength")]
    token_length: Option<usize>,
    #[serde(rename = "logDirectory")]
    log_directory: Option<PathBuf>,
    #[serde(rename = "failedAuthAction")]
    failed_auth_action: ActionCodes,
    #[serde(rename = "errorRedirectionPage")]
    error_redirection_page: Option<String>,
    #[serde(rename = "customErrorMessage")]
    custom_error_message: Option<String>,
    #[serde(rename = "jsPath")]
    js_path: Option<PathBuf>,
    #[serde(rename = "jsUrl")]
    js_url: Option<String>,
    #[serde(rename = "disabledJavascriptMessage")]
    disabled_javascript_message: Option<String>,
    #[serde(rename = "verifyGetFor")]
    verify_get_for: Vec<String>,
    #[serde(rename = "protectedMethods")]
    protected_methods: Option<Vec<String>>,
    #[serde(rename = "rotateOnSuccess")]
    rotate_on_success: Option<bool>,
    #[serde(rename = "cookieSecure")]
    cookie_secure: Option<bool>,
    #[serde(rename = "cookieDomain")]
    cookie_domain: Option<String>,
    #[serde(rename = "cookieSameSite")]
    cookie_same_site: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActionCodes {
    #[serde(rename = "GET")]
    get: Option<i64>,
    #[serde(rename = "POST")]
    post: Option<i64>,
}

impl CsrfConfig {
    /// Load and validate a configuration file. The format follows the
    /// extension (`.json` or `.toml`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            CsrfError::ConfigParse(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&content, format)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str, format: FileFormat) -> Result<Self> {
        let file: ConfigFile = match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| CsrfError::ConfigParse(format!("JSON parse error: {}", e)))?,
            FileFormat::Toml => toml::from_str(content)
                .map_err(|e| CsrfError::ConfigParse(format!("TOML parse error: {}", e)))?,
        };

        let config = file.into_config()?;
        config.validate()?;
        Ok(config)
    }
}

impl ConfigFile {
    fn into_config(self) -> Result<CsrfConfig> {
        let mut config = CsrfConfig::new().with_verify_get_for(self.verify_get_for);

        if let Some(name) = self.token_name.filter(|n| !n.is_empty()) {
            config = config.with_token_name(name);
        }
        if let Some(name) = self.cookie_name.filter(|n| !n.is_empty()) {
            config = config.with_cookie_name(name);
        }
        if let Some(name) = self.header_name.filter(|n| !n.is_empty()) {
            config = config.with_header_name(name);
        }
        if let Some(length) = self.token_length {
            config = config.with_token_length(length);
        }
        if let Some(dir) = self.log_directory {
            config = config.with_log_directory(dir);
        }

        let defaults = config.failed_auth_action;
        config = config.with_failed_auth_action(
            self.failed_auth_action
                .get
                .map(FailureAction::from_code_or_default)
                .unwrap_or(defaults.get),
            self.failed_auth_action
                .post
                .map(FailureAction::from_code_or_default)
                .unwrap_or(defaults.post),
        );

        if let Some(page) = self.error_redirection_page.filter(|p| !p.is_empty()) {
            config = config.with_error_redirection_page(page);
        }
        if let Some(message) = self.custom_error_message {
            config = config.with_custom_error_message(message);
        }
        if let Some(path) = self.js_path {
            config = config.with_js_path(path);
        }
        if let Some(url) = self.js_url {
            config = config.with_js_url(url);
        }
        if let Some(message) = self.disabled_javascript_message {
            config = config.with_disabled_javascript_message(message);
        }
        if let Some(methods) = self.protected_methods {
            config = config.with_protected_methods(methods);
        }
        if let Some(rotate) = self.rotate_on_success {
            config = config.with_rotate_on_success(rotate);
        }
        if let Some(secure) = self.cookie_secure {
            config = config.with_cookie_secure(secure);
        }
        if let Some(domain) = self.cookie_domain {
            config = config.with_cookie_domain(domain);
        }
        if let Some(same_site) = self.cookie_same_site {
            config = config.with_cookie_same_site(parse_same_site(&same_site)?);
        }

        Ok(config)
    }
}

fn parse_same_site(value: &str) -> Result<SameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Ok(SameSite::Strict),
        "lax" => Ok(SameSite::Lax),
        "none" => Ok(SameSite::None),
        other => Err(CsrfError::Configuration(format!(
            "Unknown SameSite policy: {}",
            other
        ))),
    }
}

/// Whether an upstream module flagged the request as already authorized.
/// Read once at the edge and passed down explicitly.
pub fn upstream_authorized_from_env() -> bool {
    upstream_authorized_from(std::env::var(UPSTREAM_AUTHORIZED_VAR).ok().as_deref())
}

/// Interpret the upstream flag: `true` or `1` enable it
pub fn upstream_authorized_from(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1")
    )
}
