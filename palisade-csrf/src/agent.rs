//! Browser-side propagation agent.
//!
//! The agent is a static script template with one placeholder that
//! receives the JSON configuration (token and cookie names, exemption
//! patterns compiled to JavaScript regex sources, protected methods).
//! The patterns are compiled on the server with the same escaping and
//! anchoring as [`UrlMatcher`], so both sides agree on which URLs need a
//! token.

use crate::config::CsrfConfig;
use crate::error::{CsrfError, Result};
use crate::matcher::{PatternScope, UrlMatcher};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Serialize;
use sha2::{Digest, Sha256};

const TEMPLATE: &str = include_str!("../assets/csrfprotector.js");
const CONFIG_PLACEHOLDER: &str = "__PALISADE_CONFIG__";

/// First line of every rendered agent, followed by the fingerprint
pub const FINGERPRINT_PREFIX: &str = "// palisade-agent-fingerprint: ";

/// Configuration embedded into the rendered script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub token_name: String,
    pub cookie_name: String,
    pub header_name: String,
    pub patterns: Vec<AgentPattern>,
    pub protected_methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentPattern {
    /// JavaScript `RegExp` source
    pub source: String,
    pub scope: PatternScope,
}

/// Renders the agent script for one configuration
#[derive(Debug, Clone)]
pub struct ClientAgent {
    config: AgentConfig,
}

impl ClientAgent {
    pub fn new(config: &CsrfConfig, matcher: &UrlMatcher) -> Self {
        Self {
            config: AgentConfig {
                token_name: config.token_name.clone(),
                cookie_name: config.cookie_name.clone(),
                header_name: config.header_name.clone(),
                patterns: matcher
                    .patterns()
                    .iter()
                    .map(|p| AgentPattern {
                        source: p.js_source(),
                        scope: p.scope(),
                    })
                    .collect(),
                protected_methods: config.protected_methods.clone(),
            },
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn config_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.config)?)
    }

    /// SHA-256 of the embedded configuration, URL-safe base64
    pub fn fingerprint(&self) -> Result<String> {
        let digest = Sha256::digest(self.config_json()?.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Full script text, fingerprint header included
    pub fn render(&self) -> Result<String> {
        if !TEMPLATE.contains(CONFIG_PLACEHOLDER) {
            return Err(CsrfError::AssetGeneration(
                "agent template has no configuration placeholder".to_string(),
            ));
        }

        Ok(format!(
            "{}{}\n{}",
            FINGERPRINT_PREFIX,
            self.fingerprint()?,
            TEMPLATE.replacen(CONFIG_PLACEHOLDER, &self.config_json()?, 1)
        ))
    }
}

/// Fingerprint recorded in a rendered script, if any
pub fn embedded_fingerprint(script: &str) -> Option<&str> {
    script
        .lines()
        .next()?
        .strip_prefix(FINGERPRINT_PREFIX)
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(patterns: &[&str]) -> ClientAgent {
        let config = CsrfConfig::new().with_verify_get_for(patterns.iter().copied());
        let matcher = config.validate().unwrap();
        ClientAgent::new(&config, &matcher)
    }

    #[test]
    fn test_render_embeds_configuration() {
        let script = agent(&["http://test/delete*", "/account/*"]).render().unwrap();

        assert!(!script.contains(CONFIG_PLACEHOLDER));
        assert!(script.contains(r#""tokenName":"csrfp_token""#));
        assert!(script.contains(r#""cookieName":"CSRF_AUTH_TOKEN""#));
        assert!(script.contains(r#""scope":"path""#));
        assert!(script.contains(r#""protectedMethods":["POST"]"#));
        assert!(script.contains("X-No-CSRF"));
        assert!(script.contains(r#""headerName":"X-CSRF-Token""#));
    }

    #[test]
    fn test_body_less_posts_are_sent_urlencoded() {
        let script = agent(&[]).render().unwrap();
        assert!(script.contains("var FORM_URLENCODED = 'application/x-www-form-urlencoded';"));
        assert!(script.contains("xhr.setRequestHeader('Content-Type', FORM_URLENCODED);"));
        assert!(script.contains("xhr.setRequestHeader(config.headerName, token);"));
    }

    #[test]
    fn test_pattern_sources_match_server_compilation() {
        let agent = agent(&["https://test/*.php"]);
        assert_eq!(
            agent.config().patterns[0].source,
            "^https:\\/\\/test\\/[\\s\\S]*\\.php$"
        );
        assert_eq!(agent.config().patterns[0].scope, PatternScope::Url);
    }

    #[test]
    fn test_fingerprint_tracks_configuration() {
        let a = agent(&["http://test/a*"]);
        let b = agent(&["http://test/b*"]);

        assert_eq!(a.fingerprint().unwrap(), agent(&["http://test/a*"]).fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let script = a.render().unwrap();
        assert_eq!(
            embedded_fingerprint(&script),
            Some(a.fingerprint().unwrap().as_str())
        );
        assert_eq!(embedded_fingerprint("var x = 1;"), None);
    }
}
