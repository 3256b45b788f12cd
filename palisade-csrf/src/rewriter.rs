use crate::config::CsrfConfig;
use crate::error::{CsrfError, Result};
use palisade_core::HttpResponse;
use regex::Regex;
use tracing::trace;

/// Opening `<body ...>` tag, attributes included
const BODY_TAG: &str = r"(?i)<body\b[^>]*>";

/// Injects the client agent into HTML responses.
///
/// The `<script>` goes right after the opening `<body>` tag so it runs
/// before any script of the page that could submit a form. Bodies are
/// rewritten as a whole; streaming responses are not supported.
#[derive(Debug, Clone)]
pub struct ResponseRewriter {
    body_tag: Regex,
    injection: String,
}

impl ResponseRewriter {
    pub fn new(config: &CsrfConfig) -> Result<Self> {
        let body_tag = Regex::new(BODY_TAG)
            .map_err(|e| CsrfError::Configuration(format!("body tag pattern: {}", e)))?;

        Ok(Self {
            body_tag,
            injection: format!(
                "\n<script type=\"text/javascript\" src=\"{}\"></script>\
                 <noscript>{}</noscript>",
                config.js_url, config.disabled_javascript_message
            ),
        })
    }

    /// Markup inserted after `<body>`
    pub fn injection(&self) -> &str {
        &self.injection
    }

    /// Insert the agent after the first `<body>` tag. Bodies without one,
    /// or rewrites that are not `applicable`, come back unchanged.
    pub fn rewrite(&self, body: &str, applicable: bool) -> String {
        if !applicable {
            return body.to_string();
        }

        match self.body_tag.find(body) {
            Some(tag) => {
                let mut rewritten = String::with_capacity(body.len() + self.injection.len());
                rewritten.push_str(&body[..tag.end()]);
                rewritten.push_str(&self.injection);
                rewritten.push_str(&body[tag.end()..]);
                rewritten
            }
            None => {
                trace!("No <body> tag, skipping script injection");
                body.to_string()
            }
        }
    }

    /// Rewrite an HTML response in place. Non-HTML and non-UTF-8 bodies
    /// are passed through.
    pub fn rewrite_response(&self, mut response: HttpResponse, applicable: bool) -> HttpResponse {
        if !applicable || !response.is_html() {
            return response;
        }

        let Ok(body) = std::str::from_utf8(&response.body) else {
            trace!("Response body is not UTF-8, skipping script injection");
            return response;
        };

        let rewritten = self.rewrite(body, true);
        if rewritten.len() != response.body.len() {
            response.body = rewritten.into_bytes();
            response
                .headers
                .retain(|key, _| !key.eq_ignore_ascii_case("Content-Length"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> ResponseRewriter {
        ResponseRewriter::new(&CsrfConfig::new().with_disabled_javascript_message("enable js"))
            .unwrap()
    }

    #[test]
    fn test_script_follows_body_tag() {
        let input = "<html><head><title>Test</title></head>\
                     <body onload=\"test()\"><p>content</p></body></html>";
        let output = rewriter().rewrite(input, true);

        let body_start = output.find("<body").unwrap();
        let script_start = output.find("<script").unwrap();
        assert_eq!(script_start - body_start, 23);
        assert!(output.len() > input.len());
        assert!(output.contains("<noscript>enable js</noscript>"));
        assert!(output.contains("src=\"/js/csrfprotector.js\""));
    }

    #[test]
    fn test_tag_match_is_case_insensitive() {
        let output = rewriter().rewrite("<HTML><BODY class=\"x\">hi</BODY></HTML>", true);
        assert!(output.starts_with("<HTML><BODY class=\"x\">\n<script"));
    }

    #[test]
    fn test_only_first_body_tag() {
        let output = rewriter().rewrite("<body><p><body></p></body>", true);
        assert_eq!(output.matches("<script").count(), 1);
    }

    #[test]
    fn test_fragment_is_untouched() {
        let input = "<div>partial</div>";
        assert_eq!(rewriter().rewrite(input, true), input);
        assert_eq!(rewriter().rewrite("<bodyguard>", true), "<bodyguard>");
    }

    #[test]
    fn test_not_applicable() {
        let input = "<body></body>";
        assert_eq!(rewriter().rewrite(input, false), input);
    }

    #[test]
    fn test_rewrite_response() {
        let html = HttpResponse::ok()
            .with_html("<body>x</body>")
            .with_header("Content-Length".to_string(), "14".to_string());
        let rewritten = rewriter().rewrite_response(html, true);
        assert!(String::from_utf8(rewritten.body).unwrap().contains("<script"));
        assert!(!rewritten.headers.contains_key("Content-Length"));

        let json = HttpResponse::ok()
            .with_json(&serde_json::json!({"html": "<body>"}))
            .unwrap();
        let untouched = rewriter().rewrite_response(json.clone(), true);
        assert_eq!(untouched.body, json.body);
    }
}
