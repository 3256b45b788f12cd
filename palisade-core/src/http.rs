// HTTP request and response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Content type of urlencoded form submissions.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// HTTP request wrapper
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
    pub form_params: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            query_params: HashMap::new(),
            form_params: HashMap::new(),
            cookies: HashMap::new(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the raw body. A urlencoded body is also decoded into `form_params`.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        if self.is_form() {
            self.parse_form_body();
        }
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    pub fn with_form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_params.insert(key.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Get a header value, case-insensitively
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(name).or_else(|| {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Get a form field by name
    pub fn form(&self, name: &str) -> Option<&String> {
        self.form_params.get(name)
    }

    /// Get a cookie by name
    pub fn cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }

    /// Whether the body is an urlencoded form submission
    pub fn is_form(&self) -> bool {
        self.header("Content-Type")
            .map(|ct| ct.to_ascii_lowercase().starts_with(FORM_URLENCODED))
            .unwrap_or(false)
    }

    /// Parse a raw query string (without the leading `?`) into `query_params`
    pub fn parse_query(&mut self, raw: &str) -> Result<(), crate::Error> {
        let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
            .map_err(|e| crate::Error::BadRequest(format!("Malformed query string: {}", e)))?;
        self.query_params.extend(pairs);
        Ok(())
    }

    /// Decode an urlencoded body into `form_params`. Undecodable bodies are left alone.
    pub fn parse_form_body(&mut self) {
        if let Ok(pairs) = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&self.body) {
            self.form_params.extend(pairs);
        }
    }

    /// Parse a `Cookie` request header into `cookies`
    pub fn parse_cookie_header(&mut self, header: &str) {
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                self.cookies
                    .insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// Fully qualified URL without the query string: `scheme://host/path`
    pub fn current_url(&self) -> String {
        if self.path.starts_with('/') {
            format!("{}://{}{}", self.scheme, self.host, self.path)
        } else {
            format!("{}://{}/{}", self.scheme, self.host, self.path)
        }
    }

    /// Drop every submitted parameter, leaving the handler with empty sets
    pub fn strip_parameters(&mut self) {
        self.query_params.clear();
        self.form_params.clear();
        self.body.clear();
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// One entry per `Set-Cookie` header line
    pub set_cookies: Vec<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            set_cookies: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn forbidden() -> Self {
        Self::new(403)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    /// 302 Found pointing at `location`
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(302).with_header("Location".to_string(), location.into())
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.body = html.into().into_bytes();
        self.headers.insert(
            "Content-Type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.set_cookies.push(cookie.into());
        self
    }

    pub fn content_type(&self) -> Option<&String> {
        self.headers.get("Content-Type").or_else(|| {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("Content-Type"))
                .map(|(_, value)| value)
        })
    }

    /// Responses without a content type are treated as HTML
    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(true)
    }

    /// All header lines, `Set-Cookie` entries included
    pub fn header_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .headers
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect();
        lines.extend(self.set_cookies.iter().map(|c| format!("Set-Cookie: {}", c)));
        lines
    }
}
