use palisade_core::HttpRequest;

/// Per-request state seen by the authorizer. Never outlives the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request: HttpRequest,

    /// A lower layer (reverse proxy module, gateway) already validated and
    /// stamped this request. Authorization is skipped and no token or
    /// cookie is touched.
    pub upstream_authorized: bool,
}

impl RequestContext {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            upstream_authorized: false,
        }
    }

    pub fn with_upstream_authorized(mut self, authorized: bool) -> Self {
        self.upstream_authorized = authorized;
        self
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn current_url(&self) -> String {
        self.request.current_url()
    }

    /// Token submitted with the request.
    ///
    /// GET requests carry it in the query string. Every other method carries
    /// it in the urlencoded form body, as a top-level string field of a JSON
    /// object body, or in the `header_name` request header.
    pub fn submitted_token(&self, token_name: &str, header_name: &str) -> Option<String> {
        if self.request.method == "GET" {
            return self.request.query(token_name).cloned();
        }

        if let Some(token) = self.request.form(token_name) {
            return Some(token.clone());
        }

        serde_json::from_slice::<serde_json::Value>(&self.request.body)
            .ok()
            .and_then(|json| json.get(token_name)?.as_str().map(str::to_string))
            .or_else(|| self.request.header(header_name).cloned())
    }

    pub fn into_request(self) -> HttpRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::FORM_URLENCODED;

    #[test]
    fn test_get_reads_query() {
        let ctx = RequestContext::new(
            HttpRequest::new("GET", "/delete.php")
                .with_query("csrfp_token", "abc")
                .with_form("csrfp_token", "form"),
        );
        assert_eq!(ctx.submitted_token("csrfp_token", "X-CSRF-Token"), Some("abc".to_string()));
    }

    #[test]
    fn test_post_reads_form_body() {
        let ctx = RequestContext::new(
            HttpRequest::new("POST", "/submit")
                .with_header("Content-Type", FORM_URLENCODED)
                .with_body(b"csrfp_token=abc&param1=1".to_vec())
                .with_query("csrfp_token", "query"),
        );
        assert_eq!(ctx.submitted_token("csrfp_token", "X-CSRF-Token"), Some("abc".to_string()));
    }

    #[test]
    fn test_post_falls_back_to_json() {
        let ctx = RequestContext::new(
            HttpRequest::new("POST", "/api")
                .with_header("Content-Type", "application/json")
                .with_body(br#"{"csrfp_token":"abc","n":1}"#.to_vec()),
        );
        assert_eq!(ctx.submitted_token("csrfp_token", "X-CSRF-Token"), Some("abc".to_string()));

        let ctx = RequestContext::new(
            HttpRequest::new("POST", "/api").with_body(br#"{"csrfp_token":7}"#.to_vec()),
        );
        assert_eq!(ctx.submitted_token("csrfp_token", "X-CSRF-Token"), None);
    }

    #[test]
    fn test_post_falls_back_to_header() {
        let ctx = RequestContext::new(
            HttpRequest::new("POST", "/api")
                .with_header("Content-Type", "application/json")
                .with_header("x-csrf-token", "abc")
                .with_body(b"[1,2,3]".to_vec()),
        );
        assert_eq!(ctx.submitted_token("csrfp_token", "X-CSRF-Token"), Some("abc".to_string()));

        // GET only reads the query string
        let ctx = RequestContext::new(
            HttpRequest::new("GET", "/delete").with_header("X-CSRF-Token", "abc"),
        );
        assert_eq!(ctx.submitted_token("csrfp_token", "X-CSRF-Token"), None);
    }

    #[test]
    fn test_missing_token() {
        let ctx = RequestContext::new(HttpRequest::new("POST", "/submit"));
        assert_eq!(ctx.submitted_token("csrfp_token", "X-CSRF-Token"), None);
        assert!(!ctx.upstream_authorized);
    }
}
