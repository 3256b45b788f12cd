use crate::audit::{AttackLogEntry, AuditLog};
use crate::config::CsrfConfig;
use crate::error::Result;
use palisade_core::{HttpRequest, HttpResponse};
use std::sync::Arc;
use tracing::warn;

/// Remediation applied when a request fails token validation.
///
/// The numeric codes are those used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureAction {
    /// 0: respond 403 and halt
    Forbidden,
    /// 1: drop every submitted parameter and let the handler run
    #[default]
    StripParameters,
    /// 2: redirect to the configured error page and halt
    Redirect,
    /// 3: render the configured error message and halt
    CustomMessage,
    /// 4: respond 500 and halt
    InternalError,
}

impl FailureAction {
    /// Map a configuration code. Unknown codes yield `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(FailureAction::Forbidden),
            1 => Some(FailureAction::StripParameters),
            2 => Some(FailureAction::Redirect),
            3 => Some(FailureAction::CustomMessage),
            4 => Some(FailureAction::InternalError),
            _ => None,
        }
    }

    /// Map a configuration code, falling back to [`FailureAction::StripParameters`].
    /// An unknown code must never let a forged request through.
    pub fn from_code_or_default(code: i64) -> Self {
        Self::from_code(code).unwrap_or_else(|| {
            warn!(
                code,
                "Unknown CSRF failure action code, falling back to stripping parameters"
            );
            FailureAction::StripParameters
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            FailureAction::Forbidden => 0,
            FailureAction::StripParameters => 1,
            FailureAction::Redirect => 2,
            FailureAction::CustomMessage => 3,
            FailureAction::InternalError => 4,
        }
    }

    /// Whether the action ends the request without reaching the handler
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FailureAction::StripParameters)
    }
}

/// Outcome of a dispatched failure action
#[derive(Debug)]
pub enum Remediation {
    /// Parameters were removed; the handler still runs
    Stripped,
    /// The request ends with this response
    Halt(HttpResponse),
}

/// Performs the configured failure action. Stateless between calls.
#[derive(Clone)]
pub struct FailureActionDispatcher {
    config: Arc<CsrfConfig>,
    audit: Arc<dyn AuditLog>,
}

impl FailureActionDispatcher {
    pub fn new(config: Arc<CsrfConfig>, audit: Arc<dyn AuditLog>) -> Self {
        Self { config, audit }
    }

    /// Apply `action` to a request that failed validation.
    ///
    /// Terminal actions write the audit entry first; if that fails the
    /// error propagates and no response is produced.
    pub async fn dispatch(
        &self,
        action: FailureAction,
        request: &mut HttpRequest,
    ) -> Result<Remediation> {
        if action.is_terminal() {
            self.audit
                .append(&AttackLogEntry::from_request(request, action.code()))
                .await?;
        }

        warn!(
            method = %request.method,
            url = %request.current_url(),
            action = action.code(),
            "CSRF validation failed"
        );

        let remediation = match action {
            FailureAction::StripParameters => {
                request.strip_parameters();
                Remediation::Stripped
            }
            FailureAction::Forbidden => Remediation::Halt(forbidden()),
            FailureAction::Redirect => match &self.config.error_redirection_page {
                Some(target) if !target.is_empty() => {
                    Remediation::Halt(HttpResponse::redirect(target.clone()))
                }
                _ => {
                    warn!("No error redirection page configured, responding 403");
                    Remediation::Halt(forbidden())
                }
            },
            FailureAction::CustomMessage => Remediation::Halt(
                HttpResponse::ok().with_html(self.config.custom_error_message.clone()),
            ),
            FailureAction::InternalError => Remediation::Halt(
                HttpResponse::internal_server_error()
                    .with_html("<h2>500 Internal Server Error</h2>"),
            ),
        };

        Ok(remediation)
    }
}

fn forbidden() -> HttpResponse {
    HttpResponse::forbidden().with_html("<h2>403 Access Forbidden</h2>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{FileAuditLog, MemoryAuditLog};
    use crate::error::CsrfError;

    fn request() -> HttpRequest {
        HttpRequest::new("POST", "/index.php")
            .with_host("test")
            .with_form("param1", "1")
            .with_form("param2", "2")
    }

    fn dispatcher(config: CsrfConfig) -> (FailureActionDispatcher, MemoryAuditLog) {
        let audit = MemoryAuditLog::new();
        (
            FailureActionDispatcher::new(Arc::new(config), Arc::new(audit.clone())),
            audit,
        )
    }

    #[test]
    fn test_code_mapping() {
        for code in 0..=4 {
            assert_eq!(FailureAction::from_code(code).unwrap().code() as i64, code);
        }
        assert_eq!(FailureAction::from_code(10), None);
        assert_eq!(
            FailureAction::from_code_or_default(10),
            FailureAction::StripParameters
        );
        assert_eq!(
            FailureAction::from_code_or_default(-1),
            FailureAction::StripParameters
        );
        assert!(!FailureAction::StripParameters.is_terminal());
        assert!(FailureAction::InternalError.is_terminal());
    }

    #[tokio::test]
    async fn test_strip_parameters() {
        let (dispatcher, audit) = dispatcher(CsrfConfig::new());
        let mut req = request().with_query("param1", "1");

        let outcome = dispatcher
            .dispatch(FailureAction::StripParameters, &mut req)
            .await
            .unwrap();

        assert!(matches!(outcome, Remediation::Stripped));
        assert!(req.form_params.is_empty());
        assert!(req.query_params.is_empty());
        assert!(audit.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_logs_and_halts() {
        let (dispatcher, audit) = dispatcher(CsrfConfig::new());
        let mut req = request();

        let outcome = dispatcher
            .dispatch(FailureAction::Forbidden, &mut req)
            .await
            .unwrap();

        match outcome {
            Remediation::Halt(response) => assert_eq!(response.status, 403),
            other => panic!("expected halt, got {:?}", other),
        }
        let entries = audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "http://test/index.php");
    }

    #[tokio::test]
    async fn test_redirect() {
        let (dispatcher, _) =
            dispatcher(CsrfConfig::new().with_error_redirection_page("http://test"));
        let outcome = dispatcher
            .dispatch(FailureAction::Redirect, &mut request())
            .await
            .unwrap();

        match outcome {
            Remediation::Halt(response) => {
                assert_eq!(response.status, 302);
                assert_eq!(
                    response.headers.get("Location"),
                    Some(&"http://test".to_string())
                );
            }
            other => panic!("expected halt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_without_target() {
        let (dispatcher, _) = dispatcher(CsrfConfig::new());
        let outcome = dispatcher
            .dispatch(FailureAction::Redirect, &mut request())
            .await
            .unwrap();
        assert!(matches!(outcome, Remediation::Halt(ref r) if r.status == 403));
    }

    #[tokio::test]
    async fn test_custom_message() {
        let (dispatcher, _) =
            dispatcher(CsrfConfig::new().with_custom_error_message("custom error message"));
        let outcome = dispatcher
            .dispatch(FailureAction::CustomMessage, &mut request())
            .await
            .unwrap();

        match outcome {
            Remediation::Halt(response) => {
                assert_eq!(response.status, 200);
                assert_eq!(response.body, b"custom error message".to_vec())
            }
            other => panic!("expected halt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_internal_error() {
        let (dispatcher, _) = dispatcher(CsrfConfig::new());
        let outcome = dispatcher
            .dispatch(FailureAction::InternalError, &mut request())
            .await
            .unwrap();
        assert!(matches!(outcome, Remediation::Halt(ref r) if r.status == 500));
    }

    #[tokio::test]
    async fn test_missing_log_directory_is_reported() {
        let config = Arc::new(CsrfConfig::new().with_log_directory("unknown_location"));
        let audit = Arc::new(FileAuditLog::new(config.log_directory.clone()));
        let dispatcher = FailureActionDispatcher::new(config, audit);

        let err = dispatcher
            .dispatch(FailureAction::Forbidden, &mut request())
            .await
            .unwrap_err();
        assert!(matches!(err, CsrfError::LogDirectoryNotFound(_)));
    }
}
