// Palisade - Cross-site request forgery protection for Rust web servers
//
// This library ties together the HTTP primitives, the CSRF protection layer
// and the logging bootstrap behind one import.

// Re-export core functionality
pub use palisade_core::*;

// Re-export the protection layer
pub use palisade_csrf;

#[cfg(feature = "log")]
pub use palisade_log;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Error, HttpRequest, HttpResponse, Middleware, MiddlewareChain, Next, handler,
    };
    pub use palisade_csrf::{
        Authorization, CsrfConfig, CsrfError, CsrfMiddleware, FailureAction, MemorySessionStore,
        RequestAuthorizer, RequestContext, SessionHandle, SessionStore, TokenAuthority,
        UrlMatcher,
    };

    #[cfg(feature = "log")]
    pub use palisade_log::{LogConfig, LogFormat, LogLevel};
}
