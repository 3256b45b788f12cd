//! # Palisade Core
//!
//! HTTP request/response primitives and the middleware chain the Palisade
//! protection layers plug into.
//!
//! ```rust
//! use palisade_core::{HttpRequest, HttpResponse};
//!
//! let req = HttpRequest::new("GET", "/index.php")
//!     .with_scheme("https")
//!     .with_host("example.com");
//! assert_eq!(req.current_url(), "https://example.com/index.php");
//!
//! let res = HttpResponse::redirect("/error");
//! assert_eq!(res.status, 302);
//! ```

pub mod error;
pub mod http;
pub mod middleware;

pub use error::{Error, Result};
pub use http::{FORM_URLENCODED, HttpRequest, HttpResponse};
pub use middleware::{HandlerFn, Middleware, MiddlewareChain, Next, ResponseFuture, handler};
