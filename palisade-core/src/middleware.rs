//! Request pipeline: an ordered stack of [`Middleware`] wrapped around a
//! handler. The first middleware added sees the request first and the
//! response last.

use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

/// Boxed future resolving to a response
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// Remainder of the pipeline, handed to each middleware
pub type Next = Box<dyn FnOnce(HttpRequest) -> ResponseFuture + Send>;

/// Terminal request handler
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> ResponseFuture + Send + Sync>;

/// Wrap an async closure as a [`HandlerFn`]
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// A pipeline stage. Call `next` to continue, or return a response to halt.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

type Stack = Arc<[Arc<dyn Middleware>]>;

#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stack: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage to the end of the pipeline
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.stack.push(Arc::new(middleware));
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Run `req` through every stage, then `handler`
    pub async fn apply(&self, req: HttpRequest, handler: HandlerFn) -> Result<HttpResponse, Error> {
        debug!(
            stages = self.stack.len(),
            method = %req.method,
            path = %req.path,
            "Dispatching request"
        );
        let stack: Stack = self.stack.clone().into();
        dispatch(stack, 0, req, handler).await
    }
}

fn dispatch(stack: Stack, depth: usize, req: HttpRequest, handler: HandlerFn) -> ResponseFuture {
    let Some(stage) = stack.get(depth).cloned() else {
        trace!(depth, "Calling handler");
        return handler(req);
    };

    trace!(depth, "Entering middleware");
    let next: Next = Box::new(move |req| dispatch(stack, depth + 1, req, handler));
    Box::pin(async move { stage.handle(req, next).await })
}
