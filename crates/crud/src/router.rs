//! Binds handler initializers to `(path, method)` pairs.
//!
//! Two bindings are available. [`init_router`] registers path patterns with `{name}` parameters,
//! matched by `matchit`. [`init_mux`] registers plain paths per method: a path matches exactly,
//! and a path ending in `/` also matches everything below it, the longest such path winning. A
//! request for such a subtree without its trailing slash is redirected to it with
//! `301 Moved Permanently`.
//!
//! A request that matches no route is answered with `404 Not Found`. Errors returned by the
//! handler pipeline are given to the route's [`ErrorHandler`].
//!
//! Each request runs on its own task. The response is returned when the task ends, or earlier if
//! the handler switched the sink to streaming and wrote the status.

use crate::error::BoxError;
use crate::handler::{HandlerInitializer, serve};
use crate::redirect::Redirect;
use crate::request::{PathParams, RequestBody, RequestContext};
use crate::response::{ResponseBody, ResponseSink};
use crate::writer::BodyWriter;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Formats the response for an error returned by a handler.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, sink: &ResponseSink, req: &RequestContext, err: BoxError);
}

/// Answers with the error message as plain text and `400 Bad Request`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle_error(&self, sink: &ResponseSink, _req: &RequestContext, err: BoxError) {
        write_plain_error(sink, &err.to_string(), StatusCode::BAD_REQUEST);
    }
}

fn write_plain_error(sink: &ResponseSink, message: &str, status: StatusCode) {
    sink.with_headers(|headers| {
        headers.remove(http::header::CONTENT_LENGTH);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    });
    sink.write_header(status);
    sink.write(message.as_bytes());
    sink.write(b"\n");
}

/// Converts the value registered with a route into a [`HandlerInitializer`].
///
/// `path` is the full path of the route, prefix included.
pub trait InitializerAdapter<T>: Send + Sync {
    fn adapt(&self, value: T, path: &str, method: &Method) -> Arc<dyn HandlerInitializer>;
}

/// Registers values that already are handler initializers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAdapter;

impl<T: HandlerInitializer + 'static> InitializerAdapter<T> for IdentityAdapter {
    fn adapt(&self, value: T, _path: &str, _method: &Method) -> Arc<dyn HandlerInitializer> {
        Arc::new(value)
    }
}

/// One `(path, method)` registration.
#[derive(Debug, Clone)]
pub struct Route<T> {
    pub path: String,
    pub method: Method,
    pub initializer: T,
}

impl<T> Route<T> {
    pub fn new(method: Method, path: impl Into<String>, initializer: T) -> Self {
        Self { path: path.into(), method, initializer }
    }
}

macro_rules! method_route {
    ($fn_name:ident, $method:ident) => {
        pub fn $fn_name<T>(path: impl Into<String>, initializer: T) -> Route<T> {
            Route::new(Method::$method, path, initializer)
        }
    };
}

method_route!(get, GET);
method_route!(post, POST);
method_route!(put, PUT);
method_route!(patch, PATCH);
method_route!(delete, DELETE);
method_route!(head, HEAD);
method_route!(options, OPTIONS);

/// Options applied to every route of an [`init_router`] or [`init_mux`] call.
pub struct RouteOptions<A = IdentityAdapter> {
    pub adapter: A,
    pub error_handler: Option<Arc<dyn ErrorHandler>>,
    pub path_prefix: String,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self { adapter: IdentityAdapter, error_handler: None, path_prefix: String::new() }
    }
}

impl<A> fmt::Debug for RouteOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("path_prefix", &self.path_prefix)
            .field("error_handler", &self.error_handler.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid route {method} {path}: {source}")]
    Insert { method: Method, path: String, source: matchit::InsertError },

    #[error("route {method} {path} is already registered")]
    Duplicate { method: Method, path: String },

    #[error("route path {path:?} must begin with '/'")]
    InvalidPath { path: String },
}

#[derive(Clone)]
struct Endpoint {
    initializer: Arc<dyn HandlerInitializer>,
    error_handler: Arc<dyn ErrorHandler>,
}

enum Target<'r> {
    Endpoint(&'r Endpoint, PathParams),
    Redirect(String),
}

/// Routes requests to handler initializers.
#[derive(Default)]
pub struct Router {
    patterns: HashMap<Method, matchit::Router<Endpoint>>,
    mux: HashMap<Method, matchit::Router<Endpoint>>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("pattern_methods", &self.patterns.keys().collect::<Vec<_>>())
            .field("mux_methods", &self.mux.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Registers `routes` as path patterns.
pub fn init_router<T, A, I>(router: &mut Router, routes: I, opts: RouteOptions<A>) -> Result<(), RouterError>
where
    I: IntoIterator<Item = Route<T>>,
    A: InitializerAdapter<T>,
{
    let error_handler = opts.error_handler.unwrap_or_else(|| Arc::new(DefaultErrorHandler));

    for route in routes {
        let path = format!("{}{}", opts.path_prefix, route.path);
        let initializer = opts.adapter.adapt(route.initializer, &path, &route.method);
        let endpoint = Endpoint { initializer, error_handler: Arc::clone(&error_handler) };

        router
            .patterns
            .entry(route.method.clone())
            .or_insert_with(matchit::Router::new)
            .insert(path.clone(), endpoint)
            .map_err(|source| RouterError::Insert { method: route.method, path, source })?;
    }
    Ok(())
}

/// Registers `routes` as plain paths.
///
/// A path ending in `/` is stored twice: as itself and with a catch-all segment for everything
/// below it.
pub fn init_mux<T, A, I>(router: &mut Router, routes: I, opts: RouteOptions<A>) -> Result<(), RouterError>
where
    I: IntoIterator<Item = Route<T>>,
    A: InitializerAdapter<T>,
{
    let error_handler = opts.error_handler.unwrap_or_else(|| Arc::new(DefaultErrorHandler));

    for route in routes {
        let path = format!("{}{}", opts.path_prefix, route.path);
        if !path.starts_with('/') {
            return Err(RouterError::InvalidPath { path });
        }

        let initializer = opts.adapter.adapt(route.initializer, &path, &route.method);
        let endpoint = Endpoint { initializer, error_handler: Arc::clone(&error_handler) };
        let tree = router.mux.entry(route.method.clone()).or_insert_with(matchit::Router::new);

        let literal = path.replace('{', "{{").replace('}', "}}");
        let inserted = if path.ends_with('/') {
            tree.insert(literal.clone(), endpoint.clone()).and_then(|()| tree.insert(format!("{literal}{{*rest}}"), endpoint))
        } else {
            tree.insert(literal, endpoint)
        };

        inserted.map_err(|source| match source {
            matchit::InsertError::Conflict { .. } => RouterError::Duplicate { method: route.method, path },
            source => RouterError::Insert { method: route.method, path, source },
        })?;
    }
    Ok(())
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    fn at(&self, method: &Method, path: &str) -> Option<Target<'_>> {
        if let Some(matched) = self.patterns.get(method).and_then(|tree| tree.at(path).ok()) {
            return Some(Target::Endpoint(matched.value, matched.params.into()));
        }

        let tree = self.mux.get(method)?;
        let matched = tree.at(path).ok();

        // a subtree root requested without its slash wins over a catch-all of a shorter subtree
        if !path.ends_with('/') && matched.as_ref().is_none_or(|m| !m.params.is_empty()) {
            let dir = format!("{path}/");
            if tree.at(&dir).is_ok_and(|m| m.params.is_empty()) {
                return Some(Target::Redirect(dir));
            }
        }

        matched.map(|m| Target::Endpoint(m.value, PathParams::empty()))
    }

    /// Whether a route is registered for `method` and `path`.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        matches!(self.at(method, path), Some(Target::Endpoint(..)))
    }

    /// Runs the matching handler for `request` and returns the response it wrote.
    pub async fn dispatch<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (head, body) = request.into_parts();
        let sink = ResponseSink::new();

        let (endpoint, params) = match self.at(&head.method, head.uri.path()) {
            Some(Target::Endpoint(endpoint, params)) => (endpoint.clone(), params),
            Some(Target::Redirect(dir)) => {
                let location = match head.uri.query() {
                    Some(query) => format!("{dir}?{query}"),
                    None => dir,
                };
                debug!(method = %head.method, path = head.uri.path(), %location, "redirecting to subtree");
                let req = RequestContext::from_parts(head, RequestBody::empty(), PathParams::empty());
                let mut redirect = Redirect::new(location, StatusCode::MOVED_PERMANENTLY);
                if let Err(e) = redirect.write_body(&sink, &req, StatusCode::MOVED_PERMANENTLY).await {
                    warn!(cause = %e, "failed to write subtree redirect");
                    write_plain_error(&sink, "400 bad request", StatusCode::BAD_REQUEST);
                }
                return sink.take_response();
            }
            None => {
                debug!(method = %head.method, path = head.uri.path(), "no route matched");
                write_plain_error(&sink, "404 page not found", StatusCode::NOT_FOUND);
                return sink.take_response();
            }
        };

        let req = RequestContext::from_parts(head, RequestBody::new(body), params);
        debug!(method = %req.method(), path = req.uri().path(), "dispatching request");

        let task_sink = sink.clone();
        let mut pipeline = tokio::spawn(async move {
            if let Err(e) = serve(endpoint.initializer.as_ref(), &req, &task_sink).await {
                warn!(method = %req.method(), path = req.uri().path(), cause = %e, "handler returned an error");
                endpoint.error_handler.handle_error(&task_sink, &req, e);
            }
            task_sink.finish();
        });

        tokio::select! {
            biased;

            joined = &mut pipeline => {
                if let Err(e) = joined {
                    error!(cause = %e, "handler task failed");
                    write_plain_error(&sink, "500 internal server error", StatusCode::INTERNAL_SERVER_ERROR);
                    sink.finish();
                }
            }

            () = sink.head_released() => debug!("streaming response body"),
        }

        sink.take_response()
    }
}

/// Collects pattern routes sharing one prefix and error handler.
pub struct RouterBuilder {
    routes: Vec<Route<Arc<dyn HandlerInitializer>>>,
    path_prefix: String,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.routes.iter().map(|r| (&r.method, &r.path)).collect::<Vec<_>>())
            .field("path_prefix", &self.path_prefix)
            .finish_non_exhaustive()
    }
}

impl RouterBuilder {
    fn new() -> Self {
        Self { routes: Vec::new(), path_prefix: String::new(), error_handler: None }
    }

    pub fn route<T: HandlerInitializer + 'static>(mut self, route: Route<T>) -> Self {
        let Route { path, method, initializer } = route;
        self.routes.push(Route::new(method, path, Arc::new(initializer)));
        self
    }

    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    pub fn error_handler(mut self, error_handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Some(Arc::new(error_handler));
        self
    }

    pub fn build(self) -> Result<Router, RouterError> {
        let mut router = Router::new();
        let opts = RouteOptions { adapter: IdentityAdapter, error_handler: self.error_handler, path_prefix: self.path_prefix };
        init_router(&mut router, self.routes, opts)?;
        Ok(router)
    }
}
