//! Request handling module that provides access to HTTP request information and path parameters.
//!
//! This module contains the core types for working with HTTP requests:
//! - `RequestContext`: the request head, its path parameters, its query values and its body
//! - `PathParams`: named segments captured by the route pattern
//! - `QueryValues`: the decoded query string
//! - `RequestBody`: the request payload, consumable once

use crate::error::BoxError;
use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Request, Uri, Version};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Represents the context of an HTTP request.
///
/// The context is a cheap handle: clones share the same head, parameters and body, so a reader
/// may keep a clone around for the steps that run after it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
    body: RequestBody,
}

#[derive(Debug)]
struct Inner {
    head: Parts,
    path_params: PathParams,
    query: QueryValues,
}

impl RequestContext {
    /// Creates a new RequestContext from the request and the parameters captured by its route
    pub fn new<B>(request: Request<B>, path_params: PathParams) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (head, body) = request.into_parts();
        Self::from_parts(head, RequestBody::new(body), path_params)
    }

    pub fn from_parts(head: Parts, body: RequestBody, path_params: PathParams) -> Self {
        let query = head.uri.query().map(QueryValues::parse).unwrap_or_default();
        Self { inner: Arc::new(Inner { head, path_params, query }), body }
    }

    /// Returns the HTTP method of the request
    pub fn method(&self) -> &Method {
        &self.inner.head.method
    }

    /// Returns the URI of the request
    pub fn uri(&self) -> &Uri {
        &self.inner.head.uri
    }

    /// Returns the HTTP version of the request
    pub fn version(&self) -> Version {
        self.inner.head.version
    }

    /// Returns the HTTP headers of the request
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.head.headers
    }

    /// Returns the request extensions, the place where the host server and outer layers leave
    /// request scoped values
    pub fn extensions(&self) -> &Extensions {
        &self.inner.head.extensions
    }

    /// Returns a reference to the path parameters extracted from the request URL
    pub fn path_params(&self) -> &PathParams {
        &self.inner.path_params
    }

    /// Returns the decoded query string of the request URL
    pub fn query(&self) -> &QueryValues {
        &self.inner.query
    }

    /// Returns the request body
    pub fn body(&self) -> &RequestBody {
        &self.body
    }
}

/// Represents path parameters extracted from the URL path of an HTTP request.
///
/// Path parameters are named segments in the URL path that can be extracted and accessed
/// by name. For example, in the path "/users/{id}", "id" is a path parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    /// Creates an empty PathParams instance with no parameters
    #[inline]
    pub fn empty() -> Self {
        Self { params: Vec::new() }
    }

    /// Builds parameters from `(name, value)` pairs, mostly useful in tests
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { params: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    /// Returns true if there are no path parameters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the number of path parameters
    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Gets the value of a path parameter by its name
    /// Returns None if the parameter doesn't exist
    #[inline]
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'k, 'v> From<matchit::Params<'k, 'v>> for PathParams {
    fn from(params: matchit::Params<'k, 'v>) -> Self {
        Self::from_pairs(params.iter())
    }
}

/// The decoded `key=value` pairs of a query string, in their original order.
///
/// Pairs that cannot be decoded are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    pairs: Vec<(String, String)>,
}

impl QueryValues {
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| serde_urlencoded::from_str::<Vec<(String, String)>>(pair).ok())
            .flatten()
            .collect();
        Self { pairs }
    }

    /// Returns the first value associated with `key`
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Returns every value associated with `key`
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// The request payload.
///
/// Clones share one underlying body which can be consumed only once; later attempts fail.
#[derive(Clone)]
pub struct RequestBody {
    inner: Arc<Mutex<Option<UnsyncBoxBody<Bytes, BoxError>>>>,
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody").finish_non_exhaustive()
    }
}

impl RequestBody {
    pub fn new<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let body = body.map_err(Into::<BoxError>::into).boxed_unsync();
        Self { inner: Arc::new(Mutex::new(Some(body))) }
    }

    pub fn empty() -> Self {
        Self::new(http_body_util::Empty::<Bytes>::new())
    }

    pub async fn can_consume(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.is_some()
    }

    /// Takes the body out and hands it to `f`.
    pub async fn apply<T, F, Fut>(&self, f: F) -> Result<T, BoxError>
    where
        F: FnOnce(UnsyncBoxBody<Bytes, BoxError>) -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let req_body = {
            let mut guard = self.inner.lock().await;
            guard.take().ok_or("body has been consumed")?
        };

        f(req_body).await
    }

    /// Collects the whole body into memory.
    pub async fn bytes(&self) -> Result<Bytes, BoxError> {
        self.apply(|b| async move { b.collect().await.map(|c| c.to_bytes()) }).await
    }

    /// Puts already collected bytes back, so the body can be consumed again.
    pub async fn restore(&self, bytes: Bytes) {
        let body = http_body_util::Full::new(bytes).map_err(Into::<BoxError>::into).boxed_unsync();
        *self.inner.lock().await = Some(body);
    }
}

#[cfg(test)]
mod tests {
    use super::{PathParams, QueryValues, RequestContext};
    use http::{Method, Request};

    #[test]
    fn query_values_keep_first_value() {
        let query = QueryValues::parse("foo=1&bar=a%20b&foo=2&&baz");

        assert_eq!(query.get("foo"), Some("1"));
        assert_eq!(query.get("bar"), Some("a b"));
        assert_eq!(query.get("baz"), Some(""));
        assert_eq!(query.get("missing"), None);
        assert_eq!(query.get_all("foo").collect::<Vec<_>>(), ["1", "2"]);
    }

    #[test]
    fn path_params_lookup() {
        let params = PathParams::from_pairs([("id", "42"), ("name", "alice")]);

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("name"), Some("alice"));
        assert_eq!(params.get("missing"), None);
        assert!(PathParams::empty().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn context_exposes_request_parts() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users/42?verbose=true")
            .header("x-trace", "abc")
            .body(String::from("payload"))
            .unwrap();

        let ctx = RequestContext::new(request, PathParams::from_pairs([("id", "42")]));

        assert_eq!(*ctx.method(), Method::POST);
        assert_eq!(ctx.uri().path(), "/users/42");
        assert_eq!(ctx.headers().get("x-trace").unwrap(), "abc");
        assert_eq!(ctx.query().get("verbose"), Some("true"));
        assert_eq!(ctx.path_params().get("id"), Some("42"));

        assert!(ctx.body().can_consume().await);
        assert_eq!(ctx.body().bytes().await.unwrap(), "payload");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn body_is_consumed_once() {
        let ctx = RequestContext::new(Request::new(String::from("once")), PathParams::empty());
        let cloned = ctx.clone();

        assert_eq!(cloned.body().bytes().await.unwrap(), "once");
        assert!(!ctx.body().can_consume().await);
        assert!(ctx.body().bytes().await.is_err());

        ctx.body().restore(bytes::Bytes::from_static(b"again")).await;
        assert_eq!(cloned.body().bytes().await.unwrap(), "again");
    }
}
