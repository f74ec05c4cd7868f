//! Capability traits for reading an incoming request, and the [`RequestReader`] aggregator that
//! runs them during [`Handler::read_request`](crate::Handler::read_request).
//!
//! Each trait covers one part of the request. A handler composes the readers it needs into a
//! `RequestReader` and delegates to it:
//!
//! ```no_run
//! # use async_trait::async_trait;
//! # use micro_crud::{Action, BoxError, Handler, RequestContext};
//! # use micro_crud::reader::RequestReader;
//! # use micro_crud::scalar::Int64;
//! struct GetUser {
//!     reader: RequestReader<(), (), Int64>,
//! }
//!
//! impl Action for GetUser {}
//!
//! #[async_trait]
//! impl Handler for GetUser {
//!     async fn read_request(&mut self, req: &RequestContext) -> Result<(), BoxError> {
//!         self.reader.read_request(req).await
//!     }
//! }
//!
//! let handler = GetUser { reader: RequestReader::new().with_path(Int64::keys(["id"])) };
//! ```

use crate::error::BoxError;
use crate::request::{PathParams, QueryValues, RequestContext};
use async_trait::async_trait;
use http::HeaderMap;

/// Reads an incoming request's headers.
pub trait HeaderReader: Send {
    fn read_header(&mut self, headers: &HeaderMap) -> Result<(), BoxError>;
}

/// Reads the query parameters of an incoming request's URL.
pub trait QueryReader: Send {
    fn read_query(&mut self, query: &QueryValues) -> Result<(), BoxError>;
}

/// Reads the parameters captured from an incoming request's path.
pub trait PathReader: Send {
    fn read_path(&mut self, params: &PathParams) -> Result<(), BoxError>;
}

/// Reads the body of an incoming request.
#[async_trait]
pub trait BodyReader: Send {
    async fn read_body(&mut self, req: &RequestContext) -> Result<(), BoxError>;
}

/// Runs the configured readers in the order header → query → path → body, stopping at the first
/// error. A reader that is not set is skipped.
///
/// After a successful or failed read the request stays available through
/// [`request`](RequestReader::request) for the steps that come later.
#[derive(Debug)]
pub struct RequestReader<H = (), Q = (), P = (), B = ()> {
    pub header: Option<H>,
    pub query: Option<Q>,
    pub path: Option<P>,
    pub body: Option<B>,
    request: Option<RequestContext>,
}

impl RequestReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<H, Q, P, B> Default for RequestReader<H, Q, P, B> {
    fn default() -> Self {
        Self { header: None, query: None, path: None, body: None, request: None }
    }
}

impl<H, Q, P, B> RequestReader<H, Q, P, B> {
    pub fn with_header<H2: HeaderReader>(self, header: H2) -> RequestReader<H2, Q, P, B> {
        RequestReader { header: Some(header), query: self.query, path: self.path, body: self.body, request: None }
    }

    pub fn with_query<Q2: QueryReader>(self, query: Q2) -> RequestReader<H, Q2, P, B> {
        RequestReader { header: self.header, query: Some(query), path: self.path, body: self.body, request: None }
    }

    pub fn with_path<P2: PathReader>(self, path: P2) -> RequestReader<H, Q, P2, B> {
        RequestReader { header: self.header, query: self.query, path: Some(path), body: self.body, request: None }
    }

    pub fn with_body<B2: BodyReader>(self, body: B2) -> RequestReader<H, Q, P, B2> {
        RequestReader { header: self.header, query: self.query, path: self.path, body: Some(body), request: None }
    }

    /// The request handed to the last [`read_request`](RequestReader::read_request) call.
    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_ref()
    }
}

impl<H, Q, P, B> RequestReader<H, Q, P, B>
where
    H: HeaderReader,
    Q: QueryReader,
    P: PathReader,
    B: BodyReader,
{
    pub async fn read_request(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        self.request = Some(req.clone());

        if let Some(header) = self.header.as_mut() {
            header.read_header(req.headers())?;
        }

        if let Some(query) = self.query.as_mut() {
            query.read_query(req.query())?;
        }

        if let Some(path) = self.path.as_mut() {
            path.read_path(req.path_params())?;
        }

        if let Some(body) = self.body.as_mut() {
            return body.read_body(req).await;
        }

        Ok(())
    }
}

// `()` stands for "no reader" in the `RequestReader` type parameters.

impl HeaderReader for () {
    fn read_header(&mut self, _headers: &HeaderMap) -> Result<(), BoxError> {
        Ok(())
    }
}

impl QueryReader for () {
    fn read_query(&mut self, _query: &QueryValues) -> Result<(), BoxError> {
        Ok(())
    }
}

impl PathReader for () {
    fn read_path(&mut self, _params: &PathParams) -> Result<(), BoxError> {
        Ok(())
    }
}

#[async_trait]
impl BodyReader for () {
    async fn read_body(&mut self, _req: &RequestContext) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<T: HeaderReader + ?Sized> HeaderReader for Box<T> {
    fn read_header(&mut self, headers: &HeaderMap) -> Result<(), BoxError> {
        (**self).read_header(headers)
    }
}

impl<T: QueryReader + ?Sized> QueryReader for Box<T> {
    fn read_query(&mut self, query: &QueryValues) -> Result<(), BoxError> {
        (**self).read_query(query)
    }
}

impl<T: PathReader + ?Sized> PathReader for Box<T> {
    fn read_path(&mut self, params: &PathParams) -> Result<(), BoxError> {
        (**self).read_path(params)
    }
}

#[async_trait]
impl<T: BodyReader + ?Sized> BodyReader for Box<T> {
    async fn read_body(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        (**self).read_body(req).await
    }
}

/// Lets several readers of one kind share a slot; they run in order and stop at the first error.
macro_rules! impl_reader_for_composites {
    ($reader:ident, $method:ident, $source:ty) => {
        impl<T: $reader> $reader for Vec<T> {
            fn $method(&mut self, source: $source) -> Result<(), BoxError> {
                for reader in self.iter_mut() {
                    reader.$method(source)?;
                }
                Ok(())
            }
        }

        impl_reader_for_composites!(@tuple $reader, $method, $source, A B);
        impl_reader_for_composites!(@tuple $reader, $method, $source, A B C);
        impl_reader_for_composites!(@tuple $reader, $method, $source, A B C D);
    };
    (@tuple $reader:ident, $method:ident, $source:ty, $($param:ident)*) => {
        impl<$($param: $reader,)*> $reader for ($($param,)*) {
            #[allow(non_snake_case, reason = "tuple fields are bound by their type names")]
            fn $method(&mut self, source: $source) -> Result<(), BoxError> {
                let ($($param,)*) = self;
                $($param.$method(source)?;)*
                Ok(())
            }
        }
    };
}

impl_reader_for_composites!(HeaderReader, read_header, &HeaderMap);
impl_reader_for_composites!(QueryReader, read_query, &QueryValues);
impl_reader_for_composites!(PathReader, read_path, &PathParams);
