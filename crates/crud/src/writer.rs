//! Capability traits for writing an outgoing response, and the [`ResponseWriter`] aggregator that
//! runs them during [`Handler::init_response`](crate::Handler::init_response) and
//! [`Handler::write_response`](crate::Handler::write_response).

use crate::error::BoxError;
use crate::request::RequestContext;
use crate::response::ResponseSink;
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};

/// Writes the headers of an outgoing response.
pub trait HeaderWriter: Send {
    fn write_header(&mut self, headers: &mut HeaderMap);
}

/// Writes the body of an outgoing response.
#[async_trait]
pub trait BodyWriter: Send {
    /// Called once from `init_response`, before the action runs. Streaming writers use it to
    /// capture the sink.
    fn write_init(&mut self, _sink: &ResponseSink) -> Result<(), BoxError> {
        Ok(())
    }

    /// Writes the body. Writers that set headers must do so before writing `status`.
    async fn write_body(&mut self, sink: &ResponseSink, req: &RequestContext, status: StatusCode) -> Result<(), BoxError>;
}

/// Combines an optional header writer, an optional body writer and an optional status.
///
/// When `write_response` runs, the header writer goes first. Then the body writer is given the
/// status, `200 OK` when none is set. Without a body writer, a set status is written on its own.
#[derive(Debug)]
pub struct ResponseWriter<H = (), B = ()> {
    pub header: Option<H>,
    pub body: Option<B>,
    pub status: Option<StatusCode>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<H, B> Default for ResponseWriter<H, B> {
    fn default() -> Self {
        Self { header: None, body: None, status: None }
    }
}

impl<H, B> ResponseWriter<H, B> {
    pub fn with_header<H2: HeaderWriter>(self, header: H2) -> ResponseWriter<H2, B> {
        ResponseWriter { header: Some(header), body: self.body, status: self.status }
    }

    pub fn with_body<B2: BodyWriter>(self, body: B2) -> ResponseWriter<H, B2> {
        ResponseWriter { header: self.header, body: Some(body), status: self.status }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }
}

impl<H, B> ResponseWriter<H, B>
where
    H: HeaderWriter,
    B: BodyWriter,
{
    pub fn init_response(&mut self, sink: &ResponseSink) -> Result<(), BoxError> {
        match self.body.as_mut() {
            Some(body) => body.write_init(sink),
            None => Ok(()),
        }
    }

    pub async fn write_response(&mut self, sink: &ResponseSink, req: &RequestContext) -> Result<(), BoxError> {
        if let Some(header) = self.header.as_mut() {
            sink.with_headers(|headers| header.write_header(headers));
        }

        match (self.body.as_mut(), self.status) {
            (Some(body), status) => body.write_body(sink, req, status.unwrap_or(StatusCode::OK)).await,
            (None, Some(status)) => {
                sink.write_header(status);
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }
}

impl HeaderWriter for () {
    fn write_header(&mut self, _headers: &mut HeaderMap) {}
}

#[async_trait]
impl BodyWriter for () {
    async fn write_body(&mut self, _sink: &ResponseSink, _req: &RequestContext, _status: StatusCode) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<T: HeaderWriter + ?Sized> HeaderWriter for Box<T> {
    fn write_header(&mut self, headers: &mut HeaderMap) {
        (**self).write_header(headers);
    }
}

#[async_trait]
impl<T: BodyWriter + ?Sized> BodyWriter for Box<T> {
    fn write_init(&mut self, sink: &ResponseSink) -> Result<(), BoxError> {
        (**self).write_init(sink)
    }

    async fn write_body(&mut self, sink: &ResponseSink, req: &RequestContext, status: StatusCode) -> Result<(), BoxError> {
        (**self).write_body(sink, req, status).await
    }
}

impl<T: HeaderWriter> HeaderWriter for Vec<T> {
    fn write_header(&mut self, headers: &mut HeaderMap) {
        for writer in self.iter_mut() {
            writer.write_header(headers);
        }
    }
}

macro_rules! impl_header_writer_for_tuple {
    ($($param:ident)*) => {
        impl<$($param: HeaderWriter,)*> HeaderWriter for ($($param,)*) {
            #[allow(non_snake_case, reason = "tuple fields are bound by their type names")]
            fn write_header(&mut self, headers: &mut HeaderMap) {
                let ($($param,)*) = self;
                $($param.write_header(headers);)*
            }
        }
    };
}

impl_header_writer_for_tuple!(A B);
impl_header_writer_for_tuple!(A B C);
impl_header_writer_for_tuple!(A B C D);

#[cfg(test)]
mod tests {
    use super::{BodyWriter, HeaderWriter, ResponseWriter};
    use crate::error::BoxError;
    use crate::request::{PathParams, RequestContext};
    use crate::response::ResponseSink;
    use async_trait::async_trait;
    use http::{HeaderMap, HeaderValue, Request, StatusCode};

    struct Tag(&'static str);

    impl HeaderWriter for Tag {
        fn write_header(&mut self, headers: &mut HeaderMap) {
            headers.append("x-tag", HeaderValue::from_static(self.0));
        }
    }

    #[derive(Default)]
    struct Echo {
        initialised: bool,
        seen: Option<StatusCode>,
    }

    #[async_trait]
    impl BodyWriter for Echo {
        fn write_init(&mut self, _sink: &ResponseSink) -> Result<(), BoxError> {
            self.initialised = true;
            Ok(())
        }

        async fn write_body(&mut self, sink: &ResponseSink, _req: &RequestContext, status: StatusCode) -> Result<(), BoxError> {
            self.seen = Some(status);
            sink.write_header(status);
            sink.write(b"echo");
            Ok(())
        }
    }

    fn request() -> RequestContext {
        RequestContext::new(Request::new(String::new()), PathParams::empty())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn body_writer_defaults_to_ok() {
        let sink = ResponseSink::new();
        let mut writer = ResponseWriter::new().with_header(Tag("a")).with_body(Echo::default());

        writer.init_response(&sink).unwrap();
        writer.write_response(&sink, &request()).await.unwrap();

        let body = writer.body.as_ref().unwrap();
        assert!(body.initialised);
        assert_eq!(body.seen, Some(StatusCode::OK));

        let response = sink.take_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-tag").unwrap(), "a");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn status_is_handed_to_body_writer() {
        let sink = ResponseSink::new();
        let mut writer = ResponseWriter::new().with_body(Echo::default()).with_status(StatusCode::CREATED);

        writer.write_response(&sink, &request()).await.unwrap();

        assert_eq!(sink.status(), Some(StatusCode::CREATED));
        assert_eq!(sink.body(), "echo");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn status_without_body() {
        let sink = ResponseSink::new();
        let mut writer = ResponseWriter::new().with_header((Tag("a"), Tag("b"))).with_status(StatusCode::NO_CONTENT);

        writer.write_response(&sink, &request()).await.unwrap();

        let response = sink.take_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers().get_all("x-tag").iter().count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn nothing_configured_writes_nothing() {
        let sink = ResponseSink::new();
        let mut writer = ResponseWriter::new();

        writer.init_response(&sink).unwrap();
        writer.write_response(&sink, &request()).await.unwrap();

        assert!(!sink.is_committed());
    }
}
