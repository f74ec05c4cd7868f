//! The response side of a request: the [`ResponseSink`] handlers write into, and the
//! [`ResponseBody`] handed back to the host server.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body::Body as HttpBody;
use http_body::{Frame, SizeHint};
use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::Notify;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

/// Destination of an outgoing response.
///
/// Writing follows the usual order: mutate headers, write the status line with
/// [`write_header`](ResponseSink::write_header), then write the body. Header changes made after the
/// status has been written do not reach the response. Writing body bytes before any status writes
/// `200 OK` implicitly.
///
/// The body is buffered until the response is taken, unless [`stream`](ResponseSink::stream) has
/// been called: then the head is released as soon as the status is written and every later write
/// is sent to the client as its own chunk.
///
/// The sink is a cheap handle; clones write into the same response, which lets streaming writers
/// capture it while the response is being initialised and use it later.
#[derive(Debug, Clone, Default)]
pub struct ResponseSink {
    inner: Arc<Mutex<SinkState>>,
    head_released: Arc<Notify>,
}

#[derive(Debug, Default)]
struct SinkState {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
    stream: Option<BodyChannel>,
}

#[derive(Debug)]
struct BodyChannel {
    sender: Option<UnboundedSender<Bytes>>,
    receiver: Option<UnboundedReceiver<Bytes>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gives `f` mutable access to the response headers.
    pub fn with_headers<R>(&self, f: impl FnOnce(&mut HeaderMap) -> R) -> R {
        f(&mut self.state().headers)
    }

    /// Replaces any existing values of the header `name`.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.state().headers.insert(name, value);
    }

    /// Adds a value to the header `name`, keeping the existing ones.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.state().headers.append(name, value);
    }

    /// A snapshot of the headers as they would be sent.
    pub fn headers(&self) -> HeaderMap {
        let state = self.state();
        match &state.committed {
            Some((_, headers)) => headers.clone(),
            None => state.headers.clone(),
        }
    }

    /// Writes the status line. Only the first call takes effect.
    pub fn write_header(&self, status: StatusCode) {
        let mut state = self.state();
        if let Some((committed, _)) = &state.committed {
            debug!(%committed, ignored = %status, "superfluous write_header call");
            return;
        }
        self.commit(&mut state, status);
    }

    fn commit(&self, state: &mut SinkState, status: StatusCode) {
        let headers = state.headers.clone();
        state.committed = Some((status, headers));
        if state.stream.is_some() {
            self.head_released.notify_one();
        }
    }

    /// Appends bytes to the body, writing `200 OK` first if no status has been written.
    pub fn write(&self, bytes: &[u8]) {
        let mut state = self.state();
        let state = &mut *state;
        if state.committed.is_none() {
            self.commit(state, StatusCode::OK);
        }

        match state.stream.as_ref() {
            Some(BodyChannel { sender: Some(sender), .. }) => {
                if sender.send(Bytes::copy_from_slice(bytes)).is_err() {
                    debug!(len = bytes.len(), "response stream closed by the client, dropping chunk");
                }
            }
            Some(BodyChannel { sender: None, .. }) => debug!(len = bytes.len(), "write after finish, dropping chunk"),
            None => state.body.extend_from_slice(bytes),
        }
    }

    /// Switches the body to streaming.
    ///
    /// Bytes already buffered become the first chunk. Calling it again has no effect.
    pub fn stream(&self) {
        let mut state = self.state();
        if state.stream.is_some() {
            return;
        }

        let (sender, receiver) = unbounded_channel();
        if !state.body.is_empty() && sender.send(state.body.split().freeze()).is_err() {
            debug!("response stream closed before it was opened");
        }
        state.stream = Some(BodyChannel { sender: Some(sender), receiver: Some(receiver) });
        if state.committed.is_some() {
            self.head_released.notify_one();
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state().stream.is_some()
    }

    /// Ends a streamed body; later writes are dropped.
    pub fn finish(&self) {
        if let Some(channel) = self.state().stream.as_mut() {
            channel.sender = None;
        }
    }

    /// Resolves once a streaming sink has written its status.
    pub(crate) async fn head_released(&self) {
        self.head_released.notified().await;
    }

    /// The written status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.state().committed.as_ref().map(|(status, _)| *status)
    }

    pub fn is_committed(&self) -> bool {
        self.state().committed.is_some()
    }

    /// A copy of the buffered body. Empty once the sink streams.
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state().body)
    }

    /// An [`io::Write`] adapter over the body, for encoders that write to a stream.
    pub fn writer(&self) -> SinkWriter {
        SinkWriter { sink: self.clone() }
    }

    /// Moves everything written so far into a response, leaving the sink empty.
    ///
    /// A sink that was never written to becomes an empty `200 OK`. A streaming sink hands over the
    /// receiving end of its body; writes made afterwards still reach the client until
    /// [`finish`](ResponseSink::finish) is called or the last handle is dropped.
    pub fn take_response(&self) -> Response<ResponseBody> {
        let mut state = self.state();
        let live_headers = std::mem::take(&mut state.headers);
        let (status, headers) = state.committed.take().unwrap_or((StatusCode::OK, live_headers));
        let body = match state.stream.as_mut().and_then(|channel| channel.receiver.take()) {
            Some(receiver) => ResponseBody::stream(receiver),
            None => ResponseBody::from(std::mem::take(&mut state.body).freeze()),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// [`io::Write`] over a [`ResponseSink`] body.
#[derive(Debug, Clone)]
pub struct SinkWriter {
    sink: ResponseSink,
}

impl io::Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The body of a response produced by a [`ResponseSink`].
#[derive(Debug)]
pub struct ResponseBody {
    inner: Kind,
}

#[derive(Debug)]
enum Kind {
    Once(Option<Bytes>),
    Stream(UnboundedReceiver<Bytes>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self { inner: Kind::Once(Some(bytes)) } }
    }

    /// A body that yields each received chunk as a frame and ends when every sender is gone.
    pub fn stream(receiver: UnboundedReceiver<Bytes>) -> Self {
        Self { inner: Kind::Stream(receiver) }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::once(bytes)
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::once(Bytes::from(value))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::once(Bytes::from_static(value.as_bytes()))
    }
}

impl From<()> for ResponseBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Once(bytes) => Poll::Ready(bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(receiver) => receiver.poll_recv(cx).map(|chunk| chunk.map(|bytes| Ok(Frame::data(bytes)))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(bytes) => bytes.is_none(),
            Kind::Stream(receiver) => receiver.is_closed() && receiver.is_empty(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(_) => SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ResponseBody, ResponseSink};
    use bytes::Bytes;
    use http::header::CONTENT_TYPE;
    use http::{HeaderValue, StatusCode};
    use http_body::Body as HttpBody;
    use http_body_util::BodyExt;
    use std::io::Write;

    fn check_send_sync<T: Send + Sync>() {}

    #[test]
    fn is_send_sync() {
        check_send_sync::<ResponseSink>();
        check_send_sync::<ResponseBody>();
    }

    #[test]
    fn headers_after_status_are_dropped() {
        let sink = ResponseSink::new();
        sink.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        sink.write_header(StatusCode::CREATED);
        sink.set_header(http::header::LOCATION, HeaderValue::from_static("/late"));

        let headers = sink.headers();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert!(headers.get(http::header::LOCATION).is_none());

        let response = sink.take_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get(http::header::LOCATION).is_none());
    }

    #[test]
    fn first_status_wins() {
        let sink = ResponseSink::new();
        sink.write_header(StatusCode::ACCEPTED);
        sink.write_header(StatusCode::NOT_FOUND);

        assert_eq!(sink.status(), Some(StatusCode::ACCEPTED));
    }

    #[test]
    fn body_write_implies_ok() {
        let sink = ResponseSink::new();
        assert!(!sink.is_committed());

        write!(sink.writer(), "hello {}", "world").unwrap();

        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.body(), "hello world");
    }

    #[test]
    fn untouched_sink_is_empty_ok() {
        let sink = ResponseSink::new();
        sink.set_header(CONTENT_TYPE, HeaderValue::from_static("text/csv"));

        let response = sink.take_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/csv");
        assert!(response.body().is_end_stream());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn once_body_yields_one_frame() {
        let mut body = ResponseBody::from(String::from("Hello world"));

        assert_eq!(body.size_hint().exact(), Some(11));
        assert!(!body.is_end_stream());

        let bytes = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(bytes, Bytes::from("Hello world"));

        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn streaming_sink_sends_each_write_as_a_frame() {
        let sink = ResponseSink::new();
        sink.write(b"buffered ");
        sink.stream();
        assert!(sink.is_streaming());

        let mut body = sink.take_response().into_body();
        assert!(body.size_hint().exact().is_none());

        sink.write(b"first");
        sink.write(b"second");
        sink.finish();
        sink.write(b"dropped");

        let mut frames = Vec::new();
        while let Some(frame) = body.frame().await {
            frames.push(frame.unwrap().into_data().unwrap());
        }
        assert_eq!(frames, ["buffered ", "first", "second"]);
        assert!(body.is_end_stream());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn streaming_head_is_released_by_status() {
        let sink = ResponseSink::new();
        sink.stream();
        sink.set_header(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        sink.write_header(StatusCode::ACCEPTED);

        sink.head_released().await;

        let response = sink.take_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/csv");
        assert!(sink.body().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn empty_body() {
        let mut body = ResponseBody::from("");

        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(body.frame().await.is_none());
    }
}
