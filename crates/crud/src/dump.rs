use crate::error::{BoxError, Error};
use crate::reader::BodyReader;
use crate::request::RequestContext;
use async_trait::async_trait;
use http::header::HOST;

/// Captures the incoming request in its HTTP/1 wire form, header names in canonical case.
///
/// With `include_body` set the body is read, appended to the dump and put back, so readers
/// running after this one still see it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDump {
    pub include_body: bool,
    pub dump: Vec<u8>,
}

impl RequestDump {
    pub fn new(include_body: bool) -> Self {
        Self { include_body, dump: Vec::new() }
    }
}

#[async_trait]
impl BodyReader for RequestDump {
    async fn read_body(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        let uri = req.uri();
        let target = uri.path_and_query().map_or("/", |pq| pq.as_str());

        let mut dump = format!("{} {} {:?}\r\n", req.method(), target, req.version()).into_bytes();

        let host = uri.authority().map(|a| a.as_str()).or_else(|| req.headers().get(HOST).and_then(|h| h.to_str().ok()));
        if let Some(host) = host {
            dump.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
        }

        for (name, value) in req.headers() {
            if *name == HOST {
                continue;
            }
            dump.extend_from_slice(canonical_name(name.as_str()).as_bytes());
            dump.extend_from_slice(b": ");
            dump.extend_from_slice(value.as_bytes());
            dump.extend_from_slice(b"\r\n");
        }
        dump.extend_from_slice(b"\r\n");

        if self.include_body {
            let body = req.body().bytes().await.map_err(Error::read)?;
            dump.extend_from_slice(&body);
            req.body().restore(body).await;
        }

        self.dump = dump;
        Ok(())
    }
}

/// `content-type` becomes `Content-Type`.
fn canonical_name(name: &str) -> String {
    let mut canonical = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        canonical.push(if upper { c.to_ascii_uppercase() } else { c });
        upper = c == '-';
    }
    canonical
}

#[cfg(test)]
mod tests {
    use super::{RequestDump, canonical_name};
    use crate::reader::BodyReader;
    use crate::request::{PathParams, RequestContext};
    use http::{Method, Request, Version};

    fn request() -> RequestContext {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users?page=2")
            .header("host", "example.com")
            .header("content-type", "text/plain")
            .body(String::from("hello"))
            .unwrap();
        RequestContext::new(request, PathParams::empty())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn dump_head_only() {
        let req = request();
        let mut dump = RequestDump::new(false);

        dump.read_body(&req).await.unwrap();

        assert_eq!(
            String::from_utf8(dump.dump).unwrap(),
            "POST /users?page=2 HTTP/1.1\r\nHost: example.com\r\nContent-Type: text/plain\r\n\r\n"
        );
        assert!(req.body().can_consume().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn dump_uses_request_version() {
        let request = Request::builder().uri("/").version(Version::HTTP_10).header("x-request-id", "7").body(String::new()).unwrap();
        let req = RequestContext::new(request, PathParams::empty());
        let mut dump = RequestDump::new(false);

        dump.read_body(&req).await.unwrap();

        assert_eq!(String::from_utf8(dump.dump).unwrap(), "GET / HTTP/1.0\r\nX-Request-Id: 7\r\n\r\n");
    }

    #[test]
    fn header_names_are_canonical() {
        assert_eq!(canonical_name("content-type"), "Content-Type");
        assert_eq!(canonical_name("x-forwarded-for"), "X-Forwarded-For");
        assert_eq!(canonical_name("etag"), "Etag");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn dump_with_body_keeps_body_readable() {
        let req = request();
        let mut dump = RequestDump::new(true);

        dump.read_body(&req).await.unwrap();

        assert!(String::from_utf8(dump.dump).unwrap().ends_with("\r\n\r\nhello"));
        assert_eq!(req.body().bytes().await.unwrap(), "hello");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn consumed_body_fails() {
        let req = request();
        req.body().bytes().await.unwrap();

        let err = RequestDump::new(true).read_body(&req).await.unwrap_err();

        assert!(err.downcast_ref::<crate::Error>().unwrap().is_read());
    }
}
