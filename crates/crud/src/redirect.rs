use crate::error::BoxError;
use crate::request::RequestContext;
use crate::response::ResponseSink;
use crate::writer::BodyWriter;
use async_trait::async_trait;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Method, StatusCode};
use url::{ParseError, Url};

/// Redirects the client to `url` with the redirect's own `status`.
///
/// A relative `url` is resolved against the path of the request. `GET` and `HEAD` requests that
/// have no content type yet are answered as HTML, and `GET` also gets a short body linking to the
/// new location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
    pub status: StatusCode,
}

impl Redirect {
    pub fn new(url: impl Into<String>, status: StatusCode) -> Self {
        Self { url: url.into(), status }
    }

    pub fn found(url: impl Into<String>) -> Self {
        Self::new(url, StatusCode::FOUND)
    }

    pub fn see_other(url: impl Into<String>) -> Self {
        Self::new(url, StatusCode::SEE_OTHER)
    }
}

#[async_trait]
impl BodyWriter for Redirect {
    async fn write_body(&mut self, sink: &ResponseSink, req: &RequestContext, _status: StatusCode) -> Result<(), BoxError> {
        let location = resolve(&self.url, req.uri().path())?;
        sink.set_header(LOCATION, HeaderValue::try_from(location.as_str())?);

        let method = req.method().clone();
        let has_content_type = sink.with_headers(|h| h.contains_key(CONTENT_TYPE));
        let html = !has_content_type && (method == Method::GET || method == Method::HEAD);
        if html {
            sink.set_header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        }

        sink.write_header(self.status);

        if html && method == Method::GET {
            let reason = self.status.canonical_reason().unwrap_or_default();
            sink.write(format!("<a href=\"{}\">{}</a>.\n\n", escape_html(&location), reason).as_bytes());
        }
        Ok(())
    }
}

/// Resolves `url` the way a browser would against the path of the current request.
///
/// Absolute and scheme-relative urls are kept, everything else becomes a rooted, percent-encoded
/// path. An empty `url` points at the directory of `request_path`.
fn resolve(url: &str, request_path: &str) -> Result<String, ParseError> {
    if let Ok(absolute) = Url::parse(url) {
        return Ok(absolute.into());
    }

    let base = Url::parse(&format!("http://localhost{request_path}"))?;
    let options = Url::options().base_url(Some(&base));

    if url.starts_with("//") {
        let joined = options.parse(url)?;
        return Ok(joined.as_str().strip_prefix("http:").unwrap_or(joined.as_str()).to_owned());
    }

    let rooted = if url.starts_with('/') {
        url.to_owned()
    } else {
        let dir = request_path.rfind('/').map_or("/", |i| &request_path[..=i]);
        format!("{dir}{url}")
    };
    let joined = options.parse(&rooted)?;

    let mut location = joined.path().to_owned();
    if rooted.split(['?', '#']).next().is_some_and(|path| path.ends_with('/')) && !location.ends_with('/') {
        location.push('/');
    }
    if let Some(query) = joined.query() {
        location.push('?');
        location.push_str(query);
    }
    if let Some(fragment) = joined.fragment() {
        location.push('#');
        location.push_str(fragment);
    }
    Ok(location)
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
