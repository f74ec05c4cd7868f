//! Body readers and writers for the common content types.
//!
//! [`Json`], [`Xml`] and [`Form`] hold an `Option<T>`. Reading always decodes the request body and
//! replaces the value. Writing sets the content type and the status, then encodes the value; a
//! `None` value produces an empty body.
//!
//! Decoding failures are reported as [`Error::Read`], encoding failures as [`Error::Write`].

use crate::error::{BoxError, Error};
use crate::reader::BodyReader;
use crate::request::RequestContext;
use crate::response::ResponseSink;
use crate::writer::BodyWriter;
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_XML: &str = "application/xml; charset=utf-8";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded; charset=utf-8";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

fn start_body(sink: &ResponseSink, content_type: &'static str, status: StatusCode) {
    sink.set_header(CONTENT_TYPE, HeaderValue::from_static(content_type));
    sink.write_header(status);
}

macro_rules! value_holder {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name<T>(pub Option<T>);

        impl<T> $name<T> {
            pub fn new(value: T) -> Self {
                Self(Some(value))
            }

            pub fn value(&self) -> Option<&T> {
                self.0.as_ref()
            }

            pub fn into_inner(self) -> Option<T> {
                self.0
            }
        }

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self(None)
            }
        }
    };
}

value_holder!(
    /// A JSON request or response body. Encoded output ends with a newline.
    Json
);
value_holder!(
    /// An XML request or response body.
    Xml
);
value_holder!(
    /// A `application/x-www-form-urlencoded` request or response body.
    Form
);

#[async_trait]
impl<T: DeserializeOwned + Send> BodyReader for Json<T> {
    async fn read_body(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        let bytes = req.body().bytes().await.map_err(Error::read)?;
        self.0 = Some(serde_json::from_slice(&bytes).map_err(Error::read)?);
        Ok(())
    }
}

#[async_trait]
impl<T: Serialize + Send> BodyWriter for Json<T> {
    async fn write_body(&mut self, sink: &ResponseSink, _req: &RequestContext, status: StatusCode) -> Result<(), BoxError> {
        start_body(sink, CONTENT_TYPE_JSON, status);
        if let Some(value) = &self.0 {
            let mut buf = serde_json::to_vec(value).map_err(Error::write)?;
            buf.push(b'\n');
            sink.write(&buf);
        }
        Ok(())
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send> BodyReader for Xml<T> {
    async fn read_body(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        let bytes = req.body().bytes().await.map_err(Error::read)?;
        let text = std::str::from_utf8(&bytes).map_err(Error::read)?;
        self.0 = Some(quick_xml::de::from_str(text).map_err(Error::read)?);
        Ok(())
    }
}

#[async_trait]
impl<T: Serialize + Send> BodyWriter for Xml<T> {
    async fn write_body(&mut self, sink: &ResponseSink, _req: &RequestContext, status: StatusCode) -> Result<(), BoxError> {
        start_body(sink, CONTENT_TYPE_XML, status);
        if let Some(value) = &self.0 {
            let xml = quick_xml::se::to_string(value).map_err(Error::write)?;
            sink.write(xml.as_bytes());
        }
        Ok(())
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send> BodyReader for Form<T> {
    async fn read_body(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        let bytes = req.body().bytes().await.map_err(Error::read)?;
        self.0 = Some(serde_urlencoded::from_bytes(&bytes).map_err(Error::read)?);
        Ok(())
    }
}

#[async_trait]
impl<T: Serialize + Send> BodyWriter for Form<T> {
    async fn write_body(&mut self, sink: &ResponseSink, _req: &RequestContext, status: StatusCode) -> Result<(), BoxError> {
        start_body(sink, CONTENT_TYPE_FORM, status);
        if let Some(value) = &self.0 {
            let form = serde_urlencoded::to_string(value).map_err(Error::write)?;
            sink.write(form.as_bytes());
        }
        Ok(())
    }
}

/// A plain text response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Text(pub String);

#[async_trait]
impl BodyWriter for Text {
    async fn write_body(&mut self, sink: &ResponseSink, _req: &RequestContext, status: StatusCode) -> Result<(), BoxError> {
        start_body(sink, CONTENT_TYPE_TEXT, status);
        sink.write(self.0.as_bytes());
        Ok(())
    }
}
