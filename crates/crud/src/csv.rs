//! Streaming CSV responses.
//!
//! A [`Csv`] body writer drives a [`StreamWriter`]: the stream is opened on the response sink
//! during `init_response`, filled by the action, and flushed during `write_response`. Opening a
//! [`CsvWriter`] switches the sink to streaming, so the response head leaves with the first row and
//! the rows follow in chunks as the encoder's buffer fills.
//!
//! [`CsvWriter`] is the stock stream. It is a cheap handle, so the action keeps one clone to write
//! rows while the response writer holds another:
//!
//! ```
//! use micro_crud::csv::{Csv, CsvWriter};
//! use micro_crud::writer::ResponseWriter;
//!
//! let rows = CsvWriter::new(["id", "name"], "users.csv");
//! let writer = ResponseWriter::new().with_body(Csv(rows.clone()));
//! # drop(writer);
//! ```

use crate::error::{BoxError, Error};
use crate::request::RequestContext;
use crate::response::{ResponseSink, SinkWriter};
use crate::writer::BodyWriter;
use async_trait::async_trait;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const CONTENT_TYPE_CSV: &str = "text/csv";

/// A stream of response data, opened on a sink before it is written and flushed afterwards.
pub trait StreamWriter: Send {
    /// Prepares the stream to write into `sink`.
    fn open(&mut self, sink: &ResponseSink);

    /// Writes any buffered data to the sink.
    fn flush(&mut self) -> Result<(), BoxError>;
}

impl<T: StreamWriter + ?Sized> StreamWriter for Box<T> {
    fn open(&mut self, sink: &ResponseSink) {
        (**self).open(sink);
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        (**self).flush()
    }
}

/// A body writer backed by a [`StreamWriter`].
#[derive(Debug, Clone, Default)]
pub struct Csv<S>(pub S);

#[async_trait]
impl<S: StreamWriter> BodyWriter for Csv<S> {
    fn write_init(&mut self, sink: &ResponseSink) -> Result<(), BoxError> {
        self.0.open(sink);
        Ok(())
    }

    async fn write_body(&mut self, _sink: &ResponseSink, _req: &RequestContext, _status: StatusCode) -> Result<(), BoxError> {
        self.0.flush().map_err(Error::write)?;
        Ok(())
    }
}

/// Writes rows as CSV into the response.
///
/// The headers, the status and the header row are written together with the first row, so the
/// file name and the status may be changed until then.
#[derive(Clone, Default)]
pub struct CsvWriter {
    inner: Arc<Mutex<CsvState>>,
}

struct CsvState {
    header: Vec<String>,
    file_name: String,
    status: StatusCode,
    sink: Option<ResponseSink>,
    csv: Option<::csv::Writer<SinkWriter>>,
}

impl Default for CsvState {
    fn default() -> Self {
        Self { header: Vec::new(), file_name: String::new(), status: StatusCode::OK, sink: None, csv: None }
    }
}

impl fmt::Debug for CsvWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("CsvWriter")
            .field("header", &state.header)
            .field("file_name", &state.file_name)
            .field("status", &state.status)
            .field("started", &state.csv.is_some())
            .finish_non_exhaustive()
    }
}

impl CsvWriter {
    pub fn new<I, T>(header: I, file_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let writer = Self::default();
        {
            let mut state = writer.state();
            state.header = header.into_iter().map(Into::into).collect();
            state.file_name = file_name.into();
        }
        writer
    }

    fn state(&self) -> MutexGuard<'_, CsvState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_header<I, T>(&self, header: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.state().header = header.into_iter().map(Into::into).collect();
    }

    pub fn set_file_name(&self, file_name: impl Into<String>) {
        self.state().file_name = file_name.into();
    }

    pub fn set_status(&self, status: StatusCode) {
        self.state().status = status;
    }

    /// Writes one row, preceded by the response headers and the header row on the first call.
    pub fn write_row<I, T>(&self, row: I) -> Result<(), BoxError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut state = self.state();
        let state = &mut *state;

        if state.csv.is_none() {
            let sink = state.sink.as_ref().ok_or_else(|| Error::write("csv stream is not open"))?;
            let disposition = HeaderValue::try_from(format!("attachment; filename={}", state.file_name)).map_err(Error::write)?;

            sink.set_header(CONTENT_DISPOSITION, disposition);
            sink.set_header(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_CSV));
            sink.write_header(state.status);

            let mut csv = ::csv::WriterBuilder::new().terminator(::csv::Terminator::Any(b'\n')).from_writer(sink.writer());
            csv.write_record(&state.header).map_err(Error::write)?;
            state.csv = Some(csv);
        }

        if let Some(csv) = state.csv.as_mut() {
            csv.write_record(row).map_err(Error::write)?;
        }
        Ok(())
    }
}

impl StreamWriter for CsvWriter {
    fn open(&mut self, sink: &ResponseSink) {
        sink.stream();
        self.state().sink = Some(sink.clone());
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        if let Some(csv) = self.state().csv.as_mut() {
            csv.flush()?;
        }
        Ok(())
    }
}
