use thiserror::Error;

/// The boxed error carried through the handler lifecycle.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the built-in request readers and response writers.
///
/// `Read` and `Write` tag which side of the request/response boundary failed and keep the
/// original cause reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("{source}")]
    Read { source: BoxError },

    #[error("{source}")]
    Write { source: BoxError },

    #[error("micro-crud: template {name:?} not found")]
    NoTemplate { name: String },
}

impl Error {
    pub fn read<E: Into<BoxError>>(e: E) -> Self {
        Self::Read { source: e.into() }
    }

    pub fn write<E: Into<BoxError>>(e: E) -> Self {
        Self::Write { source: e.into() }
    }

    pub fn no_template<S: ToString>(name: S) -> Self {
        Self::NoTemplate { name: name.to_string() }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}
