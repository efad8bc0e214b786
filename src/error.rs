//! Error and Result module.
use std::error::Error as StdError;
use std::fmt;

/// Result type often returned from methods that can have `hearth` errors.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// Represents errors that can occur handling HTTP connections.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    Parse(Parse),
    User(User),
    /// The connection closed before a message was complete.
    IncompleteMessage,
    /// An `io::Error` occurred while reading or writing a stream.
    Io,
    /// The transport refused bytes mid-response.
    Write,
    /// Error creating the server listener.
    Listen,
    /// Error accepting a connection.
    Accept,
}

#[derive(Debug)]
pub(crate) enum Parse {
    RequestLine,
    Version,
    Header,
    Fold,
    Uri,
    Host,
}

#[derive(Debug)]
pub(crate) enum User {
    /// A response mutator was called after the headers went out; carries
    /// the name of the offending operation.
    HeadersSent(&'static str),
    /// A route mask failed to compile.
    Mask,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    /// Returns true if this was a parse error (malformed request line or
    /// header block, missing Host, bad URI).
    pub fn is_parse(&self) -> bool {
        matches!(self.inner.kind, Kind::Parse(_))
    }

    /// Returns true if this error was caused by user code.
    pub fn is_user(&self) -> bool {
        matches!(self.inner.kind, Kind::User(_))
    }

    /// Returns true if the transport refused bytes mid-response.
    pub fn is_write(&self) -> bool {
        matches!(self.inner.kind, Kind::Write)
    }

    /// Returns true if the connection closed before a message completed.
    pub fn is_incomplete_message(&self) -> bool {
        matches!(self.inner.kind, Kind::IncompleteMessage)
    }

    /// Consumes the error, returning its cause.
    pub fn into_cause(self) -> Option<Cause> {
        self.inner.cause
    }

    pub(crate) fn new_request_line() -> Error {
        Error::new(Kind::Parse(Parse::RequestLine))
    }

    pub(crate) fn new_version() -> Error {
        Error::new(Kind::Parse(Parse::Version))
    }

    pub(crate) fn new_header() -> Error {
        Error::new(Kind::Parse(Parse::Header))
    }

    pub(crate) fn new_fold() -> Error {
        Error::new(Kind::Parse(Parse::Fold))
    }

    pub(crate) fn new_uri<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Parse(Parse::Uri)).with(cause)
    }

    pub(crate) fn new_host() -> Error {
        Error::new(Kind::Parse(Parse::Host))
    }

    pub(crate) fn new_incomplete() -> Error {
        Error::new(Kind::IncompleteMessage)
    }

    pub(crate) fn new_io(cause: std::io::Error) -> Error {
        Error::new(Kind::Io).with(cause)
    }

    pub(crate) fn new_write() -> Error {
        Error::new(Kind::Write)
    }

    pub(crate) fn new_listen<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Listen).with(cause)
    }

    pub(crate) fn new_accept<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::Accept).with(cause)
    }

    pub(crate) fn new_user_headers_sent(what: &'static str) -> Error {
        Error::new(Kind::User(User::HeadersSent(what)))
    }

    pub(crate) fn new_mask<E: Into<Cause>>(cause: E) -> Error {
        Error::new(Kind::User(User::Mask)).with(cause)
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::Parse(Parse::RequestLine) => "invalid request line parsed",
            Kind::Parse(Parse::Version) => "invalid HTTP version parsed",
            Kind::Parse(Parse::Header) => "invalid HTTP header parsed",
            Kind::Parse(Parse::Fold) => "header continuation with no preceding field",
            Kind::Parse(Parse::Uri) => "invalid URI",
            Kind::Parse(Parse::Host) => "missing Host header on an HTTP/1.1 request",
            Kind::IncompleteMessage => "connection closed before message completed",
            Kind::Io => "connection error",
            Kind::Write => "error writing a response to the connection",
            Kind::Listen => "error creating server listener",
            Kind::Accept => "error accepting connection",
            Kind::User(User::HeadersSent(..)) => "response modified after sending the headers",
            Kind::User(User::Mask) => "invalid route mask",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            Kind::User(User::HeadersSent(what)) => write!(
                f,
                "{}: cannot modify a response after sending the headers",
                what
            )?,
            _ => f.write_str(self.description())?,
        }
        if let Some(ref cause) = self.inner.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_tuple("hearth::Error");
        builder.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            builder.field(cause);
        }
        builder.finish()
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_predicates() {
        assert!(Error::new_header().is_parse());
        assert!(Error::new_write().is_write());
        assert!(Error::new_user_headers_sent("status").is_user());
        assert!(Error::new_incomplete().is_incomplete_message());
        assert!(!Error::new_write().is_parse());
    }

    #[test]
    fn test_display_names_the_operation() {
        let err = Error::new_user_headers_sent("set(header)");
        let text = err.to_string();
        assert!(text.starts_with("set(header): "), "got {:?}", text);
    }

    #[test]
    fn test_size_of() {
        assert_eq!(
            std::mem::size_of::<Error>(),
            std::mem::size_of::<usize>(),
        );
    }
}
