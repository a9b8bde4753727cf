use std::fmt;

/// The five-way failure taxonomy the rest of the crate reports through.
///
/// `Validation` and `NotFound` are caller mistakes; `Transient` is retried or
/// ignored by the caller; `CorpusIntegrity` marks an invariant violation that
/// the offending layer recovered from conservatively; `Fatal` means the job
/// that hit it cannot continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Transient,
    CorpusIntegrity,
    Fatal,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, context)
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context)
    }

    pub fn transient(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Transient, context)
    }

    pub fn corpus_integrity(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::CorpusIntegrity, context)
    }

    pub fn fatal(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Fatal, context)
    }

    pub fn cancelled() -> Self {
        Error::new(ErrorKind::Transient, "cancelled")
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient)
    }

    /// User-facing text, delimited so the job runtime can lift it out of a
    /// longer context string without guessing where it starts.
    pub fn user_message(&self) -> String {
        format!("[[{}]]", self.context)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error { kind: ErrorKind::Fatal, context: err.to_string() }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error { kind: ErrorKind::CorpusIntegrity, context: err.to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error { kind: ErrorKind::Transient, context: format!("json: {}", err) }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error { kind: ErrorKind::Transient, context: format!("xml: {}", err) }
    }
}

pub type Result<T> = std::result::Result<T, Error>;