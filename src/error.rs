//! Error taxonomy for the launcher core (spec §7).
//!
//! A small `Fail` enum carries the classification, and a named struct wraps
//! it in a `Context` so a cause chain can be attached with `.context(...)`.

use std::fmt::{self, Display};
use std::path::PathBuf;

use failure::{Backtrace, Context, Fail};

pub type Result<T> = std::result::Result<T, failure::Error>;

/// One entry per row of the error taxonomy table in spec §7.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "could not read {}", _0)]
    File(PathBuf),

    #[fail(display = "failed to parse {}: {}", _0, _1)]
    Parse(PathBuf, String),

    #[fail(display = "package exceeds size limit: {}", _0)]
    Size(String),

    #[fail(display = "undefined variable '{}'", _0)]
    UndefinedVariable(String),

    #[fail(display = "cyclic reference detected at '{}'", _0)]
    CyclicReference(String),

    #[fail(display = "depth exceeded resolving '{}' (max {})", _0, _1)]
    DepthExceeded(String, usize),

    #[fail(display = "patch dependency error: {}", _0)]
    Dependency(String),

    #[fail(display = "circular patch dependency: {}", _0)]
    CircularDependency(String),

    #[fail(display = "patch '{}' failed on {} at '{}': {}", patch, target, path, reason)]
    Patch {
        patch: String,
        target: String,
        path: String,
        reason: String,
    },

    #[fail(display = "schema violation at {}: {}", _0, _1)]
    Schema(String, String),

    #[fail(display = "validation error: {}", _0)]
    ValidationSemantic(String),

    #[fail(display = "{} build cancelled", _0)]
    Cancelled(String),
}

/// Whether an `ErrorKind` is fatal to the stage that produced it.
///
/// Per §7: File, Parse (on critical files) and Size are always critical.
/// Everything else from the loader's perspective is a warning; the other
/// kinds (`Variable`, `Dependency`, `Patch`, `Schema`, `ValidationSemantic`)
/// are fatal *in the stage that owns them* (resolver/processor/validator)
/// but are only ever constructed there, never accumulated by the loader.
pub fn is_critical_error(kind: &ErrorKind) -> bool {
    matches!(kind, ErrorKind::File(_) | ErrorKind::Parse(_, _) | ErrorKind::Size(_))
}

pub fn is_warning(kind: &ErrorKind) -> bool {
    !is_critical_error(kind)
}

#[derive(Debug)]
pub struct KurelError {
    inner: Context<ErrorKind>,
}

impl Fail for KurelError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for KurelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl KurelError {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }
}

impl From<ErrorKind> for KurelError {
    fn from(kind: ErrorKind) -> KurelError {
        KurelError { inner: Context::new(kind) }
    }
}

impl From<Context<ErrorKind>> for KurelError {
    fn from(inner: Context<ErrorKind>) -> KurelError {
        KurelError { inner }
    }
}
