//! Crate-wide error type.
//!
//! Hand-rolled rather than derive-macro generated, matching the style the
//! teacher crate uses for its own `OsrmRouteError`/`OsrmDataError`: a plain
//! enum, a `Display` impl, and a blanket `std::error::Error` impl.

use std::fmt;

/// A stable machine-readable code paired with every surfaced error, e.g.
/// `INFEASIBLE_TIME_WINDOWS`. Callers may match on this without depending on
/// message text.
pub type Code = &'static str;

#[derive(Debug, Clone)]
pub enum Error {
    /// Missing city, POI, tour, version, or language.
    NotFound { code: Code, message: String },
    /// Malformed input: unknown language code, bad date, unrecognized mode,
    /// out-of-range coordinates.
    Invalid { code: Code, message: String },
    /// The CP model (and, on fallback, the Greedy Sequencer) produced no
    /// legal assignment. Carries up to the first three violated constraint
    /// names per §7 of the spec.
    Infeasible {
        code: Code,
        message: String,
        violated_constraints: Vec<String>,
    },
    /// A port call (LLM or GeoProvider) failed with a transient status
    /// (429/529, connection/timeout) and retries were exhausted.
    ExternalUnavailable { code: Code, message: String },
    /// A port call failed with a non-retryable status (4xx other than
    /// transient, bad credentials, quota exhausted, unparseable response).
    ExternalPermanent { code: Code, message: String },
    /// A concurrent edit was detected; the per-tour lock was already held.
    Conflict { code: Code, message: String },
    /// Disk read/write failure. Any partial write for the current operation
    /// is abandoned by the caller.
    Io { code: Code, message: String },
}

impl Error {
    pub fn not_found(code: Code, message: impl Into<String>) -> Self {
        Error::NotFound { code, message: message.into() }
    }

    pub fn invalid(code: Code, message: impl Into<String>) -> Self {
        Error::Invalid { code, message: message.into() }
    }

    pub fn infeasible(code: Code, message: impl Into<String>, violated_constraints: Vec<String>) -> Self {
        Error::Infeasible {
            code,
            message: message.into(),
            violated_constraints: violated_constraints.into_iter().take(3).collect(),
        }
    }

    pub fn external_unavailable(code: Code, message: impl Into<String>) -> Self {
        Error::ExternalUnavailable { code, message: message.into() }
    }

    pub fn external_permanent(code: Code, message: impl Into<String>) -> Self {
        Error::ExternalPermanent { code, message: message.into() }
    }

    pub fn conflict(code: Code, message: impl Into<String>) -> Self {
        Error::Conflict { code, message: message.into() }
    }

    pub fn io(code: Code, message: impl Into<String>) -> Self {
        Error::Io { code, message: message.into() }
    }

    /// The stable machine code for this error, independent of its message.
    pub fn code(&self) -> Code {
        match self {
            Error::NotFound { code, .. }
            | Error::Invalid { code, .. }
            | Error::Infeasible { code, .. }
            | Error::ExternalUnavailable { code, .. }
            | Error::ExternalPermanent { code, .. }
            | Error::Conflict { code, .. }
            | Error::Io { code, .. } => code,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound { code, message } => write!(f, "[{code}] {message}"),
            Error::Invalid { code, message } => write!(f, "[{code}] {message}"),
            Error::Infeasible { code, message, violated_constraints } => {
                write!(f, "[{code}] {message}")?;
                if !violated_constraints.is_empty() {
                    write!(f, " (violated: {})", violated_constraints.join(", "))?;
                }
                Ok(())
            }
            Error::ExternalUnavailable { code, message } => write!(f, "[{code}] {message}"),
            Error::ExternalPermanent { code, message } => write!(f, "[{code}] {message}"),
            Error::Conflict { code, message } => write!(f, "[{code}] {message}"),
            Error::Io { code, message } => write!(f, "[{code}] {message}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io("IO_FAILURE", err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::invalid("MALFORMED_JSON", err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a port call: either a transient failure (retry with backoff)
/// or a permanent one (surface immediately). Ports report this directly
/// instead of the core trying to infer it from an HTTP status it never
/// sees (the core treats HTTP/LLM transport as opaque, per spec §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFailureKind {
    Transient,
    Permanent,
}

/// A typed failure from a port implementation (`GeoProvider` or
/// `Selector`), turned into the corresponding crate `Error` by the caller.
#[derive(Debug, Clone)]
pub struct PortError {
    pub kind: PortFailureKind,
    pub message: String,
}

impl PortError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: PortFailureKind::Transient, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { kind: PortFailureKind::Permanent, message: message.into() }
    }

    pub fn into_error(self, exhausted_retries: bool) -> Error {
        match self.kind {
            PortFailureKind::Transient if exhausted_retries => {
                Error::external_unavailable("EXTERNAL_UNAVAILABLE", self.message)
            }
            PortFailureKind::Transient => {
                Error::external_unavailable("EXTERNAL_TRANSIENT", self.message)
            }
            PortFailureKind::Permanent => {
                Error::external_permanent("EXTERNAL_PERMANENT", self.message)
            }
        }
    }
}
