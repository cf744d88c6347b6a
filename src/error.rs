//! Crate-wide error taxonomy.
//!
//! The family drivers this crate generalizes were built against a closed
//! status set that every operation collapses to; this is its Rust expression.
//! `Success`/`Done` are not variants here — they are `Ok(())`/`Ok(true)`
//! at call sites, since idiomatic Rust signals success through `Result`.

/// Crate-wide error type. Variants mirror the session/parser status taxonomy;
/// callers are expected to match on the variant, not the message text.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The requested capability isn't implemented by this family, or the
    /// device itself reported the command as unsupported.
    #[error("operation not supported by this family or device")]
    Unsupported,

    /// A caller-supplied argument was malformed (e.g. wrong fingerprint
    /// length in `set_fingerprint`).
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    /// Allocation or table capacity exceeded (e.g. gas-mix table overflow).
    #[error("capacity exceeded: {0}")]
    NoMemory(String),

    /// The underlying channel reported an I/O failure.
    #[error("channel I/O error: {0}")]
    Io(String),

    /// A channel read did not complete within its deadline.
    #[error("timed out waiting for the device")]
    Timeout,

    /// The wire framing or response shape was wrong: bad echo, bad trailer,
    /// bad checksum, unexpected header byte.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The bytes parsed cleanly at the framing layer but their content is
    /// internally inconsistent (bad ring-buffer pointers, unknown sample
    /// type, corrupt firmware image).
    #[error("data format error: {0}")]
    DataFormat(String),

    /// The caller's context was cancelled mid-operation.
    #[error("operation cancelled")]
    Cancelled,
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Io(e.to_string()),
        }
    }
}
