//! Top-level error type.
//!
//! Every module boundary has its own `thiserror` enum (see `io::CodecError`,
//! `gfx::PipelineError`, `archive::BuildError`); they all convert into this one
//! via `#[from]` so callers at the edges of the library only need to match six
//! kinds, matching the error kinds enumerated for the core.

/// Errors produced anywhere in `forge`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Caller-supplied parameters were contradictory or unsupported.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An input file or stream was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Opening, reading, writing, or compressing external storage failed.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// The GPU backend returned an error; the raw code is preserved for diagnostics.
    #[error("device error (code {0})")]
    DeviceError(i32),

    /// A cooperative cancellation signal was observed.
    #[error("aborted")]
    Aborted,

    /// An asset/material/attribute lookup returned nothing.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
