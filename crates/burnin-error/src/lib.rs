#![forbid(unsafe_code)]
//! Error types for burnin.
//!
//! `BurninError` is the single user-facing error type returned by the
//! device layer, the conformance core, and the CLI. It deliberately
//! does not depend on `burnin-types` (no cyclic deps); conversions
//! from crate-internal errors happen at their crate boundaries.
//!
//! ## Fatal vs. tallied
//!
//! The conformance core distinguishes two failure planes:
//!
//! - **Fatal**: a device fault or short transfer on the whole-device
//!   erase call, on any write, or on the post-write sync aborts the
//!   entire test. These surface as `Err(BurninError)`.
//! - **Tallied**: per-block read problems during a validation scan are
//!   counted in the phase report and never abort the scan.
//!
//! ## errno mapping
//!
//! Every variant maps to exactly one POSIX errno via
//! [`BurninError::to_errno`]. The mapping is exhaustive (no wildcard
//! arms) so adding a variant is a compile error until its errno is
//! assigned. The CLI exits with the errno of the root cause so shell
//! scripts can distinguish failure classes.

use thiserror::Error;

/// Unified error type for all burnin operations.
#[derive(Debug, Error)]
pub enum BurninError {
    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device reported a negative status code for an operation.
    #[error("device fault: status {status}")]
    DeviceFault { status: i32 },

    /// An operation transferred fewer bytes than requested.
    ///
    /// Fatal when it happens on the erase call or a write; tallied as
    /// a per-block failure when it happens on a validation read.
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: u64, actual: u64 },

    /// A block number or byte range lies outside the device.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Device geometry is invalid or inconsistent with the backing store.
    #[error("invalid geometry: {0}")]
    Geometry(String),

    /// Named device or image not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Device is read-only and a write or erase was attempted.
    #[error("read-only device")]
    ReadOnly,
}

impl BurninError {
    /// Convert this error into a POSIX errno suitable for process exit
    /// statuses.
    ///
    /// The mapping is exhaustive — every variant has an explicit arm.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::DeviceFault { .. } | Self::ShortTransfer { .. } => libc::EIO,
            Self::OutOfRange(_) | Self::Geometry(_) => libc::EINVAL,
            Self::NotFound(_) => libc::ENOENT,
            Self::ReadOnly => libc::EROFS,
        }
    }
}

/// Result alias using `BurninError`.
pub type Result<T> = std::result::Result<T, BurninError>;
