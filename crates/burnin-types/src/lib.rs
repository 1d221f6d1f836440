#![forbid(unsafe_code)]
//! Core newtypes for the burnin conformance tester.
//!
//! Unit-carrying wrappers prevent mixing block numbers with byte
//! offsets, and [`Geometry`] is validated at construction so every
//! downstream consumer can rely on `block_size > 0` and a
//! non-overflowing `total_size`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Block index on a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u32);

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Byte offset on a device (pread/pwrite semantics).
///
/// This is a unit-carrying wrapper to prevent mixing bytes and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

impl ByteOffset {
    pub const ZERO: Self = Self(0);

    /// Add a byte count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geometry validation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// Immutable block-device geometry.
///
/// Invariant: `block_size > 0` and
/// `total_size() == block_size * block_count` (never overflows u64
/// since both factors are u32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    block_size: u32,
    block_count: u32,
    erase_byte: u8,
}

impl Geometry {
    /// Create a `Geometry`, rejecting a zero block size.
    pub fn new(block_size: u32, block_count: u32, erase_byte: u8) -> Result<Self, GeometryError> {
        if block_size == 0 {
            return Err(GeometryError::InvalidField {
                field: "block_size",
                reason: "must be nonzero",
            });
        }
        Ok(Self {
            block_size,
            block_count,
            erase_byte,
        })
    }

    /// Bytes per block.
    #[must_use]
    pub fn block_size(self) -> u32 {
        self.block_size
    }

    /// Total number of blocks.
    #[must_use]
    pub fn block_count(self) -> u32 {
        self.block_count
    }

    /// The byte value every block reads back as after a successful erase.
    #[must_use]
    pub fn erase_byte(self) -> u8 {
        self.erase_byte
    }

    /// Device capacity in bytes.
    #[must_use]
    pub fn total_size(self) -> u64 {
        u64::from(self.block_size) * u64::from(self.block_count)
    }

    /// True if `block` addresses a block on this device.
    #[must_use]
    pub fn contains(self, block: BlockNumber) -> bool {
        block.0 < self.block_count
    }

    /// Byte offset of the first byte of `block`.
    #[must_use]
    pub fn block_offset(self, block: BlockNumber) -> ByteOffset {
        ByteOffset(u64::from(block.0) * u64::from(self.block_size))
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks x {} bytes (erase byte {:#04x})",
            self.block_count, self.block_size, self.erase_byte
        )
    }
}
