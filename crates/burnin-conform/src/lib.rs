#![forbid(unsafe_code)]
//! Block-device conformance test core.
//!
//! Proves that a block device correctly erases and correctly persists
//! per-block writes, by reading back and verifying deterministic byte
//! patterns across the whole device:
//!
//! 1. **Erase phase** ([`erase_test`]): erase the entire device, then
//!    verify every block reads back as the device's erase byte.
//! 2. **Write phase** ([`write_test`]): fill every block with a
//!    one-byte signature derived from its index, then re-read and
//!    verify each one.
//!
//! [`run_conformance_test`] sequences the two phases with a
//! short-circuit failure policy and yields the final PASS/FAIL
//! verdict. The write phase is skipped when the erase phase finds bad
//! blocks — write results are meaningless on a device that cannot
//! erase.
//!
//! The whole run is destructive and fully synchronous. Callers own the
//! device handle for the duration of a run and must not touch the
//! device concurrently.

use burnin_block::{BlockBuf, BlockDevice};
use burnin_error::{BurninError, Result};
use burnin_types::{BlockNumber, ByteOffset};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

// ── Signature generator ─────────────────────────────────────────────────────

/// One-byte fingerprint of a block index: XOR-fold of the four bytes
/// of the index's in-memory representation.
///
/// Deterministic and side-effect-free, so the verify pass recomputes
/// the expected value instead of storing it. Distinct indices may
/// legally produce the same signature; there is no uniqueness
/// guarantee.
#[must_use]
pub fn block_signature(block: BlockNumber) -> u8 {
    block.0.to_ne_bytes().iter().fold(0, |acc, &b| acc ^ b)
}

// ── Pattern validator ───────────────────────────────────────────────────────

/// Outcome of validating one block against a reference pattern.
///
/// The tri-state keeps infrastructure failures (read faults, short
/// transfers) distinguishable from genuine content corruption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockCheck {
    /// Every byte matches the repeating pattern.
    Match,
    /// First mismatching byte (the comparison short-circuits).
    Mismatch {
        offset: usize,
        expected: u8,
        actual: u8,
    },
    /// The block could not be read in full.
    IoError(String),
}

/// Read one block and compare each byte at position `k` against
/// `pattern[k % pattern.len()]`.
///
/// A read fault or a transfer shorter than one block yields
/// [`BlockCheck::IoError`]. `pattern` must be non-empty.
pub fn check_block(device: &dyn BlockDevice, block: BlockNumber, pattern: &[u8]) -> BlockCheck {
    if pattern.is_empty() {
        return BlockCheck::IoError("empty reference pattern".to_owned());
    }

    let block_size = device.block_size() as usize;
    let buf = match device.read_block(block, 1) {
        Ok(buf) => buf,
        Err(err) => return BlockCheck::IoError(format!("read failed: {err}")),
    };
    if buf.len() != block_size {
        return BlockCheck::IoError(format!(
            "short read: expected {block_size} bytes, got {}",
            buf.len()
        ));
    }

    for (offset, &actual) in buf.as_slice().iter().enumerate() {
        let expected = pattern[offset % pattern.len()];
        if actual != expected {
            return BlockCheck::Mismatch {
                offset,
                expected,
                actual,
            };
        }
    }
    BlockCheck::Match
}

// ── Phase reports ───────────────────────────────────────────────────────────

/// Which conformance phase produced a report or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPhase {
    Erase,
    Write,
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Erase => write!(f, "erase"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Category of a per-block failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Content did not match the expected pattern.
    Mismatch,
    /// The block could not be read in full.
    IoError,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch => write!(f, "mismatch"),
            Self::IoError => write!(f, "io_error"),
        }
    }
}

/// A single failing block discovered during a validation scan.
#[derive(Debug, Clone, Serialize)]
pub struct BlockFinding {
    pub block: BlockNumber,
    pub kind: FindingKind,
    pub detail: String,
}

impl fmt::Display for BlockFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} [{}]: {}", self.block, self.kind, self.detail)
    }
}

/// Aggregated results of one validation scan.
///
/// A scan always visits every block; per-block failures are tallied,
/// never used to abort early.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: TestPhase,
    /// Total blocks scanned (including clean ones).
    pub blocks_scanned: u32,
    /// Blocks whose content did not match the expected pattern.
    pub blocks_mismatched: u32,
    /// Blocks that could not be read in full.
    pub blocks_io_error: u32,
    /// Per-block detail, ordered by block number.
    pub findings: Vec<BlockFinding>,
}

impl PhaseReport {
    /// Count of blocks failing validation, either way.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.blocks_mismatched + self.blocks_io_error
    }

    /// True if every scanned block validated.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: scanned {} blocks, {} mismatched, {} io errors",
            self.phase, self.blocks_scanned, self.blocks_mismatched, self.blocks_io_error
        )
    }
}

/// Scan every block, validating each against a per-block single-byte
/// pattern.
fn scan_blocks(
    device: &dyn BlockDevice,
    phase: TestPhase,
    expected_byte: impl Fn(BlockNumber) -> u8,
) -> PhaseReport {
    let mut report = PhaseReport {
        phase,
        blocks_scanned: 0,
        blocks_mismatched: 0,
        blocks_io_error: 0,
        findings: Vec::new(),
    };

    for index in 0..device.block_count() {
        let block = BlockNumber(index);
        report.blocks_scanned += 1;
        let pattern = [expected_byte(block)];
        match check_block(device, block, &pattern) {
            BlockCheck::Match => {}
            BlockCheck::Mismatch {
                offset,
                expected,
                actual,
            } => {
                debug!(%block, offset, "content mismatch");
                report.blocks_mismatched += 1;
                report.findings.push(BlockFinding {
                    block,
                    kind: FindingKind::Mismatch,
                    detail: format!("byte {offset}: expected {expected:#04x}, got {actual:#04x}"),
                });
            }
            BlockCheck::IoError(detail) => {
                debug!(%block, %detail, "read failure");
                report.blocks_io_error += 1;
                report.findings.push(BlockFinding {
                    block,
                    kind: FindingKind::IoError,
                    detail,
                });
            }
        }
    }
    report
}

// ── Erase verifier ──────────────────────────────────────────────────────────

/// Erase the whole device, then verify every block reads back as the
/// erase byte.
///
/// A device fault on the erase call, or an erased byte count not equal
/// to the device's total size, is fatal: no block-level validation is
/// attempted and the error propagates. A partial erase is not
/// partially graded. Otherwise the scan visits every block and the
/// report's `error_count()` is the number of blocks that did not read
/// back erased (0 means fully erased).
pub fn erase_test(device: &dyn BlockDevice) -> Result<PhaseReport> {
    let geometry = device.geometry();
    let total = geometry.total_size();

    info!(total_size = total, "erasing device");
    let erased = device.erase(ByteOffset::ZERO, total)?;
    if erased != total {
        return Err(BurninError::ShortTransfer {
            expected: total,
            actual: erased,
        });
    }

    info!(block_count = geometry.block_count(), "validating erase");
    let erase_byte = geometry.erase_byte();
    Ok(scan_blocks(device, TestPhase::Erase, |_| erase_byte))
}

// ── Write verifier ──────────────────────────────────────────────────────────

/// Write a per-block signature to every block, then re-read and
/// validate each one.
///
/// The write pass covers all blocks before any validation read; a
/// write fault or short write aborts immediately. The device is synced
/// between the two passes so the read-back validates persisted data.
/// The report counts blocks whose signature did not persist (0 means
/// every write persisted correctly).
pub fn write_test(device: &dyn BlockDevice) -> Result<PhaseReport> {
    let geometry = device.geometry();
    let block_size = u64::from(geometry.block_size());

    info!(block_count = geometry.block_count(), "writing block signatures");
    for index in 0..geometry.block_count() {
        let block = BlockNumber(index);
        let buf = BlockBuf::filled(geometry.block_size() as usize, block_signature(block));
        let written = device.write_block(block, 1, buf.as_slice())?;
        if written != block_size {
            return Err(BurninError::ShortTransfer {
                expected: block_size,
                actual: written,
            });
        }
    }
    device.sync()?;

    info!(
        block_count = geometry.block_count(),
        "validating written signatures"
    );
    Ok(scan_blocks(device, TestPhase::Write, block_signature))
}

// ── Orchestrator ────────────────────────────────────────────────────────────

/// Why a conformance run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// A device operation faulted or transferred short; the run was
    /// aborted with no partial credit.
    IoFailure,
    /// One or more blocks failed content validation.
    ValidationFailure,
}

/// Final pass/fail verdict for a conformance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail {
        phase: TestPhase,
        reason: FailReason,
        error_count: u32,
        detail: String,
    },
}

impl Verdict {
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail {
                phase,
                reason: FailReason::ValidationFailure,
                error_count,
                ..
            } => write!(f, "FAIL: {phase} validation failed, count={error_count}"),
            Self::Fail {
                phase,
                reason: FailReason::IoFailure,
                detail,
                ..
            } => write!(f, "FAIL: {phase} I/O failure: {detail}"),
        }
    }
}

/// Full results of a conformance run: the verdict plus whichever phase
/// reports were produced before the run terminated.
#[derive(Debug, Clone, Serialize)]
pub struct ConformanceReport {
    pub verdict: Verdict,
    pub erase: Option<PhaseReport>,
    pub write: Option<PhaseReport>,
}

impl ConformanceReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }
}

fn io_failure(phase: TestPhase, err: &BurninError) -> Verdict {
    Verdict::Fail {
        phase,
        reason: FailReason::IoFailure,
        error_count: 0,
        detail: err.to_string(),
    }
}

fn validation_failure(report: &PhaseReport) -> Verdict {
    Verdict::Fail {
        phase: report.phase,
        reason: FailReason::ValidationFailure,
        error_count: report.error_count(),
        detail: format!(
            "{} of {} blocks failed validation",
            report.error_count(),
            report.blocks_scanned
        ),
    }
}

/// Run the full conformance test: erase phase, then write phase.
///
/// Any failure terminates the run; in particular, a dirty erase phase
/// skips the write phase entirely. All failure modes fold into the
/// verdict — the report itself is always produced.
pub fn run_conformance_test(device: &dyn BlockDevice) -> ConformanceReport {
    let erase = match erase_test(device) {
        Ok(report) => report,
        Err(err) => {
            warn!(error = %err, "erase phase aborted");
            return ConformanceReport {
                verdict: io_failure(TestPhase::Erase, &err),
                erase: None,
                write: None,
            };
        }
    };
    if erase.error_count() > 0 {
        warn!(
            error_count = erase.error_count(),
            "device does not erase correctly; skipping write phase"
        );
        return ConformanceReport {
            verdict: validation_failure(&erase),
            erase: Some(erase),
            write: None,
        };
    }

    let write = match write_test(device) {
        Ok(report) => report,
        Err(err) => {
            warn!(error = %err, "write phase aborted");
            return ConformanceReport {
                verdict: io_failure(TestPhase::Write, &err),
                erase: Some(erase),
                write: None,
            };
        }
    };
    if write.error_count() > 0 {
        warn!(
            error_count = write.error_count(),
            "device does not persist writes correctly"
        );
        return ConformanceReport {
            verdict: validation_failure(&write),
            erase: Some(erase),
            write: Some(write),
        };
    }

    info!("device conformance test passed");
    ConformanceReport {
        verdict: Verdict::Pass,
        erase: Some(erase),
        write: Some(write),
    }
}
