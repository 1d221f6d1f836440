#![forbid(unsafe_code)]
//! Block-device abstraction for the burnin conformance tester.
//!
//! Provides the [`BlockDevice`] trait consumed by the conformance
//! core, a byte-addressed [`ByteDevice`] layer with a file-backed
//! implementation, the [`ByteBlockDevice`] adapter between the two,
//! and an in-memory [`RamDisk`] used as a fixture by tests and
//! benches.
//!
//! The conformance core only ever performs whole-block reads and
//! writes; the byte-addressed layer exists so that images of any
//! block size can be opened from a plain file.

use burnin_error::{BurninError, Result};
use burnin_types::{BlockNumber, ByteOffset, Geometry};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Fill granularity for range erases on byte-addressed backings.
const ERASE_CHUNK: usize = 64 * 1024;

/// Owned block buffer.
///
/// The length is the transferred byte count, which a device may legally
/// report shorter than requested (short transfer). Callers that require
/// a full block must check the length themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBuf {
    bytes: Vec<u8>,
}

impl BlockBuf {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// A buffer of `len` bytes, every byte set to `fill`.
    #[must_use]
    pub fn filled(len: usize, fill: u8) -> Self {
        Self {
            bytes: vec![fill; len],
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

/// Byte-addressed device for fixed-offset I/O (pread/pwrite semantics).
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` to `offset`.
    fn write_all_at(&self, offset: ByteOffset, buf: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

/// File-backed byte device using Linux `pread`/`pwrite` style I/O.
///
/// This uses `std::os::unix::fs::FileExt`, which is thread-safe and
/// does not require a shared seek position. Opens read-write, falling
/// back to read-only; writes and erases on a read-only handle fail
/// with [`BurninError::ReadOnly`].
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
    writable: bool,
}

impl FileByteDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BurninError::NotFound(path.display().to_string()));
        }
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path)
                    .map(|file| (file, false))
            })?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
            writable,
        })
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

fn check_byte_range(offset: ByteOffset, len: usize, device_len: u64) -> Result<()> {
    let len = u64::try_from(len)
        .map_err(|_| BurninError::OutOfRange("transfer length overflows u64".to_owned()))?;
    let end = offset
        .checked_add(len)
        .ok_or_else(|| BurninError::OutOfRange("byte range overflows u64".to_owned()))?;
    if end.0 > device_len {
        return Err(BurninError::OutOfRange(format!(
            "offset={offset} len={len} device_len={device_len}"
        )));
    }
    Ok(())
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        check_byte_range(offset, buf.len(), self.len)?;
        self.file.read_exact_at(buf, offset.0)?;
        Ok(())
    }

    fn write_all_at(&self, offset: ByteOffset, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(BurninError::ReadOnly);
        }
        check_byte_range(offset, buf.len(), self.len)?;
        self.file.write_all_at(buf, offset.0)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Block-addressed I/O interface consumed by the conformance core.
///
/// Callers own the handle for the duration of a test run; the core
/// never opens or closes devices and assumes nothing else touches the
/// device mid-run.
pub trait BlockDevice: Send + Sync {
    /// Read `count` whole blocks starting at `block`.
    ///
    /// `Err` is a device fault; an `Ok` buffer shorter than
    /// `count * block_size` is a short transfer.
    fn read_block(&self, block: BlockNumber, count: u32) -> Result<BlockBuf>;

    /// Write `count` whole blocks starting at `block`. `data.len()`
    /// MUST equal `count * block_size`. Returns the bytes written.
    fn write_block(&self, block: BlockNumber, count: u32, data: &[u8]) -> Result<u64>;

    /// Erase `len` bytes starting at byte `offset`; every erased block
    /// subsequently reads back as the geometry's erase byte. Returns
    /// the bytes erased.
    fn erase(&self, offset: ByteOffset, len: u64) -> Result<u64>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Immutable device geometry.
    fn geometry(&self) -> Geometry;

    /// Bytes per block.
    fn block_size(&self) -> u32 {
        self.geometry().block_size()
    }

    /// Total number of blocks.
    fn block_count(&self) -> u32 {
        self.geometry().block_count()
    }

    /// Device capacity in bytes.
    fn total_size(&self) -> u64 {
        self.geometry().total_size()
    }

    /// The byte value an erased block reads back as.
    fn erase_byte(&self) -> u8 {
        self.geometry().erase_byte()
    }
}

fn check_block_range(geometry: Geometry, block: BlockNumber, count: u32) -> Result<u64> {
    let end = u64::from(block.0) + u64::from(count);
    if end > u64::from(geometry.block_count()) {
        return Err(BurninError::OutOfRange(format!(
            "block={block} count={count} block_count={}",
            geometry.block_count()
        )));
    }
    Ok(u64::from(count) * u64::from(geometry.block_size()))
}

fn transfer_len_usize(bytes: u64) -> Result<usize> {
    usize::try_from(bytes)
        .map_err(|_| BurninError::OutOfRange(format!("transfer of {bytes} bytes exceeds usize")))
}

/// Adapter exposing any [`ByteDevice`] as a [`BlockDevice`].
///
/// The erase operation is emulated by filling the byte range with the
/// erase byte in bounded chunks, which satisfies the erased-state
/// read-back contract for backings without a native erase primitive.
#[derive(Debug)]
pub struct ByteBlockDevice<D: ByteDevice> {
    inner: D,
    geometry: Geometry,
}

impl<D: ByteDevice> ByteBlockDevice<D> {
    pub fn new(inner: D, block_size: u32, erase_byte: u8) -> Result<Self> {
        let len = inner.len_bytes();
        if block_size == 0 {
            return Err(BurninError::Geometry("block_size must be nonzero".to_owned()));
        }
        let remainder = len % u64::from(block_size);
        if remainder != 0 {
            return Err(BurninError::Geometry(format!(
                "backing length is not block-aligned: len_bytes={len} block_size={block_size} remainder={remainder}"
            )));
        }
        let block_count = u32::try_from(len / u64::from(block_size)).map_err(|_| {
            BurninError::Geometry(format!(
                "device has more than {} blocks of {block_size} bytes",
                u32::MAX
            ))
        })?;
        let geometry = Geometry::new(block_size, block_count, erase_byte)
            .map_err(|err| BurninError::Geometry(err.to_string()))?;
        Ok(Self { inner, geometry })
    }

    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: ByteDevice> BlockDevice for ByteBlockDevice<D> {
    fn read_block(&self, block: BlockNumber, count: u32) -> Result<BlockBuf> {
        let bytes = check_block_range(self.geometry, block, count)?;
        let mut buf = vec![0_u8; transfer_len_usize(bytes)?];
        self.inner
            .read_exact_at(self.geometry.block_offset(block), &mut buf)?;
        Ok(BlockBuf::new(buf))
    }

    fn write_block(&self, block: BlockNumber, count: u32, data: &[u8]) -> Result<u64> {
        let bytes = check_block_range(self.geometry, block, count)?;
        let expected = transfer_len_usize(bytes)?;
        if data.len() != expected {
            return Err(BurninError::Geometry(format!(
                "write_block data size mismatch: got={} expected={expected}",
                data.len()
            )));
        }
        self.inner
            .write_all_at(self.geometry.block_offset(block), data)?;
        Ok(bytes)
    }

    fn erase(&self, offset: ByteOffset, len: u64) -> Result<u64> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| BurninError::OutOfRange("erase range overflows u64".to_owned()))?;
        if end.0 > self.geometry.total_size() {
            return Err(BurninError::OutOfRange(format!(
                "erase offset={offset} len={len} total_size={}",
                self.geometry.total_size()
            )));
        }

        debug!(offset = offset.0, len, "erasing byte range");
        let fill = vec![self.geometry.erase_byte(); ERASE_CHUNK.min(transfer_len_usize(len)?)];
        let mut pos = offset;
        let mut remaining = len;
        while remaining > 0 {
            let chunk = transfer_len_usize(remaining)?.min(fill.len());
            self.inner.write_all_at(pos, &fill[..chunk])?;
            pos = pos
                .checked_add(chunk as u64)
                .ok_or_else(|| BurninError::OutOfRange("erase cursor overflows u64".to_owned()))?;
            remaining -= chunk as u64;
        }
        Ok(len)
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }
}

/// Flat in-memory block device, born fully erased.
///
/// Fixture device for tests, benches, and end-to-end runs. Backed by a
/// single `Vec<u8>` behind a `parking_lot::Mutex`; never performs
/// short transfers.
#[derive(Debug)]
pub struct RamDisk {
    geometry: Geometry,
    bytes: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(geometry: Geometry) -> Result<Self> {
        let len = transfer_len_usize(geometry.total_size())?;
        Ok(Self {
            geometry,
            bytes: Mutex::new(vec![geometry.erase_byte(); len]),
        })
    }

    /// Overwrite bytes directly, bypassing the [`BlockDevice`] surface.
    ///
    /// Fixture backdoor for fault-injection tests.
    ///
    /// # Panics
    /// Panics if the range lies outside the device.
    pub fn poke(&self, offset: ByteOffset, data: &[u8]) {
        let start = usize::try_from(offset.0).expect("poke offset fits usize");
        self.bytes.lock()[start..start + data.len()].copy_from_slice(data);
    }

    /// Read bytes directly, bypassing the [`BlockDevice`] surface.
    ///
    /// # Panics
    /// Panics if the range lies outside the device.
    #[must_use]
    pub fn peek(&self, offset: ByteOffset, len: usize) -> Vec<u8> {
        let start = usize::try_from(offset.0).expect("peek offset fits usize");
        self.bytes.lock()[start..start + len].to_vec()
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block: BlockNumber, count: u32) -> Result<BlockBuf> {
        let bytes = check_block_range(self.geometry, block, count)?;
        let start = transfer_len_usize(self.geometry.block_offset(block).0)?;
        let len = transfer_len_usize(bytes)?;
        let guard = self.bytes.lock();
        Ok(BlockBuf::new(guard[start..start + len].to_vec()))
    }

    fn write_block(&self, block: BlockNumber, count: u32, data: &[u8]) -> Result<u64> {
        let bytes = check_block_range(self.geometry, block, count)?;
        let expected = transfer_len_usize(bytes)?;
        if data.len() != expected {
            return Err(BurninError::Geometry(format!(
                "write_block data size mismatch: got={} expected={expected}",
                data.len()
            )));
        }
        let start = transfer_len_usize(self.geometry.block_offset(block).0)?;
        self.bytes.lock()[start..start + expected].copy_from_slice(data);
        Ok(bytes)
    }

    fn erase(&self, offset: ByteOffset, len: u64) -> Result<u64> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| BurninError::OutOfRange("erase range overflows u64".to_owned()))?;
        if end.0 > self.geometry.total_size() {
            return Err(BurninError::OutOfRange(format!(
                "erase offset={offset} len={len} total_size={}",
                self.geometry.total_size()
            )));
        }
        let start = transfer_len_usize(offset.0)?;
        let count = transfer_len_usize(len)?;
        let mut guard = self.bytes.lock();
        guard[start..start + count].fill(self.geometry.erase_byte());
        Ok(len)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }
}
