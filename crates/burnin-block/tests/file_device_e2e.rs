#![forbid(unsafe_code)]
//! File-backed device behavior against a real filesystem.

use burnin_block::{BlockDevice, ByteBlockDevice, FileByteDevice};
use burnin_error::BurninError;
use burnin_types::{BlockNumber, ByteOffset};
use std::io::Write;

fn image_with_len(len: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp image");
    file.write_all(&vec![0xEE_u8; len]).expect("fill image");
    file.flush().expect("flush image");
    file
}

#[test]
fn writes_persist_across_handles() {
    let image = image_with_len(512 * 8);
    let data = vec![0x5A_u8; 512];
    {
        let file = FileByteDevice::open(image.path()).expect("open image");
        let device = ByteBlockDevice::new(file, 512, 0x00).expect("block device");
        device.write_block(BlockNumber(3), 1, &data).expect("write");
        device.sync().expect("sync");
    }

    let file = FileByteDevice::open(image.path()).expect("reopen image");
    let device = ByteBlockDevice::new(file, 512, 0x00).expect("block device");
    let buf = device.read_block(BlockNumber(3), 1).expect("read");
    assert_eq!(buf.as_slice(), data.as_slice());
}

#[test]
fn erase_fills_the_backing_file_with_the_erase_byte() {
    // Larger than the internal fill chunk so the chunked path runs.
    let image = image_with_len(512 * 256);
    let file = FileByteDevice::open(image.path()).expect("open image");
    let device = ByteBlockDevice::new(file, 512, 0xFF).expect("block device");

    let erased = device
        .erase(ByteOffset::ZERO, device.total_size())
        .expect("erase");
    assert_eq!(erased, device.total_size());
    device.sync().expect("sync");

    let contents = std::fs::read(image.path()).expect("read backing file");
    assert_eq!(contents.len(), 512 * 256);
    assert!(contents.iter().all(|&b| b == 0xFF));
}

#[test]
fn partial_erase_touches_only_the_requested_range() {
    let image = image_with_len(512 * 4);
    let file = FileByteDevice::open(image.path()).expect("open image");
    let device = ByteBlockDevice::new(file, 512, 0x00).expect("block device");

    device.erase(ByteOffset(512), 1024).expect("erase");
    device.sync().expect("sync");

    let contents = std::fs::read(image.path()).expect("read backing file");
    assert!(contents[..512].iter().all(|&b| b == 0xEE));
    assert!(contents[512..1536].iter().all(|&b| b == 0x00));
    assert!(contents[1536..].iter().all(|&b| b == 0xEE));
}

#[test]
fn out_of_range_access_is_rejected() {
    let image = image_with_len(512 * 4);
    let file = FileByteDevice::open(image.path()).expect("open image");
    let device = ByteBlockDevice::new(file, 512, 0x00).expect("block device");

    assert!(matches!(
        device.read_block(BlockNumber(4), 1),
        Err(BurninError::OutOfRange(_))
    ));
    assert!(matches!(
        device.erase(ByteOffset(512 * 4), 1),
        Err(BurninError::OutOfRange(_))
    ));
    assert!(matches!(
        device.write_block(BlockNumber(0), 1, &[0_u8; 17]),
        Err(BurninError::Geometry(_))
    ));
}

#[test]
fn geometry_is_derived_from_the_file_length() {
    let image = image_with_len(4096 * 7);
    let file = FileByteDevice::open(image.path()).expect("open image");
    let device = ByteBlockDevice::new(file, 4096, 0x00).expect("block device");

    assert_eq!(device.block_size(), 4096);
    assert_eq!(device.block_count(), 7);
    assert_eq!(device.total_size(), 4096 * 7);
    assert_eq!(device.erase_byte(), 0x00);
    assert!(device.inner().is_writable());
}
