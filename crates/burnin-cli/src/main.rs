#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use burnin::{run_conformance_test, ConformanceReport};
use burnin_block::{BlockDevice, ByteBlockDevice, ByteDevice, FileByteDevice};
use burnin_error::BurninError;
use burnin_types::ByteOffset;
use std::env;
use std::path::Path;

const DEFAULT_BLOCK_SIZE: u32 = 512;
const DEFAULT_ERASE_BYTE: u8 = 0x00;
const DUMP_CHUNK: usize = 256;
const CKSUM_CHUNK: usize = 4096;

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        // Scripts can distinguish failure classes by errno.
        let code = error
            .downcast_ref::<BurninError>()
            .map_or(1, BurninError::to_errno);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "test" => {
            let remaining: Vec<String> = args.collect();
            let (image, options) = parse_device_args(&remaining)?;
            let json = remaining.iter().any(|arg| arg == "--json");
            test_cmd(Path::new(&image), &options, json)
        }
        "dump" => {
            let (image, offset, len) = range_args(&mut args, "dump")?;
            dump_cmd(Path::new(&image), offset, len)
        }
        "erase" => {
            let Some(image) = args.next() else {
                bail!("erase requires <image> <offset> <len>");
            };
            let offset = parse_num(&args.next().context("erase requires an offset")?)?;
            let len = parse_num(&args.next().context("erase requires a length")?)?;
            let remaining: Vec<String> = args.collect();
            let options = parse_device_options(&remaining)?;
            erase_cmd(Path::new(&image), offset, len, &options)
        }
        "cksum" => {
            let (image, offset, len) = range_args(&mut args, "cksum")?;
            cksum_cmd(Path::new(&image), offset, len)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("burnin — block-device conformance tester\n");
    println!("USAGE:");
    println!("  burnin test <image> [--block-size N] [--erase-byte B] [--json]");
    println!("  burnin dump <image> <offset> <len>");
    println!("  burnin erase <image> <offset> <len> [--block-size N] [--erase-byte B]");
    println!("  burnin cksum <image> <offset> <len>");
    println!();
    println!("`test` is DESTRUCTIVE: it erases and overwrites the entire image.");
    println!("Numbers accept decimal or 0x-prefixed hex.");
}

// ── Argument helpers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct DeviceOptions {
    block_size: u32,
    erase_byte: u8,
}

fn parse_num(text: &str) -> Result<u64> {
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.with_context(|| format!("invalid number: {text}"))
}

fn parse_device_options(args: &[String]) -> Result<DeviceOptions> {
    let mut options = DeviceOptions {
        block_size: DEFAULT_BLOCK_SIZE,
        erase_byte: DEFAULT_ERASE_BYTE,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--block-size" => {
                let value = iter.next().context("--block-size requires a value")?;
                options.block_size = u32::try_from(parse_num(value)?)
                    .with_context(|| format!("block size out of range: {value}"))?;
            }
            "--erase-byte" => {
                let value = iter.next().context("--erase-byte requires a value")?;
                options.erase_byte = u8::try_from(parse_num(value)?)
                    .with_context(|| format!("erase byte out of range: {value}"))?;
            }
            "--json" => {}
            other => bail!("unrecognized argument: {other}"),
        }
    }
    Ok(options)
}

fn parse_device_args(args: &[String]) -> Result<(String, DeviceOptions)> {
    let Some((image, flags)) = args.split_first() else {
        bail!("test requires an image path");
    };
    if image.starts_with("--") {
        bail!("test requires an image path before flags");
    }
    Ok((image.clone(), parse_device_options(flags)?))
}

fn range_args(
    args: &mut impl Iterator<Item = String>,
    command: &str,
) -> Result<(String, u64, u64)> {
    let image = args
        .next()
        .with_context(|| format!("{command} requires <image> <offset> <len>"))?;
    let offset = parse_num(&args.next().with_context(|| format!("{command} requires an offset"))?)?;
    let len = parse_num(&args.next().with_context(|| format!("{command} requires a length"))?)?;
    Ok((image, offset, len))
}

fn open_device(path: &Path, options: &DeviceOptions) -> Result<ByteBlockDevice<FileByteDevice>> {
    let file = FileByteDevice::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let device = ByteBlockDevice::new(file, options.block_size, options.erase_byte)
        .with_context(|| format!("{} is not usable as a block device", path.display()))?;
    Ok(device)
}

// ── Commands ────────────────────────────────────────────────────────────────

fn test_cmd(path: &Path, options: &DeviceOptions, json: bool) -> Result<()> {
    let device = open_device(path, options)?;
    let report = run_conformance_test(&device);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_report(&device, &report);
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn render_report(device: &dyn BlockDevice, report: &ConformanceReport) {
    println!("device: {}", device.geometry());
    for phase in [&report.erase, &report.write].into_iter().flatten() {
        println!("{phase}");
        for finding in &phase.findings {
            println!("  {finding}");
        }
    }
    println!("{}", report.verdict);
}

fn dump_cmd(path: &Path, offset: u64, len: u64) -> Result<()> {
    let file = FileByteDevice::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut pos = offset;
    let mut remaining = len;
    let mut buf = [0_u8; DUMP_CHUNK];
    while remaining > 0 {
        // Bounded by DUMP_CHUNK, so the cast cannot truncate.
        let amount = remaining.min(DUMP_CHUNK as u64) as usize;
        file.read_exact_at(ByteOffset(pos), &mut buf[..amount])
            .with_context(|| format!("read error at offset {pos:#x}"))?;
        hexdump(&buf[..amount], pos);
        pos += amount as u64;
        remaining -= amount as u64;
    }
    Ok(())
}

fn hexdump(bytes: &[u8], base: u64) {
    for (line_index, line) in bytes.chunks(16).enumerate() {
        print!("{:08x}  ", base + (line_index as u64) * 16);
        for column in 0..16 {
            match line.get(column) {
                Some(byte) => print!("{byte:02x} "),
                None => print!("   "),
            }
            if column == 7 {
                print!(" ");
            }
        }
        print!(" |");
        for &byte in line {
            if byte.is_ascii_graphic() || byte == b' ' {
                print!("{}", byte as char);
            } else {
                print!(".");
            }
        }
        println!("|");
    }
}

fn erase_cmd(path: &Path, offset: u64, len: u64, options: &DeviceOptions) -> Result<()> {
    let device = open_device(path, options)?;
    let erased = device.erase(ByteOffset(offset), len)?;
    device.sync()?;
    println!("erased {erased} bytes at offset {offset:#x}");
    Ok(())
}

fn cksum_cmd(path: &Path, offset: u64, len: u64) -> Result<()> {
    let file = FileByteDevice::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut crc: u32 = 0;
    let mut pos = offset;
    let mut remaining = len;
    let mut buf = [0_u8; CKSUM_CHUNK];
    while remaining > 0 {
        // Bounded by CKSUM_CHUNK, so the cast cannot truncate.
        let amount = remaining.min(CKSUM_CHUNK as u64) as usize;
        file.read_exact_at(ByteOffset(pos), &mut buf[..amount])
            .with_context(|| format!("read error at offset {pos:#x}"))?;
        crc = crc32c::crc32c_append(crc, &buf[..amount]);
        pos += amount as u64;
        remaining -= amount as u64;
    }
    println!("crc32c {crc:#010x}");
    Ok(())
}
