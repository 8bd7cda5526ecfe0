// SPDX-License-Identifier: MPL-2.0

use std::io;

use linux_boot_params::HeaderError;
use thiserror::Error;

use crate::compression::Compression;

pub type Result<T> = core::result::Result<T, self::Error>;

/// Errors of decoding, validating and rewriting a bzImage.
///
/// Every error is fatal to the operation that returned it. Nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] HeaderError),
    #[error("{region} needs {need} bytes, but only {have} are left")]
    Truncated {
        region: &'static str,
        need: usize,
        have: usize,
    },
    #[error("unknown compression format, payload starts with {0:02x?}")]
    UnknownFormat(Vec<u8>),
    #[error("can't decompress the {format} payload: {source}")]
    Decompression {
        format: Compression,
        #[source]
        source: io::Error,
    },
    #[error("can't compress to {format}: {source}")]
    Compression {
        format: Compression,
        #[source]
        source: io::Error,
    },
    #[error("the payload declares {declared} uncompressed bytes, but decompressed to {actual}")]
    DecompressionSizeMismatch { declared: u32, actual: usize },
    #[error("the decompressed kernel is not an ELF, it starts with {0:02x?}")]
    NotElf(Vec<u8>),
    #[error("CRC32 mismatch: the image carries {stored:#010x}, the contents give {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("{0} bytes left over after the image")]
    LeftoverBytes(usize),
    #[error("the image has no decompressed kernel code")]
    MissingKernelCode,
    #[error("compressed kernel code too big: was {original} bytes, now {new}")]
    Oversize { original: usize, new: usize },
    #[error("the kernel code is not a valid ELF: {0}")]
    Elf(&'static str),
    #[error("can't find an RWE segment in the kernel")]
    NoRweSegment,
    #[error("no newc cpio magic found")]
    NoCpioMagic,
    #[error("no cpio found")]
    NoCpioFound,
    #[error("the initramfs would end at {end}, beyond the {len} bytes of kernel code")]
    InitramfsOutOfBounds { end: usize, len: usize },
    #[error("new initramfs is {new} bytes, won't fit in {old} byte old one")]
    TooLarge { new: usize, old: usize },
    #[error("no boot signature 55 aa at offset 510")]
    BadBootSignature,
    #[error("no \"HdrS\" signature at offset 514")]
    BadHeaderSignature,
    #[error("the kernel version offset is zero")]
    NullVersionOffset,
    #[error("the kernel version at {offset:#x} lies outside the {len} bytes of boot code")]
    VersionOutOfBounds { offset: usize, len: usize },
    #[error("can't parse kernel version {desc:?}: {reason}")]
    Parse { desc: String, reason: &'static str },
    #[error("images differ: {0}")]
    Mismatch(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
