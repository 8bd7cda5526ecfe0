// SPDX-License-Identifier: MPL-2.0

//! The compression formats a kernel payload may be packed with.
//!
//! Gzip, xz, lzma and bzip2 are handled in-process. Lzo, zstd and lz4 are
//! delegated to the `lzop`, `zstd` and `lz4` programs, which must be found in
//! `PATH` when such a payload is met.
//!
//! Except for gzip, the kernel build appends the uncompressed size as a
//! 4-byte little-endian word to the compressed stream. [`Compression::decode`]
//! strips it and [`Compression::encode`] appends it.

mod decoder;
mod encoder;
mod external;

use core::fmt;

use crate::error::{Error, Result};

/// The format used to pack new kernel code.
///
/// This is what the kernel build uses by default for x86.
pub const KERNEL_COMPRESSION: Compression = Compression::Xz;

/// The length of the uncompressed size trailer.
pub const SIZE_TRAILER_LEN: usize = 4;

/// A payload compression format, identified by its leading signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Compression {
    Gzip,
    Xz,
    Lzma,
    Lzo,
    Zstd,
    Bzip2,
    Lz4,
}

impl Compression {
    /// Every format, in the order signatures are tried.
    pub const ALL: [Compression; 7] = [
        Self::Gzip,
        Self::Xz,
        Self::Lzma,
        Self::Lzo,
        Self::Zstd,
        Self::Bzip2,
        Self::Lz4,
    ];

    /// The leading bytes of a payload in this format.
    pub const fn signature(self) -> &'static [u8] {
        match self {
            Self::Gzip => &[0x1f, 0x8b],
            Self::Xz => &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00],
            Self::Lzma => &[0x5d, 0x00, 0x00],
            Self::Lzo => &[0x89, 0x4c, 0x5a, 0x4f, 0x00, 0x0d, 0x0a, 0x1a, 0x0a],
            Self::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
            Self::Bzip2 => &[0x42, 0x5a, 0x68],
            Self::Lz4 => &[0x02, 0x21, 0x4c, 0x18],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Lzma => "lzma",
            Self::Lzo => "lzo",
            Self::Zstd => "zstd",
            Self::Bzip2 => "bzip2",
            Self::Lz4 => "lz4",
        }
    }

    /// Finds the format whose signature starts `payload`.
    ///
    /// Fails with [`Error::UnknownFormat`] carrying up to the first 16 bytes
    /// of the payload.
    pub fn detect(payload: &[u8]) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| payload.starts_with(format.signature()))
            .ok_or_else(|| Error::UnknownFormat(payload[..payload.len().min(16)].to_vec()))
    }

    /// Whether the kernel build appends the uncompressed size to this format.
    pub const fn has_size_trailer(self) -> bool {
        !matches!(self, Self::Gzip)
    }

    /// Decompresses a payload of this format, dropping the size trailer if
    /// the format carries one.
    pub fn decode(self, payload: &[u8]) -> Result<Vec<u8>> {
        let stream = if self.has_size_trailer() {
            strip_size(payload)?.0
        } else {
            payload
        };
        decoder::decode(self, stream).map_err(|source| Error::Decompression {
            format: self,
            source,
        })
    }

    /// Compresses `data` the way the kernel build does, size trailer included.
    pub fn encode(self, data: &[u8]) -> Result<Vec<u8>> {
        let mut payload = encoder::encode(self, data).map_err(|source| Error::Compression {
            format: self,
            source,
        })?;
        if self.has_size_trailer() {
            let size = u32::try_from(data.len()).map_err(|_| Error::Compression {
                format: self,
                source: std::io::Error::other("data exceeds 4 GiB"),
            })?;
            payload.extend_from_slice(&size.to_le_bytes());
        }
        Ok(payload)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Splits a payload into the compressed stream and the trailing uncompressed size.
pub fn strip_size(payload: &[u8]) -> Result<(&[u8], u32)> {
    let Some(split) = payload.len().checked_sub(SIZE_TRAILER_LEN) else {
        return Err(Error::Truncated {
            region: "uncompressed size trailer",
            need: SIZE_TRAILER_LEN,
            have: payload.len(),
        });
    };
    let (stream, trailer) = payload.split_at(split);
    Ok((stream, read_u32_le(trailer)))
}

/// The uncompressed size recorded in the last 4 bytes of a payload.
pub fn declared_size(payload: &[u8]) -> Result<u32> {
    strip_size(payload).map(|(_, size)| size)
}

pub(crate) fn read_u32_le(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}
