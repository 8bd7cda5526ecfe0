// SPDX-License-Identifier: MPL-2.0

//! This module is used to decompress payload.

use std::io::{self, Read};

use bzip2::read::BzDecoder;
use libflate::gzip;
use xz2::{read::XzDecoder, stream::Stream};

use super::{Compression, external};

/// Decodes a compressed stream whose size trailer, if any, was already stripped.
pub(super) fn decode(format: Compression, stream: &[u8]) -> io::Result<Vec<u8>> {
    let mut kernel = Vec::new();
    match format {
        Compression::Gzip => {
            let mut decoder = gzip::Decoder::new(stream)?;
            decoder.read_to_end(&mut kernel)?;
        }
        Compression::Xz => {
            let mut decoder = XzDecoder::new(stream);
            decoder.read_to_end(&mut kernel)?;
        }
        Compression::Lzma => {
            let mut decoder = XzDecoder::new_stream(stream, Stream::new_lzma_decoder(u64::MAX)?);
            decoder.read_to_end(&mut kernel)?;
        }
        Compression::Bzip2 => {
            let mut decoder = BzDecoder::new(stream);
            decoder.read_to_end(&mut kernel)?;
        }
        Compression::Lzo => kernel = external::filter("lzop", &["-d", "-c"], stream)?,
        Compression::Zstd => kernel = external::filter("zstd", &["-d", "-c"], stream)?,
        Compression::Lz4 => kernel = external::filter("lz4", &["-d", "-c"], stream)?,
    }
    Ok(kernel)
}
