// SPDX-License-Identifier: MPL-2.0

//! This module is used to compress kernel ELF.

use std::io::{self, Write};

use bzip2::write::BzEncoder;
use libflate::gzip;
use xz2::{
    stream::{Check, Filters, LzmaOptions, Stream},
    write::XzEncoder,
};

use super::{Compression, external};

/// The largest LZMA dictionary, as in the kernel's `--lzma2=,dict=32MiB`.
const MAX_DICT_SIZE: u32 = 32 << 20;
/// The smallest LZMA dictionary. Keeps the two low bytes of the size zero,
/// which the lzma signature relies on.
const MIN_DICT_SIZE: u32 = 64 << 10;
/// The preset behind the LZMA options, before the dictionary is resized.
const PRESET: u32 = 6;

/// Encodes `data` with the provided format. The size trailer is not added here.
pub(super) fn encode(format: Compression, data: &[u8]) -> io::Result<Vec<u8>> {
    match format {
        Compression::Gzip => {
            let mut encoder = gzip::Encoder::new(Vec::new())?;
            encoder.write_all(data)?;
            encoder.finish().into_result()
        }
        Compression::Xz => {
            let mut filters = Filters::new();
            filters.x86();
            filters.lzma2(&lzma_options(data.len())?);
            let stream = Stream::new_stream_encoder(&filters, Check::Crc32)?;
            let mut encoder = XzEncoder::new_stream(Vec::new(), stream);
            encoder.write_all(data)?;
            encoder.finish()
        }
        Compression::Lzma => {
            let stream = Stream::new_lzma_encoder(&lzma_options(data.len())?)?;
            let mut encoder = XzEncoder::new_stream(Vec::new(), stream);
            encoder.write_all(data)?;
            encoder.finish()
        }
        Compression::Bzip2 => {
            let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::best());
            encoder.write_all(data)?;
            encoder.finish()
        }
        Compression::Lzo => external::filter("lzop", &["-9", "-c"], data),
        Compression::Zstd => external::filter("zstd", &["-22", "--ultra", "-c"], data),
        Compression::Lz4 => external::filter("lz4", &["-l", "-9", "-c"], data),
    }
}

fn lzma_options(input_len: usize) -> io::Result<LzmaOptions> {
    let mut options = LzmaOptions::new_preset(PRESET)?;
    options.dict_size(dict_size(input_len));
    Ok(options)
}

/// A dictionary no larger than the input needs, rounded up to a power of two.
fn dict_size(input_len: usize) -> u32 {
    let wanted = input_len.next_power_of_two();
    u32::try_from(wanted)
        .unwrap_or(MAX_DICT_SIZE)
        .clamp(MIN_DICT_SIZE, MAX_DICT_SIZE)
}
