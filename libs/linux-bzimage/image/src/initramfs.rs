// SPDX-License-Identifier: MPL-2.0

//! Finding and replacing the initramfs linked into the kernel ELF.
//!
//! A kernel built with `CONFIG_INITRAMFS_SOURCE` carries a newc archive in
//! its writable data. The archive is searched for in the first segment that
//! is readable, writable and executable, which is how the decompressed x86
//! kernel lays out its init data.

use core::ops::Range;
use std::path::Path;

use cpio_decoder::{CpioDecoder, MAGIC};

use crate::{
    error::{Error, Result},
    image::BzImage,
};

/// A newc archive is only taken for an initramfs if one of its entries has
/// one of these names.
const ROOTFS_NAMES: [&str; 4] = ["init", "dev", "bin", "usr"];
/// The trailer record: a 110 byte header and the padded "TRAILER!!!" name.
const TRAILER_LEN: usize = 120;
/// The kernel build leaves at least one padding word after the trailer.
const TRAILER_PADDING: usize = 4;

impl BzImage {
    /// Finds the byte range of the embedded initramfs within the kernel code.
    pub fn initramfs_span(&self) -> Result<Range<usize>> {
        let kernel_code = self.kernel_code().ok_or(Error::MissingKernelCode)?;
        let segment = {
            let elf = self.elf()?;
            let rwe = elf
                .program_iter()
                .find(|ph| {
                    let flags = ph.flags();
                    flags.is_read() && flags.is_write() && flags.is_execute()
                })
                .ok_or(Error::NoRweSegment)?;
            let start = usize::try_from(rwe.offset()).map_err(|_| Error::NoRweSegment)?;
            let len = usize::try_from(rwe.file_size()).map_err(|_| Error::NoRweSegment)?;
            start..start.saturating_add(len)
        };
        let data = kernel_code
            .get(segment.clone())
            .ok_or(Error::Elf("the RWE segment lies outside the kernel code"))?;
        debug!(
            "RWE segment at {:#x}, {} bytes",
            segment.start,
            data.len()
        );

        let mut candidate = find_magic(data, 0).ok_or(Error::NoCpioMagic)?;
        let archive_len = loop {
            if let Some(len) = rootfs_archive_len(&data[candidate..]) {
                break len;
            }
            candidate = find_magic(data, candidate + MAGIC.len()).ok_or(Error::NoCpioFound)?;
        };

        let start = segment.start + candidate;
        let end = ((start + archive_len).next_multiple_of(4) + TRAILER_LEN + TRAILER_PADDING)
            .next_multiple_of(4);
        if end > kernel_code.len() {
            return Err(Error::InitramfsOutOfBounds {
                end,
                len: kernel_code.len(),
            });
        }
        debug!("Initramfs found at {:#x}..{:#x}", start, end);
        Ok(start..end)
    }

    /// The bytes of the embedded initramfs.
    pub fn initramfs(&self) -> Result<&[u8]> {
        let span = self.initramfs_span()?;
        let kernel_code = self.kernel_code().ok_or(Error::MissingKernelCode)?;
        Ok(&kernel_code[span])
    }

    /// Replaces the embedded initramfs with the archive in the file at `path`.
    pub fn add_initramfs(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let initramfs = std::fs::read(path.as_ref())?;
        debug!(
            "Read {} bytes of initramfs from {}",
            initramfs.len(),
            path.as_ref().display()
        );
        self.replace_initramfs(&initramfs)
    }

    /// Replaces the embedded initramfs with `initramfs`.
    ///
    /// The new archive can't be larger than the old span. A smaller one is
    /// right-aligned in it, after zero padding. The kernel code keeps its
    /// length.
    pub fn replace_initramfs(&mut self, initramfs: &[u8]) -> Result<()> {
        let span = self.initramfs_span()?;
        let old = span.len();
        if initramfs.len() > old {
            return Err(Error::TooLarge {
                new: initramfs.len(),
                old,
            });
        }
        let kernel_code = self.kernel_code_mut().ok_or(Error::MissingKernelCode)?;
        let region = &mut kernel_code[span];
        let padding = old - initramfs.len();
        region[..padding].fill(0);
        region[padding..].copy_from_slice(initramfs);
        Ok(())
    }
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(MAGIC.len())
        .position(|window| window == MAGIC)
        .map(|pos| from + pos)
}

/// Walks the newc records at the front of `archive`.
///
/// Returns the end of the last record's data if any record names a rootfs
/// directory or `init`, with or without a leading `./` or `/`. The walk stops
/// at the trailer or the first record that doesn't decode.
fn rootfs_archive_len(archive: &[u8]) -> Option<usize> {
    let mut is_rootfs = false;
    let mut len = 0;
    for entry in CpioDecoder::new(archive).decode_entries() {
        let Ok(entry) = entry else {
            break;
        };
        let name = entry.name().trim_start_matches("./").trim_start_matches('/');
        is_rootfs |= ROOTFS_NAMES.contains(&name);
        len = entry.data_offset() + entry.data().len();
    }
    is_rootfs.then_some(len)
}
