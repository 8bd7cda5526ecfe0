// SPDX-License-Identifier: MPL-2.0

//! Splitting a bzImage into its parts and putting it back together.

use linux_boot_params::{LinuxHeader, SECTOR_SIZE, loader_type_name};
use xmas_elf::{
    ElfFile,
    header::Class,
    program::{ProgramHeader32, ProgramHeader64},
};

use crate::{
    compression::{Compression, KERNEL_COMPRESSION, read_u32_le},
    error::{Error, Result},
};

/// The load address of the protected-mode kernel.
pub const KERNEL_BASE: usize = 0x10_0000;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const CRC_LEN: usize = 4;
/// `syssize` counts the protected-mode code in 16-byte paragraphs.
const PARAGRAPH_SIZE: usize = 16;

/// A decoded bzImage.
///
/// The parts are kept exactly as read so that [`BzImage::marshal`] can lay
/// them out at their original offsets. Only the kernel code is meant to be
/// modified, and only in place: its length stays fixed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BzImage {
    header: LinuxHeader,
    boot_code: Vec<u8>,
    head_code: Vec<u8>,
    compressed: Vec<u8>,
    compression: Option<Compression>,
    kernel_code: Option<Vec<u8>>,
    tail_code: Vec<u8>,
    crc32: u32,
    kernel_base: usize,
    kernel_offset: usize,
}

impl BzImage {
    /// Decodes an image, checks its CRC32 and decompresses the kernel ELF.
    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        Self::parse(raw, true)
    }

    /// Decodes and checks an image like [`Self::unmarshal`], but leaves the
    /// kernel compressed.
    ///
    /// The result has no kernel code, so it can't be marshaled again.
    pub fn unmarshal_without_decompression(raw: &[u8]) -> Result<Self> {
        Self::parse(raw, false)
    }

    fn parse(raw: &[u8], decompress: bool) -> Result<Self> {
        debug!("Processing {} byte image", raw.len());
        let header = LinuxHeader::unmarshal(raw)?;
        debug!(
            "Header version {:#x}, loaded by {}({:#x})",
            header.version.get(),
            loader_type_name(header.type_of_loader),
            header.type_of_loader
        );

        // Nothing but the magic, the version and `syssize` is trusted before
        // the CRC32 matches.
        let end = image_end(&header, raw.len());
        let crc32 = read_u32_le(&raw[end - CRC_LEN..end]);
        let computed = checksum(&raw[..end - CRC_LEN]);
        if computed != crc32 {
            return Err(Error::ChecksumMismatch {
                stored: crc32,
                computed,
            });
        }
        let leftover = raw.len() - end;
        if leftover != 0 {
            if header.ramdisk_image.get() != 0 {
                return Err(Error::LeftoverBytes(leftover));
            }
            debug!("Ignoring {} bytes after the image", leftover);
        }

        let image = &raw[..end - CRC_LEN];
        let kernel_offset = header.kernel_offset();
        let mut cursor = LinuxHeader::SIZE;
        let boot_code = take(image, &mut cursor, kernel_offset - LinuxHeader::SIZE, "boot code")?;
        debug!("Kernel offset {:#x}, boot code {} bytes", kernel_offset, boot_code.len());
        let head_code = take(
            image,
            &mut cursor,
            header.payload_offset.get() as usize,
            "head code",
        )?;
        let compressed = take(
            image,
            &mut cursor,
            header.payload_length.get() as usize,
            "compressed payload",
        )?;
        debug!(
            "Head code {} bytes, compressed payload {} bytes",
            head_code.len(),
            compressed.len()
        );
        let tail_code = &image[cursor..];
        debug!("Tail code {} bytes, CRC32 {:#010x}", tail_code.len(), crc32);

        let (compression, kernel_code) = if decompress {
            let (compression, kernel_code) = decompress_kernel(compressed)?;
            (Some(compression), Some(kernel_code))
        } else {
            (None, None)
        };

        Ok(Self {
            header,
            boot_code: boot_code.to_vec(),
            head_code: head_code.to_vec(),
            compressed: compressed.to_vec(),
            compression,
            kernel_code,
            tail_code: tail_code.to_vec(),
            crc32,
            kernel_base: KERNEL_BASE,
            kernel_offset,
        })
    }

    /// Encodes the image, compressing the kernel code afresh.
    ///
    /// The new payload must not be larger than the one it replaces. A smaller
    /// one is right-aligned in the old payload's place, the zero padding in
    /// front of it becoming part of the head code in the header's view. The
    /// image keeps its length and a new CRC32 is appended.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let kernel_code = self.kernel_code.as_deref().ok_or(Error::MissingKernelCode)?;
        let payload = KERNEL_COMPRESSION.encode(kernel_code)?;
        let original = self.compressed.len();
        if payload.len() > original {
            return Err(Error::Oversize {
                original,
                new: payload.len(),
            });
        }

        let mut header = self.header;
        let shrink = original - payload.len();
        let payload = if shrink > 0 {
            debug!("New payload is {} bytes smaller, padding it", shrink);
            let mut padded = vec![0u8; original];
            padded[shrink..].copy_from_slice(&payload);
            // The payload fields are u32 and `shrink` is less than the old length.
            let shrink = shrink as u32;
            header
                .payload_offset
                .set(header.payload_offset.get() + shrink);
            header
                .payload_length
                .set(header.payload_length.get() - shrink);
            padded
        } else {
            payload
        };

        let mut image = header.marshal();
        image.extend_from_slice(&self.boot_code);
        image.extend_from_slice(&self.head_code);
        image.extend_from_slice(&payload);
        image.extend_from_slice(&self.tail_code);
        let crc32 = checksum(&image);
        image.extend_from_slice(&crc32.to_le_bytes());
        debug!("Marshaled {} bytes, CRC32 {:#010x}", image.len(), crc32);
        Ok(image)
    }

    pub fn header(&self) -> &LinuxHeader {
        &self.header
    }

    /// The real-mode setup code between the header and the protected-mode kernel.
    pub fn boot_code(&self) -> &[u8] {
        &self.boot_code
    }

    /// The decompressor, in front of the compressed payload.
    pub fn head_code(&self) -> &[u8] {
        &self.head_code
    }

    /// The compressed payload as read from the image, size trailer included.
    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    /// The format of the compressed payload, if it was decompressed.
    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// The decompressed kernel ELF.
    pub fn kernel_code(&self) -> Option<&[u8]> {
        self.kernel_code.as_deref()
    }

    /// The decompressed kernel ELF, for patching in place.
    pub fn kernel_code_mut(&mut self) -> Option<&mut [u8]> {
        self.kernel_code.as_deref_mut()
    }

    /// The code after the compressed payload, up to the CRC32.
    pub fn tail_code(&self) -> &[u8] {
        &self.tail_code
    }

    /// The CRC32 read from the image.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn kernel_base(&self) -> usize {
        self.kernel_base
    }

    /// The file offset of the protected-mode kernel.
    pub fn kernel_offset(&self) -> usize {
        self.kernel_offset
    }

    /// Whether the image was decoded without decompressing the kernel.
    pub fn no_decompress(&self) -> bool {
        self.kernel_code.is_none()
    }

    /// Views the kernel code as an ELF file.
    ///
    /// The program header table must lie within the kernel code, so the
    /// program headers can be iterated over safely.
    pub fn elf(&self) -> Result<ElfFile<'_>> {
        let kernel_code = self.kernel_code.as_deref().ok_or(Error::MissingKernelCode)?;
        let elf = ElfFile::new(kernel_code).map_err(Error::Elf)?;
        check_program_headers(&elf, kernel_code.len())?;
        Ok(elf)
    }

    /// Describes how `self` and `other` differ, one line per difference.
    ///
    /// Returns an empty string for equal images.
    pub fn diff(&self, other: &Self) -> String {
        let mut lines = self.header.diff(&other.header);
        let mut compare_len = |name: &str, ours: Option<usize>, theirs: Option<usize>| {
            if ours != theirs {
                lines.push(format!(
                    "{} length: {} != {}",
                    name,
                    describe_len(ours),
                    describe_len(theirs)
                ));
            }
        };
        compare_len(
            "boot code",
            Some(self.boot_code.len()),
            Some(other.boot_code.len()),
        );
        compare_len(
            "head code",
            Some(self.head_code.len()),
            Some(other.head_code.len()),
        );
        compare_len(
            "kernel code",
            self.kernel_code.as_ref().map(Vec::len),
            other.kernel_code.as_ref().map(Vec::len),
        );
        compare_len(
            "tail code",
            Some(self.tail_code.len()),
            Some(other.tail_code.len()),
        );
        if self.kernel_base != other.kernel_base {
            lines.push(format!(
                "kernel base: {:#x} != {:#x}",
                self.kernel_base, other.kernel_base
            ));
        }
        if self.kernel_offset != other.kernel_offset {
            lines.push(format!(
                "kernel offset: {:#x} != {:#x}",
                self.kernel_offset, other.kernel_offset
            ));
        }
        lines.into_iter().map(|line| line + "\n").collect()
    }
}

/// Decodes two raw images and fails with [`Error::Mismatch`] if they differ.
///
/// The images are compared by header, boot code and kernel code, so the
/// compressed payloads may differ as long as they decompress to the same kernel.
pub fn equal(a: &[u8], b: &[u8]) -> Result<()> {
    let a = BzImage::unmarshal(a)?;
    let b = BzImage::unmarshal(b)?;
    let diff = a.diff(&b);
    if !diff.is_empty() {
        return Err(Error::Mismatch(diff));
    }
    if a.boot_code != b.boot_code {
        return Err(Error::Mismatch("boot code contents differ".to_string()));
    }
    if a.kernel_code != b.kernel_code {
        return Err(Error::Mismatch("kernel code contents differ".to_string()));
    }
    Ok(())
}

/// The CRC32 stored at the end of a bzImage.
///
/// This is the IEEE CRC32 of `bytes` with its final inversion undone, as the
/// kernel's `build` tool computes it.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes) ^ 0xffff_ffff
}

fn take<'a>(
    raw: &'a [u8],
    cursor: &mut usize,
    len: usize,
    region: &'static str,
) -> Result<&'a [u8]> {
    let start = *cursor;
    let bytes = start
        .checked_add(len)
        .and_then(|end| raw.get(start..end))
        .ok_or(Error::Truncated {
            region,
            need: len,
            have: raw.len().saturating_sub(start),
        })?;
    *cursor += len;
    Ok(bytes)
}

/// Where the image ends, CRC32 included.
///
/// `syssize` tells the length of the protected-mode code, which lets a file
/// carry other bytes after the image. An unset or implausible `syssize` means
/// the image spans the whole file.
fn image_end(header: &LinuxHeader, raw_len: usize) -> usize {
    let syssize = header.syssize.get() as usize;
    let declared = header.kernel_offset() + syssize * PARAGRAPH_SIZE;
    if syssize != 0 && declared <= raw_len {
        declared
    } else {
        debug!(
            "syssize {:#x} doesn't fit the {} byte file, using the file length",
            syssize, raw_len
        );
        raw_len
    }
}

fn decompress_kernel(compressed: &[u8]) -> Result<(Compression, Vec<u8>)> {
    let compression = Compression::detect(compressed)?;
    debug!(
        "Decompressing {} bytes of {} payload",
        compressed.len(),
        compression
    );
    let kernel_code = compression.decode(compressed)?;
    if compression.has_size_trailer() {
        let (_, declared) = crate::compression::strip_size(compressed)?;
        if declared as usize != kernel_code.len() {
            return Err(Error::DecompressionSizeMismatch {
                declared,
                actual: kernel_code.len(),
            });
        }
    }
    if !kernel_code.starts_with(&ELF_MAGIC) {
        return Err(Error::NotElf(
            kernel_code[..kernel_code.len().min(ELF_MAGIC.len())].to_vec(),
        ));
    }
    debug!("Kernel code is {} bytes", kernel_code.len());
    Ok((compression, kernel_code))
}

fn check_program_headers(elf: &ElfFile<'_>, len: usize) -> Result<()> {
    let ph_entry_size = match elf.header.pt1.class() {
        Class::SixtyFour => size_of::<ProgramHeader64>(),
        Class::ThirtyTwo => size_of::<ProgramHeader32>(),
        Class::None | Class::Other(_) => return Err(Error::Elf("unknown ELF class")),
    } as u64;
    let pt2 = &elf.header.pt2;
    if pt2.ph_entry_size() as u64 != ph_entry_size {
        return Err(Error::Elf("the size of ELF program headers is invalid"));
    }
    let ph_offset = pt2.ph_offset();
    let len = len as u64;
    if ph_offset >= len || (len - ph_offset) / ph_entry_size < pt2.ph_count() as u64 {
        return Err(Error::Elf("the ELF program headers lie outside the kernel code"));
    }
    Ok(())
}

fn describe_len(len: Option<usize>) -> String {
    len.map_or_else(|| "none".to_string(), |len| len.to_string())
}

// The kernel offset is at least two sectors, so the boot code length can't underflow.
const _: () = assert!(LinuxHeader::SIZE < 2 * SECTOR_SIZE);
