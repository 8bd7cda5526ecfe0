// SPDX-License-Identifier: MPL-2.0

//! A safe Rust CPIO (the newc format) decoder over an in-memory buffer.
//!
//! Besides the names and contents of the entries, the decoder reports where
//! each entry and its data start relative to the beginning of the buffer.
//! This allows callers to compute the exact byte span of an archive that is
//! embedded in a larger image.
//!
//! # Example
//!
//! ```rust
//! use cpio_decoder::CpioDecoder;
//!
//! let short_buffer: Vec<u8> = Vec::new();
//! let decoder = CpioDecoder::new(short_buffer.as_slice());
//! for entry_result in decoder.decode_entries() {
//!     println!("The entry_result is: {:?}", entry_result);
//! }
//! ```

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use int_to_c_enum::TryFromInt;

pub mod error;

#[cfg(test)]
mod test;

/// The magic of every newc header.
pub const MAGIC: &[u8] = b"070701";

/// The name of the entry which ends an archive.
pub const TRAILER_NAME: &str = "TRAILER!!!";

/// A CPIO (the newc format) decoder.
///
/// "newc" is the new portable format and CRC format.
///
/// Each file has a 110 byte header, a variable length NULL-terminated filename,
/// and variable length file data.
/// A header for a filename "TRAILER!!!" indicates the end of the archive.
///
/// All the fields in the header are ISO 646 (approximately ASCII) strings
/// of hexadecimal numbers, left padded, not NULL terminated.
pub struct CpioDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> CpioDecoder<'a> {
    /// create a decoder to decode the CPIO.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Return an iterator trying to decode the entries in the CPIO.
    pub fn decode_entries(&self) -> CpioEntryIter<'a> {
        CpioEntryIter::new(self.buffer)
    }
}

/// An iterator over the results of CPIO entries.
///
/// It stops if reaches to the trailer entry or encounters an error.
pub struct CpioEntryIter<'a> {
    buffer: &'a [u8],
    offset: usize,
    is_finished: bool,
}

impl<'a> CpioEntryIter<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            offset: 0,
            is_finished: false,
        }
    }

    /// The offset of the next entry to decode.
    ///
    /// Once the trailer has been reached, this is the offset right after it.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for CpioEntryIter<'a> {
    type Item = Result<CpioEntry<'a>>;

    fn next(&mut self) -> Option<Result<CpioEntry<'a>>> {
        // Stop to iterate entries if reaches the trailer or encounters an error.
        if self.is_finished {
            return None;
        }

        let entry_result = CpioEntry::new(self.buffer, self.offset);
        match &entry_result {
            Ok(entry) => {
                self.offset = entry.end_offset();
                // A correct CPIO buffer must end with a trailer.
                if entry.is_trailer() {
                    self.is_finished = true;
                    return None;
                }
            }
            Err(_) => {
                self.is_finished = true;
            }
        }
        Some(entry_result)
    }
}

/// A file entry in the CPIO.
#[derive(Debug)]
pub struct CpioEntry<'a> {
    metadata: FileMetadata,
    name: &'a str,
    header_offset: usize,
    data_offset: usize,
    data: &'a [u8],
}

impl<'a> CpioEntry<'a> {
    fn new(buffer: &'a [u8], header_offset: usize) -> Result<Self> {
        let header = Header::new(buffer.get(header_offset..).unwrap_or_default())?;
        let name = {
            let name_size = read_hex_bytes_to_u32(&header.name_size)? as usize;
            let name_offset = header_offset + Header::LEN;
            let name_bytes = slice_at(buffer, name_offset, name_size)?;
            let name = core::ffi::CStr::from_bytes_with_nul(name_bytes)
                .map_err(|_| Error::FileNameError)?;
            name.to_str().map_err(|_| Error::Utf8Error)?
        };
        let metadata = if name == TRAILER_NAME {
            Default::default()
        } else {
            FileMetadata::new(&header)?
        };
        let data_offset = header_offset + align_up(Header::LEN + name.len() + 1, 4);
        let data = slice_at(buffer, data_offset, metadata.size as usize)?;
        Ok(Self {
            metadata,
            name,
            header_offset,
            data_offset,
            data,
        })
    }

    /// The metadata of the file.
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// The name of the file.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The data of the file.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The offset of the entry header in the decoded buffer.
    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    /// The offset of the file data in the decoded buffer.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// The offset right after the padded file data, where the next header starts.
    pub fn end_offset(&self) -> usize {
        self.data_offset + align_up(self.data.len(), 4)
    }

    fn is_trailer(&self) -> bool {
        self.name == TRAILER_NAME
    }
}

/// The metadata of the file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileMetadata {
    ino: u32,
    type_: FileType,
    mode: u16,
    uid: u32,
    gid: u32,
    nlink: u32,
    mtime: u32,
    size: u32,
    dev_maj: u32,
    dev_min: u32,
    rdev_maj: u32,
    rdev_min: u32,
}

impl FileMetadata {
    fn new(header: &Header) -> Result<Self> {
        const MODE_MASK: u32 = 0o7777;
        const TYPE_MASK: u32 = 0o170000;
        let raw_mode = read_hex_bytes_to_u32(&header.mode)?;
        let metadata = Self {
            ino: read_hex_bytes_to_u32(&header.ino)?,
            type_: FileType::try_from(raw_mode & TYPE_MASK).map_err(|_| Error::FileTypeError)?,
            mode: (raw_mode & MODE_MASK) as u16,
            uid: read_hex_bytes_to_u32(&header.uid)?,
            gid: read_hex_bytes_to_u32(&header.gid)?,
            nlink: read_hex_bytes_to_u32(&header.nlink)?,
            mtime: read_hex_bytes_to_u32(&header.mtime)?,
            size: read_hex_bytes_to_u32(&header.file_size)?,
            dev_maj: read_hex_bytes_to_u32(&header.dev_maj)?,
            dev_min: read_hex_bytes_to_u32(&header.dev_min)?,
            rdev_maj: read_hex_bytes_to_u32(&header.rdev_maj)?,
            rdev_min: read_hex_bytes_to_u32(&header.rdev_min)?,
        };
        Ok(metadata)
    }

    /// The inode number.
    pub fn ino(&self) -> u32 {
        self.ino
    }

    /// The file type.
    pub fn file_type(&self) -> FileType {
        self.type_
    }

    /// The file permission mode, e.g., 0o0755.
    pub fn permission_mode(&self) -> u16 {
        self.mode
    }

    /// The user ID of the file owner.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// The group ID of the file owner.
    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// The number of hard links.
    pub fn nlink(&self) -> u32 {
        self.nlink
    }

    /// The last modification time.
    pub fn mtime(&self) -> u32 {
        self.mtime
    }

    /// The size of the file in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The device major ID on which the file resides.
    pub fn dev_maj(&self) -> u32 {
        self.dev_maj
    }

    /// The device minor ID on which the file resides.
    pub fn dev_min(&self) -> u32 {
        self.dev_min
    }

    /// The device major ID that the file represents. Only relevant for special file.
    pub fn rdev_maj(&self) -> u32 {
        self.rdev_maj
    }

    /// The device minor ID that the file represents. Only relevant for special file.
    pub fn rdev_min(&self) -> u32 {
        self.rdev_min
    }
}

/// The type of the file.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromInt)]
pub enum FileType {
    /// FIFO special file
    FiFo = 0o010000,
    /// Character device
    Char = 0o020000,
    /// Directory
    Dir = 0o040000,
    /// Block device
    Block = 0o060000,
    /// Regular file
    File = 0o100000,
    /// Symbolic link
    Link = 0o120000,
    /// Socket
    Socket = 0o140000,
}

impl Default for FileType {
    fn default() -> Self {
        Self::File
    }
}

struct Header {
    ino: [u8; 8],
    mode: [u8; 8],
    uid: [u8; 8],
    gid: [u8; 8],
    nlink: [u8; 8],
    mtime: [u8; 8],
    file_size: [u8; 8],
    dev_maj: [u8; 8],
    dev_min: [u8; 8],
    rdev_maj: [u8; 8],
    rdev_min: [u8; 8],
    name_size: [u8; 8],
    _chksum: [u8; 8],
}

impl Header {
    /// The size of a newc header, magic included.
    const LEN: usize = 110;

    fn new(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::BufferShortError);
        }
        if &buf[0..6] != MAGIC {
            return Err(Error::MagicError);
        }

        let field = |index: usize| {
            let start = 6 + index * 8;
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[start..start + 8]);
            bytes
        };
        Ok(Self {
            ino: field(0),
            mode: field(1),
            uid: field(2),
            gid: field(3),
            nlink: field(4),
            mtime: field(5),
            file_size: field(6),
            dev_maj: field(7),
            dev_min: field(8),
            rdev_maj: field(9),
            rdev_min: field(10),
            name_size: field(11),
            _chksum: field(12),
        })
    }
}

fn slice_at(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buffer.get(offset..end))
        .ok_or(Error::BufferShortError)
}

fn read_hex_bytes_to_u32(bytes: &[u8]) -> Result<u32> {
    debug_assert!(bytes.len() == 8);
    let string = core::str::from_utf8(bytes).map_err(|_| Error::Utf8Error)?;
    let num = u32::from_str_radix(string, 16).map_err(|_| Error::ParseIntError)?;
    Ok(num)
}

fn align_up(size: usize, align: usize) -> usize {
    debug_assert!(align >= 2 && align.is_power_of_two());
    (size + align - 1) & !(align - 1)
}
