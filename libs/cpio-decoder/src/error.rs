// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

pub type Result<T> = core::result::Result<T, self::Error>;

/// Errors while decoding the CPIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("the buffer ends in the middle of an entry")]
    BufferShortError,
    #[error("the entry does not start with the newc magic")]
    MagicError,
    #[error("the entry contains invalid UTF-8")]
    Utf8Error,
    #[error("the entry header contains an invalid hexadecimal number")]
    ParseIntError,
    #[error("the entry has an unknown file type")]
    FileTypeError,
    #[error("the entry name is not NUL-terminated")]
    FileNameError,
}
