// SPDX-License-Identifier: MPL-2.0

//! Reading, validating, rewriting and patching Linux x86 bzImage files.
//!
//! A bzImage is a sandwich. The first sector holds the vestigial MBR code and
//! the boot protocol header, followed by the rest of the real-mode setup code.
//! The protected-mode part starts with the decompressor ("head code"), then
//! the compressed kernel ELF, then code called by the early kernel ("tail
//! code"), and finally a CRC32 of everything before it. None of these parts
//! can be moved without relinking, so every rewrite done here keeps the
//! layout: the compressed kernel may shrink but never grow, and an embedded
//! initramfs may only be replaced by one that fits in its place.
//!
//! # Example
//!
//! ```no_run
//! use linux_bzimage::BzImage;
//!
//! let raw = std::fs::read("bzImage").unwrap();
//! let mut image = BzImage::unmarshal(&raw).unwrap();
//! image.add_initramfs("initramfs.cpio").unwrap();
//! std::fs::write("bzImage.new", image.marshal().unwrap()).unwrap();
//! ```

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod compression;
mod error;
mod image;
#[cfg(feature = "initramfs")]
mod initramfs;
pub mod kver;
#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use linux_boot_params::{HeaderError, LinuxHeader};

pub use self::{
    compression::Compression,
    error::{Error, Result},
    image::{BzImage, KERNEL_BASE, checksum, equal},
    kver::{KInfo, read_kernel_version},
};
