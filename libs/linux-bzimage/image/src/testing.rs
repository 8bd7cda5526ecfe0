// SPDX-License-Identifier: MPL-2.0

//! Builders of synthetic kernels, initramfs archives and bzImages.
//!
//! The images are small but follow the real layout, so they go through the
//! same code paths as a distribution kernel does.

use core::ops::Range;

use libflate::gzip;
use linux_boot_params::{BOOT_FLAG, HEADER_MAGIC, LinuxHeader};

use crate::{compression::Compression, image::checksum};

/// Where the single segment of [`kernel_elf`] starts in the file.
pub const SEGMENT_OFFSET: usize = 0x1000;
/// The virtual address of the single segment of [`kernel_elf`].
pub const SEGMENT_VADDR: u64 = 0x100_0000;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;
pub const PF_RWX: u32 = PF_R | PF_W | PF_X;

/// Builds an ELF64 x86-64 executable with one loadable segment.
pub fn kernel_elf(segment: &[u8], flags: u32) -> Vec<u8> {
    let mut elf = vec![0u8; SEGMENT_OFFSET];
    elf[..4].copy_from_slice(b"\x7fELF");
    elf[4] = 2; // ELFCLASS64
    elf[5] = 1; // ELFDATA2LSB
    elf[6] = 1; // EV_CURRENT
    put(&mut elf, 16, &2u16.to_le_bytes()); // ET_EXEC
    put(&mut elf, 18, &0x3eu16.to_le_bytes()); // EM_X86_64
    put(&mut elf, 20, &1u32.to_le_bytes());
    put(&mut elf, 24, &SEGMENT_VADDR.to_le_bytes());
    put(&mut elf, 32, &64u64.to_le_bytes()); // e_phoff
    put(&mut elf, 52, &64u16.to_le_bytes()); // e_ehsize
    put(&mut elf, 54, &56u16.to_le_bytes()); // e_phentsize
    put(&mut elf, 56, &1u16.to_le_bytes()); // e_phnum
    put(&mut elf, 58, &64u16.to_le_bytes()); // e_shentsize

    let phdr = 64;
    put(&mut elf, phdr, &1u32.to_le_bytes()); // PT_LOAD
    put(&mut elf, phdr + 4, &flags.to_le_bytes());
    put(&mut elf, phdr + 8, &(SEGMENT_OFFSET as u64).to_le_bytes());
    put(&mut elf, phdr + 16, &SEGMENT_VADDR.to_le_bytes());
    put(&mut elf, phdr + 24, &SEGMENT_VADDR.to_le_bytes());
    put(&mut elf, phdr + 32, &(segment.len() as u64).to_le_bytes());
    put(&mut elf, phdr + 40, &(segment.len() as u64).to_le_bytes());
    put(&mut elf, phdr + 48, &0x1000u64.to_le_bytes());

    elf.extend_from_slice(segment);
    elf
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// A file to put in a newc archive.
#[derive(Clone, Copy, Debug)]
pub struct NewcFile<'a> {
    pub name: &'a str,
    pub mode: u32,
    pub data: &'a [u8],
}

impl<'a> NewcFile<'a> {
    pub fn dir(name: &'a str) -> Self {
        Self {
            name,
            mode: 0o040755,
            data: &[],
        }
    }

    pub fn file(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            mode: 0o100755,
            data,
        }
    }
}

/// Builds a newc archive of `files`, trailer included.
pub fn newc_archive(files: &[NewcFile]) -> Vec<u8> {
    let mut archive = Vec::new();
    for (ino, file) in files.iter().enumerate() {
        push_newc_record(&mut archive, ino as u32 + 1, file);
    }
    push_newc_record(
        &mut archive,
        0,
        &NewcFile {
            name: "TRAILER!!!",
            mode: 0,
            data: &[],
        },
    );
    archive
}

fn push_newc_record(archive: &mut Vec<u8>, ino: u32, file: &NewcFile) {
    let fields = [
        ino,
        file.mode,
        0,
        0,
        1,
        0,
        file.data.len() as u32,
        0,
        0,
        0,
        0,
        file.name.len() as u32 + 1,
        0,
    ];
    archive.extend_from_slice(b"070701");
    for field in fields {
        archive.extend_from_slice(format!("{:08x}", field).as_bytes());
    }
    archive.extend_from_slice(file.name.as_bytes());
    archive.push(0);
    archive.resize(archive.len().next_multiple_of(4), 0);
    archive.extend_from_slice(file.data);
    archive.resize(archive.len().next_multiple_of(4), 0);
}

/// A kernel ELF with an initramfs in its RWE segment.
#[derive(Clone, Debug)]
pub struct SampleKernel {
    pub elf: Vec<u8>,
    /// Where the initramfs lies in `elf`.
    pub initramfs: Range<usize>,
}

/// Builds a kernel ELF embedding `archive` the way the kernel build does.
///
/// A stray newc magic followed by garbage comes first in the segment, so a
/// search has to skip it. The archive is followed by zero padding.
pub fn sample_kernel(archive: &[u8]) -> SampleKernel {
    let mut segment = vec![0xcc; 64];
    segment.extend_from_slice(b"070701 is not a header here");
    segment.extend_from_slice(&[b'z'; 128]);
    segment.resize(segment.len().next_multiple_of(4), 0);
    let start = SEGMENT_OFFSET + segment.len();
    segment.extend_from_slice(archive);
    segment.extend_from_slice(&[0; 512]);
    SampleKernel {
        elf: kernel_elf(&segment, PF_RWX),
        initramfs: start..start + archive.len(),
    }
}

/// The initramfs that [`sample_image`] embeds.
pub fn sample_initramfs() -> Vec<u8> {
    newc_archive(&[
        NewcFile::dir("dev"),
        NewcFile::dir("bin"),
        NewcFile::file("init", b"#!/bin/sh\nexec /bin/sh\n"),
    ])
}

/// A gzip bzImage of [`sample_kernel`] carrying [`sample_initramfs`].
pub fn sample_image() -> Vec<u8> {
    ImageBuilder::new(sample_kernel(&sample_initramfs()).elf).build()
}

/// The version string that [`ImageBuilder`] puts in the boot code by default.
pub const SAMPLE_VERSION: &str =
    "4.19.16-norm_boot (user@host) #300 SMP Fri Jan 25 11:27:41 PST 2019";

/// Where [`ImageBuilder`] puts the version string in the boot code.
const VERSION_IN_BOOT_CODE: usize = 0x40;

/// Builds bzImages around a kernel ELF.
#[derive(Clone, Debug)]
pub struct ImageBuilder {
    kernel: Vec<u8>,
    payload: Option<Vec<u8>>,
    compression: Compression,
    setup_sects: u8,
    ramdisk_image: u32,
    head_code: Vec<u8>,
    tail_code: Vec<u8>,
    version: Option<String>,
}

impl ImageBuilder {
    pub fn new(kernel: Vec<u8>) -> Self {
        Self {
            kernel,
            payload: None,
            compression: Compression::Gzip,
            setup_sects: 0x1e,
            ramdisk_image: 0,
            head_code: vec![0x90; 0x255],
            tail_code: b"tail code".to_vec(),
            version: Some(SAMPLE_VERSION.to_string()),
        }
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Uses `payload` as the compressed kernel, as is.
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn setup_sects(mut self, setup_sects: u8) -> Self {
        self.setup_sects = setup_sects;
        self
    }

    pub fn ramdisk_image(mut self, ramdisk_image: u32) -> Self {
        self.ramdisk_image = ramdisk_image;
        self
    }

    pub fn head_code(mut self, head_code: Vec<u8>) -> Self {
        self.head_code = head_code;
        self
    }

    pub fn tail_code(mut self, tail_code: Vec<u8>) -> Self {
        self.tail_code = tail_code;
        self
    }

    pub fn version(mut self, version: Option<&str>) -> Self {
        self.version = version.map(str::to_string);
        self
    }

    /// The compressed kernel the image will carry.
    pub fn compressed(&self) -> Vec<u8> {
        match &self.payload {
            Some(payload) => payload.clone(),
            None => self
                .compression
                .encode(&self.kernel)
                .expect("failed to compress the sample kernel"),
        }
    }

    /// Lays out the image and appends its CRC32.
    ///
    /// The tail code is padded so that the protected-mode part, CRC32
    /// included, fills whole paragraphs, as `syssize` requires.
    pub fn build(&self) -> Vec<u8> {
        let payload = self.compressed();
        let mut header = sample_header();
        header.setup_sects = self.setup_sects;
        header.ramdisk_image.set(self.ramdisk_image);
        header.payload_offset.set(self.head_code.len() as u32);
        header.payload_length.set(payload.len() as u32);

        let kernel_offset = header.kernel_offset();
        let mut boot_code = vec![0u8; kernel_offset - LinuxHeader::SIZE];
        if let Some(version) = &self.version {
            let at = VERSION_IN_BOOT_CODE;
            boot_code[at..at + version.len()].copy_from_slice(version.as_bytes());
            header
                .kernel_version
                .set((LinuxHeader::SIZE + at - 0x200) as u16);
        } else {
            header.kernel_version.set(0);
        }

        let mut protected = self.head_code.clone();
        protected.extend_from_slice(&payload);
        protected.extend_from_slice(&self.tail_code);
        protected.resize((protected.len() + 4).next_multiple_of(16) - 4, 0);
        header.syssize.set(((protected.len() + 4) / 16) as u32);

        let mut image = header.marshal();
        image.extend_from_slice(&boot_code);
        image.extend_from_slice(&protected);
        let crc32 = checksum(&image);
        image.extend_from_slice(&crc32.to_le_bytes());
        image
    }
}

/// A header as a 2.13 kernel would carry it.
pub fn sample_header() -> LinuxHeader {
    let mut bytes = vec![0u8; LinuxHeader::SIZE];
    bytes[0x202..0x206].copy_from_slice(&HEADER_MAGIC);
    bytes[0x206..0x208].copy_from_slice(&0x020du16.to_le_bytes());
    let mut header = LinuxHeader::unmarshal(&bytes).expect("failed to decode a blank header");
    header.setup_sects = 0x1e;
    header.boot_flag.set(BOOT_FLAG);
    header.jump.set(0x66eb);
    header.kernel_version.set(0x3140);
    header.loadflags = 0x01;
    header.code32_start.set(0x10_0000);
    header.kernel_alignment.set(0x20_0000);
    header.relocatable_kernel = 1;
    header.xloadflags.set(0x7f);
    header.cmdline_size.set(0x7ff);
    header.payload_offset.set(0x255);
    header.init_size.set(0x1c0_0000);
    header
}

/// Gzip with stored blocks, which is about as large as the input.
pub fn stored_gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let options = gzip::EncodeOptions::new().no_compression();
    let mut encoder =
        gzip::Encoder::with_options(Vec::new(), options).expect("failed to create a gzip encoder");
    encoder
        .write_all(data)
        .expect("failed to write to a gzip encoder");
    encoder
        .finish()
        .into_result()
        .expect("failed to finish a gzip stream")
}

/// Bytes no compressor can shrink.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}
