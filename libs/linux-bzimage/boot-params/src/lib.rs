// SPDX-License-Identifier: MPL-2.0

//! The definition of the Linux x86 Boot Protocol setup header, as found at
//! the very beginning of a bzImage file.
//!
//! A bzImage starts with a legacy boot sector followed by the setup header
//! that the boot protocol describes. [`LinuxHeader`] covers both, from the
//! vestigial MBR code at offset 0x000 up to the `handover_offset` field at
//! 0x264, so that the first [`LinuxHeader::SIZE`] bytes of an image can be
//! decoded and encoded without loss.
//!
//! Originally defined in the linux source tree:
//! `linux/arch/x86/include/uapi/asm/bootparam.h` and
//! `linux/Documentation/arch/x86/boot.rst`.

use core::fmt;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::little_endian::{U16, U32, U64},
};

/// Magic stored in the boot protocol header, as raw bytes.
pub const HEADER_MAGIC: [u8; 4] = *b"HdrS";

/// The legacy boot sector signature at offset 0x1fe.
pub const BOOT_FLAG: u16 = 0xaa55;

/// The oldest boot protocol version whose header carries the payload fields.
pub const MIN_PROTOCOL_VERSION: u16 = 0x0208;

/// The size of a sector in the real-mode setup code.
pub const SECTOR_SIZE: usize = 512;

/// Errors of decoding a [`LinuxHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("not a bzImage: need {need} header bytes, got {0}", need = LinuxHeader::SIZE)]
    Truncated(usize),
    #[error("not a bzImage: magic should be {expected:02x?}, and is {0:02x?}", expected = HEADER_MAGIC)]
    BadMagic([u8; 4]),
    #[error("boot protocol version {0:#06x} is older than {min:#06x}", min = MIN_PROTOCOL_VERSION)]
    UnsupportedVersion(u16),
}

/// Linux x86 boot sector and setup header.
///
/// All multi-byte fields are little-endian and unaligned; the record has no
/// padding, so its in-memory representation is its on-disk representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct LinuxHeader {
    pub mbr_code: [u8; 0xc0],                /* 0x000 */
    pub ext_ramdisk_image: U32,              /* 0x0c0 */
    pub ext_ramdisk_size: U32,               /* 0x0c4 */
    pub ext_cmd_line_ptr: U32,               /* 0x0c8 */
    pub _pad: [u8; 0x1f1 - 0xcc],            /* 0x0cc */
    pub setup_sects: u8,                     /* 0x1f1 */
    pub root_flags: U16,                     /* 0x1f2 */
    pub syssize: U32,                        /* 0x1f4 */
    pub ram_size: U16,                       /* 0x1f8 */
    pub vid_mode: U16,                       /* 0x1fa */
    pub root_dev: U16,                       /* 0x1fc */
    pub boot_flag: U16,                      /* 0x1fe */
    pub jump: U16,                           /* 0x200 */
    pub header: [u8; 4],                     /* 0x202 */
    pub version: U16,                        /* 0x206 */
    pub realmode_swtch: U32,                 /* 0x208 */
    pub start_sys_seg: U16,                  /* 0x20c */
    /// Offset of the kernel version string, minus 0x200.
    pub kernel_version: U16,                 /* 0x20e */
    pub type_of_loader: u8,                  /* 0x210 */
    pub loadflags: u8,                       /* 0x211 */
    pub setup_move_size: U16,                /* 0x212 */
    pub code32_start: U32,                   /* 0x214 */
    pub ramdisk_image: U32,                  /* 0x218 */
    pub ramdisk_size: U32,                   /* 0x21c */
    pub bootsect_kludge: [u8; 4],            /* 0x220 */
    pub heap_end_ptr: U16,                   /* 0x224 */
    pub ext_loader_ver: u8,                  /* 0x226 */
    pub ext_loader_type: u8,                 /* 0x227 */
    pub cmd_line_ptr: U32,                   /* 0x228 */
    pub initrd_addr_max: U32,                /* 0x22c */
    pub kernel_alignment: U32,               /* 0x230 */
    pub relocatable_kernel: u8,              /* 0x234 */
    pub min_alignment: u8,                   /* 0x235 */
    pub xloadflags: U16,                     /* 0x236 */
    pub cmdline_size: U32,                   /* 0x238 */
    pub hardware_subarch: U32,               /* 0x23c */
    pub hardware_subarch_data: U64,          /* 0x240 */
    /// Offset of the compressed payload from the start of the protected-mode code.
    pub payload_offset: U32,                 /* 0x248 */
    pub payload_length: U32,                 /* 0x24c */
    pub setup_data: U64,                     /* 0x250 */
    pub pref_address: U64,                   /* 0x258 */
    pub init_size: U32,                      /* 0x260 */
    pub handover_offset: U32,                /* 0x264 */
}

const _: () = assert!(size_of::<LinuxHeader>() == LinuxHeader::SIZE);

impl LinuxHeader {
    /// The number of bytes the header occupies at the start of an image.
    pub const SIZE: usize = 0x268;

    /// Decodes the header from the front of `bytes`.
    ///
    /// Only the first [`Self::SIZE`] bytes are looked at. The header magic must
    /// be `"HdrS"` and the protocol version at least 2.08.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self, HeaderError> {
        let (header, _) =
            Self::read_from_prefix(bytes).map_err(|_| HeaderError::Truncated(bytes.len()))?;
        if header.header != HEADER_MAGIC {
            return Err(HeaderError::BadMagic(header.header));
        }
        if header.version.get() < MIN_PROTOCOL_VERSION {
            return Err(HeaderError::UnsupportedVersion(header.version.get()));
        }
        Ok(header)
    }

    /// Encodes the header into its [`Self::SIZE`] on-disk bytes.
    pub fn marshal(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// The file offset of the protected-mode kernel, `(setup_sects + 1) * 512`.
    ///
    /// A zero `setup_sects` means 4, as in the boot protocol.
    pub fn kernel_offset(&self) -> usize {
        let setup_sects = match self.setup_sects {
            0 => 4,
            sects => sects as usize,
        };
        (setup_sects + 1) * SECTOR_SIZE
    }

    /// Lists every field with its value, in layout order.
    pub fn fields(&self) -> Vec<Field> {
        vec![
            Field::bytes("mbr_code", &self.mbr_code),
            Field::int("ext_ramdisk_image", self.ext_ramdisk_image.get()),
            Field::int("ext_ramdisk_size", self.ext_ramdisk_size.get()),
            Field::int("ext_cmd_line_ptr", self.ext_cmd_line_ptr.get()),
            Field::bytes("_pad", &self._pad),
            Field::int("setup_sects", self.setup_sects),
            Field::int("root_flags", self.root_flags.get()),
            Field::int("syssize", self.syssize.get()),
            Field::int("ram_size", self.ram_size.get()),
            Field::int("vid_mode", self.vid_mode.get()),
            Field::int("root_dev", self.root_dev.get()),
            Field::int("boot_flag", self.boot_flag.get()),
            Field::int("jump", self.jump.get()),
            Field::bytes("header", &self.header),
            Field::int("version", self.version.get()),
            Field::int("realmode_swtch", self.realmode_swtch.get()),
            Field::int("start_sys_seg", self.start_sys_seg.get()),
            Field::int("kernel_version", self.kernel_version.get()),
            Field::int("type_of_loader", self.type_of_loader),
            Field::int("loadflags", self.loadflags),
            Field::int("setup_move_size", self.setup_move_size.get()),
            Field::int("code32_start", self.code32_start.get()),
            Field::int("ramdisk_image", self.ramdisk_image.get()),
            Field::int("ramdisk_size", self.ramdisk_size.get()),
            Field::bytes("bootsect_kludge", &self.bootsect_kludge),
            Field::int("heap_end_ptr", self.heap_end_ptr.get()),
            Field::int("ext_loader_ver", self.ext_loader_ver),
            Field::int("ext_loader_type", self.ext_loader_type),
            Field::int("cmd_line_ptr", self.cmd_line_ptr.get()),
            Field::int("initrd_addr_max", self.initrd_addr_max.get()),
            Field::int("kernel_alignment", self.kernel_alignment.get()),
            Field::int("relocatable_kernel", self.relocatable_kernel),
            Field::int("min_alignment", self.min_alignment),
            Field::int("xloadflags", self.xloadflags.get()),
            Field::int("cmdline_size", self.cmdline_size.get()),
            Field::int("hardware_subarch", self.hardware_subarch.get()),
            Field::int("hardware_subarch_data", self.hardware_subarch_data.get()),
            Field::int("payload_offset", self.payload_offset.get()),
            Field::int("payload_length", self.payload_length.get()),
            Field::int("setup_data", self.setup_data.get()),
            Field::int("pref_address", self.pref_address.get()),
            Field::int("init_size", self.init_size.get()),
            Field::int("handover_offset", self.handover_offset.get()),
        ]
    }

    /// Describes the fields whose values differ between `self` and `other`.
    ///
    /// Returns an empty vector for equal headers.
    pub fn diff(&self, other: &Self) -> Vec<String> {
        self.fields()
            .into_iter()
            .zip(other.fields())
            .filter(|(ours, theirs)| ours != theirs)
            .map(|(ours, theirs)| format!("{} != {}", ours, theirs))
            .collect()
    }
}

impl fmt::Display for LinuxHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in self.fields() {
            writeln!(f, "{}", field)?;
        }
        Ok(())
    }
}

/// A named header field and its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub value: FieldValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Int(u64),
    Bytes(Vec<u8>),
}

impl Field {
    fn int(name: &'static str, value: impl Into<u64>) -> Self {
        Self {
            name,
            value: FieldValue::Int(value.into()),
        }
    }

    fn bytes(name: &'static str, value: &[u8]) -> Self {
        Self {
            name,
            value: FieldValue::Bytes(value.to_vec()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FieldValue::Int(value) => write!(f, "{}:{:#04x}", self.name, value),
            FieldValue::Bytes(bytes) => {
                write!(f, "{}:0x", self.name)?;
                bytes.iter().try_for_each(|byte| write!(f, "{:02x}", byte))
            }
        }
    }
}

/// Names the boot loader recorded in the `type_of_loader` field.
pub fn loader_type_name(type_of_loader: u8) -> &'static str {
    match type_of_loader >> 4 {
        0x0 => "LILO",
        0x1 => "Loadlin",
        0x2 => "bootsect-loader",
        0x3 => "Syslinux",
        0x4 => "Etherboot/gPXE/iPXE",
        0x5 => "ELILO",
        0x7 => "GRUB",
        0x8 => "U-Boot",
        0x9 => "Xen",
        0xa => "Gujin",
        0xb => "Qemu",
        0xc => "Arcturus Networks uCbootloader",
        0xd => "kexec-tools",
        0xe => "extended",
        0xf => "special",
        _ => "unknown",
    }
}
