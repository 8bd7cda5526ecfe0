// SPDX-License-Identifier: MPL-2.0

//! The kernel version string in the setup code and its parts.
//!
//! The string is what `uname -r` and `uname -v` print, with the builder in
//! between, e.g.
//! `4.19.16-norm_boot (user@host) #300 SMP Fri Jan 25 11:27:41 PST 2019`.

use core::{fmt, str::FromStr};
use std::io::{Read, Seek, SeekFrom};

use linux_boot_params::{HEADER_MAGIC, LinuxHeader};
use serde::Serialize;
use time::{OffsetDateTime, PrimitiveDateTime, macros::format_description};

use crate::{
    error::{Error, Result},
    image::BzImage,
};

const BOOT_SIGNATURE_OFFSET: usize = 510;
const HEADER_SIGNATURE_OFFSET: usize = 514;
/// Where the `kernel_version` header field lives.
const VERSION_FIELD_OFFSET: usize = 526;
/// `kernel_version` points this far before the string.
const VERSION_BASE: usize = 0x200;
const MAX_VERSION_LEN: u64 = 1024;

/// Reads the kernel version string from the start of a bzImage.
///
/// Only the boot sector and the string itself are read, so this works on a
/// large image without loading it.
pub fn read_kernel_version<R: Read + Seek>(image: &mut R) -> Result<String> {
    let mut sector = [0u8; VERSION_FIELD_OFFSET + 2];
    image.seek(SeekFrom::Start(0))?;
    image.read_exact(&mut sector)?;
    if sector[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2] != [0x55, 0xaa] {
        return Err(Error::BadBootSignature);
    }
    if sector[HEADER_SIGNATURE_OFFSET..HEADER_SIGNATURE_OFFSET + 4] != HEADER_MAGIC {
        return Err(Error::BadHeaderSignature);
    }
    let offset = u16::from_le_bytes([
        sector[VERSION_FIELD_OFFSET],
        sector[VERSION_FIELD_OFFSET + 1],
    ]);
    if offset == 0 {
        return Err(Error::NullVersionOffset);
    }

    image.seek(SeekFrom::Start(offset as u64 + VERSION_BASE as u64))?;
    let mut buf = Vec::new();
    image.by_ref().take(MAX_VERSION_LEN).read_to_end(&mut buf)?;
    Ok(until_nul(&buf))
}

impl BzImage {
    /// The kernel version string, looked up in the boot code.
    pub fn kernel_version(&self) -> Result<String> {
        let offset = self.header().kernel_version.get() as usize;
        if offset == 0 {
            return Err(Error::NullVersionOffset);
        }
        let boot_code = self.boot_code();
        let file_offset = offset + VERSION_BASE;
        let start = file_offset
            .checked_sub(LinuxHeader::SIZE)
            .filter(|start| *start < boot_code.len())
            .ok_or(Error::VersionOutOfBounds {
                offset: file_offset,
                len: boot_code.len(),
            })?;
        let end = boot_code.len().min(start + MAX_VERSION_LEN as usize);
        Ok(until_nul(&boot_code[start..end]))
    }
}

fn until_nul(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

/// The parts of a kernel version string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KInfo {
    /// The release, as `uname -r` prints it, e.g. "4.19.16-norm_boot".
    pub release: String,
    /// The version, as `uname -v` prints it, e.g. "#300 SMP Fri Jan 25 11:27:41 PST 2019".
    pub version: String,
    /// Who built the kernel, e.g. "user@host".
    pub builder: String,
    pub build_num: u64,
    /// The build time. The zone abbreviation is not resolved, the time is taken as UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub build_time: OffsetDateTime,
    pub maj: u64,
    pub min: u64,
    pub patch: u64,
    /// What follows the patch level in the release, e.g. "norm_boot".
    pub local_ver: String,
}

impl KInfo {
    /// Splits a kernel version string into its parts.
    pub fn parse_desc(desc: &str) -> Result<Self> {
        let fail = |reason| Error::Parse {
            desc: desc.to_string(),
            reason,
        };

        let mut halves = desc.split('#');
        let (Some(release_part), Some(version_part), None) =
            (halves.next(), halves.next(), halves.next())
        else {
            return Err(fail("expected exactly one '#'"));
        };

        let (release, builder) = match release_part.split_once('(') {
            None => (release_part.trim(), ""),
            Some((release, rest)) => {
                let builder = rest
                    .trim_end()
                    .strip_suffix(')')
                    .ok_or_else(|| fail("unterminated builder"))?;
                if builder.contains(['(', ')']) {
                    return Err(fail("more than one builder"));
                }
                (release.trim(), builder.trim())
            }
        };
        if release.is_empty() {
            return Err(fail("empty release"));
        }

        let version = format!("#{}", version_part.trim_end());
        let words: Vec<&str> = version_part.split_whitespace().collect();
        let build_num = words
            .first()
            .and_then(|num| num.parse().ok())
            .ok_or_else(|| fail("bad build number"))?;
        // The build number comes first, the six words of the build time last.
        let Some(time_at) = words.len().checked_sub(6).filter(|&at| at > 0) else {
            return Err(fail("no build time"));
        };
        let build_time =
            parse_build_time(&words[time_at..]).ok_or_else(|| fail("bad build time"))?;

        let mut numbers = release.splitn(3, '.');
        let (Some(maj), Some(min), Some(rest)) = (numbers.next(), numbers.next(), numbers.next())
        else {
            return Err(fail("release has less than 3 parts"));
        };
        let (patch, local_ver) = rest.split_once('-').unwrap_or((rest, ""));
        let number = |part: &str| part.parse::<u64>().map_err(|_| fail("bad release number"));

        Ok(Self {
            release: release.to_string(),
            version,
            builder: builder.to_string(),
            build_num,
            build_time,
            maj: number(maj)?,
            min: number(min)?,
            patch: number(patch)?,
            local_ver: local_ver.to_string(),
        })
    }
}

impl FromStr for KInfo {
    type Err = Error;

    fn from_str(desc: &str) -> Result<Self> {
        Self::parse_desc(desc)
    }
}

impl fmt::Display for KInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.builder.is_empty() {
            write!(f, "{} {}", self.release, self.version)
        } else {
            write!(f, "{} ({}) {}", self.release, self.builder, self.version)
        }
    }
}

/// Parses `Www Mmm d hh:mm:ss ZONE yyyy`, the format of `date` in the C locale.
fn parse_build_time(words: &[&str]) -> Option<OffsetDateTime> {
    let [weekday, month, day, clock, zone, year] = words else {
        return None;
    };
    if !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let format = format_description!(
        "[weekday repr:short] [month repr:short] [day padding:none] [hour]:[minute]:[second] [year]"
    );
    let stamp = format!("{} {} {} {} {}", weekday, month, day, clock, year);
    PrimitiveDateTime::parse(&stamp, format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use time::macros::datetime;

    use super::*;

    const DESC: &str = "4.19.16-norm_boot (user@host) #300 SMP Fri Jan 25 11:27:41 PST 2019";

    #[test]
    fn parse_desc() {
        let info = KInfo::parse_desc(DESC).unwrap();
        assert_eq!(
            info,
            KInfo {
                release: "4.19.16-norm_boot".to_string(),
                version: "#300 SMP Fri Jan 25 11:27:41 PST 2019".to_string(),
                builder: "user@host".to_string(),
                build_num: 300,
                build_time: datetime!(2019-01-25 11:27:41 UTC),
                maj: 4,
                min: 19,
                patch: 16,
                local_ver: "norm_boot".to_string(),
            }
        );
        assert_eq!(info.to_string(), DESC);
    }

    #[test]
    fn parse_desc_utc() {
        let info = KInfo::parse_desc(
            "4.19.16-norm_boot (user@host) #300 SMP Fri Jan 25 16:32:19 UTC 2019",
        )
        .unwrap();
        assert_eq!(info.release, "4.19.16-norm_boot");
        assert_eq!(info.builder, "user@host");
        assert_eq!(info.build_num, 300);
        assert_eq!((info.maj, info.min, info.patch), (4, 19, 16));
        assert_eq!(info.local_ver, "norm_boot");
        assert_eq!(info.build_time, datetime!(2019-01-25 16:32:19 UTC));
    }

    #[test]
    fn parse_desc_without_builder() {
        let info: KInfo = "4.12.7 #6 Fri Aug 10 14:47:18 PDT 2018".parse().unwrap();
        assert_eq!(info.release, "4.12.7");
        assert_eq!(info.builder, "");
        assert_eq!(info.version, "#6 Fri Aug 10 14:47:18 PDT 2018");
        assert_eq!(info.build_num, 6);
        assert_eq!(info.build_time, datetime!(2018-08-10 14:47:18 UTC));
        assert_eq!((info.maj, info.min, info.patch), (4, 12, 7));
        assert_eq!(info.local_ver, "");
    }

    #[test]
    fn parse_desc_local_version_with_dashes() {
        let info =
            KInfo::parse_desc("5.10.0-rc1-custom.1 (a@b) #1 SMP Sun Jan 3 01:02:03 UTC 2021")
                .unwrap();
        assert_eq!(info.patch, 0);
        assert_eq!(info.local_ver, "rc1-custom.1");
        assert_eq!(info.build_time, datetime!(2021-01-03 01:02:03 UTC));
    }

    #[test]
    fn parse_desc_errors() {
        for desc in [
            "4.19.16 (user@host) 300 SMP Fri Jan 25 11:27:41 PST 2019",
            "4.19.16 (user@host) #300 #301 Fri Jan 25 11:27:41 PST 2019",
            "4.19.16 (user@host #300 SMP Fri Jan 25 11:27:41 PST 2019",
            "4.19.16 (a) (b) #300 SMP Fri Jan 25 11:27:41 PST 2019",
            "4.19 (user@host) #300 SMP Fri Jan 25 11:27:41 PST 2019",
            "4.x.16 (user@host) #300 SMP Fri Jan 25 11:27:41 PST 2019",
            "4.19.16 (user@host) #SMP Fri Jan 25 11:27:41 PST 2019",
            "4.19.16 (user@host) #300",
            "4.19.16 (user@host) #300 SMP Fri Jan 25 11:27 PST 2019",
            " (user@host) #300 SMP Fri Jan 25 11:27:41 PST 2019",
        ] {
            assert!(
                matches!(KInfo::parse_desc(desc), Err(Error::Parse { .. })),
                "{:?} should not parse",
                desc
            );
        }
    }

    #[test]
    fn serialize_to_json() {
        let info = KInfo::parse_desc(DESC).unwrap();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["Release"], "4.19.16-norm_boot");
        assert_eq!(json["BuildNum"], 300);
        assert_eq!(json["BuildTime"], "2019-01-25T11:27:41Z");
        assert_eq!(json["LocalVer"], "norm_boot");
    }

    fn boot_sector(version_offset: u16) -> Vec<u8> {
        let mut image = vec![0u8; 0x800];
        image[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&[0x55, 0xaa]);
        image[HEADER_SIGNATURE_OFFSET..HEADER_SIGNATURE_OFFSET + 4].copy_from_slice(b"HdrS");
        image[VERSION_FIELD_OFFSET..VERSION_FIELD_OFFSET + 2]
            .copy_from_slice(&version_offset.to_le_bytes());
        image
    }

    #[test]
    fn reads_kernel_version() {
        let mut image = boot_sector(0x300);
        image[0x500..0x500 + DESC.len()].copy_from_slice(DESC.as_bytes());
        let version = read_kernel_version(&mut Cursor::new(&image)).unwrap();
        assert_eq!(version, DESC);
    }

    #[test]
    fn reads_kernel_version_up_to_end_of_file() {
        let mut image = boot_sector(0x300);
        image.truncate(0x500);
        image.extend_from_slice(b"6.1.0");
        assert_eq!(read_kernel_version(&mut Cursor::new(&image)).unwrap(), "6.1.0");
    }

    #[test]
    fn kernel_version_errors() {
        let mut image = boot_sector(0x300);
        image[BOOT_SIGNATURE_OFFSET] = 0;
        assert!(matches!(
            read_kernel_version(&mut Cursor::new(&image)),
            Err(Error::BadBootSignature)
        ));

        let mut image = boot_sector(0x300);
        image[HEADER_SIGNATURE_OFFSET] = b'h';
        assert!(matches!(
            read_kernel_version(&mut Cursor::new(&image)),
            Err(Error::BadHeaderSignature)
        ));

        let image = boot_sector(0);
        assert!(matches!(
            read_kernel_version(&mut Cursor::new(&image)),
            Err(Error::NullVersionOffset)
        ));

        let image = vec![0u8; 100];
        assert!(matches!(
            read_kernel_version(&mut Cursor::new(&image)),
            Err(Error::Io(_))
        ));
    }
}
