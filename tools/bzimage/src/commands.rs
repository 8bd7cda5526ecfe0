// SPDX-License-Identifier: MPL-2.0

use std::{
    ffi::OsString,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use linux_bzimage::{BzImage, KInfo, read_kernel_version};
use tempfile::NamedTempFile;

use crate::cli::{CopyArgs, DiffArgs, DumpArgs, ExtractArgs, InitramfsArgs, VerArgs};

pub fn execute_copy_command(args: &CopyArgs) -> Result<()> {
    let image = read_image(&args.input)?;
    let raw = image
        .marshal()
        .with_context(|| format!("failed to encode {}", args.input.display()))?;
    write_file(&args.output, &raw)
}

pub fn execute_diff_command(args: &DiffArgs) -> Result<()> {
    let first = read_image(&args.first)?;
    let second = read_image(&args.second)?;
    print!("{}", first.diff(&second));
    Ok(())
}

pub fn execute_dump_command(args: &DumpArgs) -> Result<()> {
    let raw = read_file(&args.image)?;
    let image = BzImage::unmarshal_without_decompression(&raw)
        .with_context(|| format!("failed to decode {}", args.image.display()))?;
    print!("{}", image.header());
    Ok(())
}

pub fn execute_initramfs_command(args: &InitramfsArgs) -> Result<()> {
    let mut image = read_image(&args.image)?;
    image.add_initramfs(&args.initramfs).with_context(|| {
        format!(
            "failed to put {} into {}",
            args.initramfs.display(),
            args.image.display()
        )
    })?;
    let raw = image
        .marshal()
        .with_context(|| format!("failed to encode {}", args.image.display()))?;
    write_file(&args.output, &raw)
}

pub fn execute_extract_command(args: &ExtractArgs) -> Result<()> {
    let image = read_image(&args.image)?;
    let kernel_code = image
        .kernel_code()
        .context("the image has no kernel code")?;
    let initramfs = match image.initramfs() {
        Ok(initramfs) => Some(initramfs),
        Err(err) => {
            info!("No initramfs extracted: {}", err);
            None
        }
    };

    let mut outputs = vec![
        (with_suffix(&args.prefix, "boot"), image.boot_code()),
        (with_suffix(&args.prefix, "head"), image.head_code()),
        (with_suffix(&args.prefix, "kernel"), kernel_code),
        (with_suffix(&args.prefix, "tail"), image.tail_code()),
    ];
    if let Some(initramfs) = initramfs {
        outputs.push((with_suffix(&args.prefix, "initramfs"), initramfs));
    }
    write_files(&outputs)
}

pub fn execute_ver_command(args: &VerArgs) -> Result<()> {
    let mut file = File::open(&args.image)
        .with_context(|| format!("failed to open {}", args.image.display()))?;
    let version = read_kernel_version(&mut file)
        .with_context(|| format!("failed to read the kernel version of {}", args.image.display()))?;
    if args.json {
        let info = KInfo::parse_desc(&version)?;
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", version);
    }
    Ok(())
}

fn read_image(path: &Path) -> Result<BzImage> {
    let raw = read_file(path)?;
    BzImage::unmarshal(&raw).with_context(|| format!("failed to decode {}", path.display()))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    write_files(&[(path.to_path_buf(), bytes)])
}

/// Writes all of `outputs` or none of them.
///
/// Every file is staged next to its destination first. The staged files are
/// then renamed into place, and the ones already renamed are removed again
/// if a later rename fails.
fn write_files(outputs: &[(PathBuf, &[u8])]) -> Result<()> {
    let mut staged = Vec::with_capacity(outputs.len());
    for (path, bytes) in outputs {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create a temporary file in {}", dir.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        staged.push((path, bytes.len(), file));
    }

    let mut written: Vec<&PathBuf> = Vec::with_capacity(staged.len());
    for (path, len, file) in staged {
        if let Err(err) = file.persist(path) {
            for done in written {
                if let Err(err) = fs::remove_file(done) {
                    warn!("Failed to remove {}: {}", done.display(), err);
                }
            }
            return Err(anyhow::Error::new(err.error)
                .context(format!("failed to write {}", path.display())));
        }
        debug!("Wrote {} bytes to {}", len, path.display());
        written.push(path);
    }
    Ok(())
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}
