// SPDX-License-Identifier: MPL-2.0

use std::fs;

use linux_bzimage::{BzImage, testing::*};

use crate::util::*;

#[test]
fn replace_initramfs() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");
    let archive = newc_archive(&[NewcFile::dir("dev"), NewcFile::file("init", b"exec sh")]);
    let archive_path = dir.path().join("initramfs.cpio");
    fs::write(&archive_path, &archive).unwrap();
    let output_path = dir.path().join("bzImage.new");

    let output = bzimage([
        "initramfs",
        path_str(&sample.path),
        path_str(&archive_path),
        path_str(&output_path),
    ])
    .output()
    .unwrap();
    assert_success(&output);

    let image = BzImage::unmarshal(&fs::read(&output_path).unwrap()).unwrap();
    assert_eq!(image.initramfs().unwrap(), archive.as_slice());
    assert_eq!(image.kernel_code().unwrap().len(), sample.kernel.len());
}

#[test]
fn refuse_larger_initramfs() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");
    let archive = newc_archive(&[NewcFile::file("init", &[b'#'; 4096])]);
    let archive_path = dir.path().join("initramfs.cpio");
    fs::write(&archive_path, &archive).unwrap();
    let output_path = dir.path().join("bzImage.new");

    let output = bzimage([
        "initramfs",
        path_str(&sample.path),
        path_str(&archive_path),
        path_str(&output_path),
    ])
    .output()
    .unwrap();
    assert_failure_contains_msg(
        &output,
        &format!(
            "new initramfs is {} bytes, won't fit in {} byte old one",
            archive.len(),
            sample_initramfs().len()
        ),
    );
    assert!(!output_path.exists());
}
