// SPDX-License-Identifier: MPL-2.0

use std::fs;

use linux_bzimage::{BzImage, Compression, testing::*};

use crate::util::*;

#[test]
fn copy_recompresses_kernel() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");
    let output_path = dir.path().join("bzImage.copy");

    let output = bzimage(["copy", path_str(&sample.path), path_str(&output_path)])
        .output()
        .unwrap();
    assert_success(&output);

    let original = fs::read(&sample.path).unwrap();
    let copied = fs::read(&output_path).unwrap();
    assert_eq!(copied.len(), original.len());
    let image = BzImage::unmarshal(&copied).unwrap();
    assert_eq!(image.compression(), Some(Compression::Xz));
    assert_eq!(image.kernel_code(), Some(sample.kernel.as_slice()));
}

#[test]
fn copy_refuses_oversize_kernel() {
    let dir = tempfile::tempdir().unwrap();
    let mut kernel = b"\x7fELF".to_vec();
    kernel.extend(noise(8192, 11));
    let raw = ImageBuilder::new(kernel.clone())
        .payload(stored_gzip(&kernel))
        .build();
    let input_path = dir.path().join("bzImage");
    fs::write(&input_path, raw).unwrap();
    let output_path = dir.path().join("bzImage.copy");

    let output = bzimage(["copy", path_str(&input_path), path_str(&output_path)])
        .output()
        .unwrap();
    assert_failure_contains_msg(&output, "compressed kernel code too big");
    assert!(!output_path.exists());
}

#[test]
fn copy_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("missing");
    let output_path = dir.path().join("out");

    let output = bzimage(["copy", path_str(&input_path), path_str(&output_path)])
        .output()
        .unwrap();
    assert_failure_contains_msg(&output, "failed to read");
    assert!(!output_path.exists());
}

#[test]
fn copy_reports_corrupted_input() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");
    let mut raw = fs::read(&sample.path).unwrap();
    raw[0x300] ^= 0xff;
    fs::write(&sample.path, raw).unwrap();

    let output = bzimage(["copy", path_str(&sample.path), path_str(&dir.path().join("out"))])
        .output()
        .unwrap();
    assert_failure_contains_msg(&output, "CRC32 mismatch");
}
