// SPDX-License-Identifier: MPL-2.0

use std::fs;

use linux_bzimage::testing::*;

use crate::util::*;

#[test]
fn dump_header() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");

    let output = bzimage(["dump", path_str(&sample.path)]).output().unwrap();
    assert_success(&output);
    assert_stdout_contains_msg(&output, "setup_sects:0x1e\n");
    assert_stdout_contains_msg(&output, "header:0x48647253\n");
    assert_stdout_contains_msg(&output, "version:0x20d\n");
    assert_eq!(
        stdout(&output).lines().count(),
        sample_header().fields().len()
    );
}

#[test]
fn diff_images() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");
    let other_path = dir.path().join("bzImage.other");
    fs::write(
        &other_path,
        ImageBuilder::new(sample.kernel.clone()).setup_sects(0x1c).build(),
    )
    .unwrap();

    let output = bzimage(["diff", path_str(&sample.path), path_str(&sample.path)])
        .output()
        .unwrap();
    assert_success(&output);
    assert_eq!(stdout(&output), "");

    let output = bzimage(["diff", path_str(&sample.path), path_str(&other_path)])
        .output()
        .unwrap();
    assert_success(&output);
    assert_stdout_contains_msg(&output, "setup_sects:0x1e != setup_sects:0x1c\n");
}

#[test]
fn extract_parts() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");
    let prefix = dir.path().join("parts");

    let output = bzimage(["extract", path_str(&sample.path), path_str(&prefix)])
        .output()
        .unwrap();
    assert_success(&output);

    let read = |suffix: &str| fs::read(dir.path().join(format!("parts.{}", suffix))).unwrap();
    assert_eq!(read("kernel"), sample.kernel);
    assert_eq!(read("initramfs"), sample_initramfs());
    assert_eq!(read("boot").len(), 0x3e00 - 0x268);
    assert_eq!(read("head"), vec![0x90; 0x255]);
    assert!(read("tail").starts_with(b"tail code"));
}

#[test]
fn extract_without_initramfs() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("bzImage");
    fs::write(
        &image_path,
        ImageBuilder::new(kernel_elf(&[0; 64], PF_RWX)).build(),
    )
    .unwrap();
    let prefix = dir.path().join("parts");

    let output = bzimage(["extract", path_str(&image_path), path_str(&prefix)])
        .output()
        .unwrap();
    assert_success(&output);
    assert!(dir.path().join("parts.kernel").exists());
    assert!(!dir.path().join("parts.initramfs").exists());
}

#[test]
fn extract_writes_nothing_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");
    let prefix = dir.path().join("parts");
    // A directory where the tail code should go can't be replaced by a file.
    fs::create_dir(dir.path().join("parts.tail")).unwrap();

    let output = bzimage(["extract", path_str(&sample.path), path_str(&prefix)])
        .output()
        .unwrap();
    assert_failure_contains_msg(&output, "failed to write");
    for suffix in ["boot", "head", "kernel", "initramfs"] {
        let path = dir.path().join(format!("parts.{}", suffix));
        assert!(!path.exists(), "{} was left behind", path.display());
    }
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 2, "{:?}", leftovers);
}

#[test]
fn print_version() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");

    let output = bzimage(["ver", path_str(&sample.path)]).output().unwrap();
    assert_success(&output);
    assert_eq!(stdout(&output), format!("{}\n", SAMPLE_VERSION));

    let output = bzimage(["ver", "--json", path_str(&sample.path)])
        .output()
        .unwrap();
    assert_success(&output);
    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["Release"], "4.19.16-norm_boot");
    assert_eq!(info["Builder"], "user@host");
    assert_eq!(info["BuildNum"], 300);
    assert_eq!(info["Maj"], 4);
    assert_eq!(info["LocalVer"], "norm_boot");
}

#[test]
fn version_of_non_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-an-image");
    fs::write(&path, vec![0u8; 4096]).unwrap();

    let output = bzimage(["ver", path_str(&path)]).output().unwrap();
    assert_failure_contains_msg(&output, "no boot signature 55 aa at offset 510");
}

#[test]
fn debug_flag_enables_logging() {
    let dir = tempfile::tempdir().unwrap();
    let sample = create_sample_image(dir.path(), "bzImage");

    let output = bzimage(["dump", path_str(&sample.path)]).output().unwrap();
    assert_success(&output);
    assert!(output.stderr.is_empty());

    let output = bzimage(["--debug", "dump", path_str(&sample.path)])
        .output()
        .unwrap();
    assert_success(&output);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("DEBUG"), "{}", stderr);
}
