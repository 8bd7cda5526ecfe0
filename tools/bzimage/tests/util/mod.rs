// SPDX-License-Identifier: MPL-2.0

//! The common utils for the tests of the `bzimage` binary

use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    process::Output,
};

use assert_cmd::Command;
use linux_bzimage::testing::{ImageBuilder, sample_initramfs, sample_kernel, stored_gzip};

pub fn bzimage<T: AsRef<OsStr>, I: IntoIterator<Item = T>>(args: I) -> Command {
    let mut command = Command::cargo_bin("bzimage").unwrap();
    command.env_remove("RUST_LOG");
    command.args(args);
    command
}

pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "Command output {:#?} seems failed, stderr:\n {}",
        output,
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn assert_failure_contains_msg(output: &Output, msg: &str) {
    assert_eq!(output.status.code(), Some(1), "{:#?}", output);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(msg), "{:?} not in stderr:\n{}", msg, stderr);
}

pub fn assert_stdout_contains_msg(output: &Output, msg: &str) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(msg), "{:?} not in stdout:\n{}", msg, stdout);
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A bzImage with a kernel that packs smaller than the payload it carries,
/// so that it can be rewritten.
pub struct SampleImage {
    pub path: PathBuf,
    pub kernel: Vec<u8>,
}

pub fn create_sample_image(dir: &Path, name: &str) -> SampleImage {
    let kernel = sample_kernel(&sample_initramfs()).elf;
    let raw = ImageBuilder::new(kernel.clone())
        .payload(stored_gzip(&kernel))
        .build();
    let path = dir.join(name);
    fs::write(&path, raw).unwrap();
    SampleImage { path, kernel }
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}
