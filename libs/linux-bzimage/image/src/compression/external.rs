// SPDX-License-Identifier: MPL-2.0

//! Codecs run as external programs.

use std::{
    io::{self, Seek, Write},
    process::{Command, Stdio},
};

/// Runs `program` with `input` as standard input and returns its standard output.
///
/// The input is staged in an anonymous temporary file, so the child never
/// blocks on a full pipe while its output is collected.
pub(super) fn filter(program: &str, args: &[&str], input: &[u8]) -> io::Result<Vec<u8>> {
    let mut staged = tempfile::tempfile()?;
    staged.write_all(input)?;
    staged.rewind()?;

    debug!("Running {} {} on {} bytes", program, args.join(" "), input.len());
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::from(staged))
        .output()
        .map_err(|err| io::Error::new(err.kind(), format!("can't run {}: {}", program, err)))?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "{} failed with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}
