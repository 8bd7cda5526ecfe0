// SPDX-License-Identifier: MPL-2.0

//! `bzimage` inspects and rewrites Linux x86 bzImage files.
//!
//! Every command reads its inputs whole, works on them in memory and only
//! writes its outputs once they are complete. Any failure is printed on the
//! standard error and makes the process exit with 1.

#[macro_use]
extern crate log;

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;

use crate::{
    cli::{Cli, Command},
    commands::{
        execute_copy_command, execute_diff_command, execute_dump_command,
        execute_extract_command, execute_initramfs_command, execute_ver_command,
    },
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.debug);

    let result = match &cli.command {
        Command::Copy(args) => execute_copy_command(args),
        Command::Diff(args) => execute_diff_command(args),
        Command::Dump(args) => execute_dump_command(args),
        Command::Initramfs(args) => execute_initramfs_command(args),
        Command::Extract(args) => execute_extract_command(args),
        Command::Ver(args) => execute_ver_command(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bzimage: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the default level, which `--debug` raises.
fn init_logger(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}
