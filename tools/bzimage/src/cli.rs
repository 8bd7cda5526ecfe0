// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bzimage", version, about = "Inspect and rewrite Linux x86 bzImage files")]
pub struct Cli {
    /// Print what the image decoder does on the standard error.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Decode an image and encode it again, recompressing the kernel")]
    Copy(CopyArgs),
    #[command(about = "Print how two images differ")]
    Diff(DiffArgs),
    #[command(about = "Print the boot protocol header of an image")]
    Dump(DumpArgs),
    #[command(about = "Replace the initramfs embedded in the kernel of an image")]
    Initramfs(InitramfsArgs),
    #[command(about = "Write the parts of an image to separate files")]
    Extract(ExtractArgs),
    #[command(about = "Print the kernel version of an image")]
    Ver(VerArgs),
}

#[derive(Debug, Args)]
pub struct CopyArgs {
    #[arg(help = "The image to read")]
    pub input: PathBuf,
    #[arg(help = "Where to write the new image")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    pub first: PathBuf,
    pub second: PathBuf,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    pub image: PathBuf,
}

#[derive(Debug, Args)]
pub struct InitramfsArgs {
    #[arg(help = "The image to read")]
    pub image: PathBuf,
    #[arg(help = "The uncompressed newc archive to embed")]
    pub initramfs: PathBuf,
    #[arg(help = "Where to write the new image")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    pub image: PathBuf,
    #[arg(
        help = "The path prefix of the written files, which get the suffixes \
                .boot, .head, .kernel, .tail and .initramfs"
    )]
    pub prefix: PathBuf,
}

#[derive(Debug, Args)]
pub struct VerArgs {
    pub image: PathBuf,
    #[arg(long, help = "Print the parts of the version as JSON")]
    pub json: bool,
}
