use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::fs::{DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE};

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Mount a factfs image over FUSE.
    Mount(MountArgs),

    /// Format a new factfs image.
    Mkfs(MkfsArgs),
}

#[derive(Args)]
pub struct MountArgs {
    #[arg(long, env = "FACTFS_IMAGE")]
    pub image: PathBuf,

    #[arg(long)]
    pub mount_point: PathBuf,
}

#[derive(Args)]
pub struct MkfsArgs {
    #[arg(long, env = "FACTFS_IMAGE")]
    pub image: PathBuf,

    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: u64,

    #[arg(long, default_value_t = DEFAULT_BLOCK_COUNT)]
    pub blocks: u64,
}
