mod cli;
mod fs;
mod mount;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    match Cli::parse().command {
        Command::Mount(args) => mount::run_mount(&args.image, &args.mount_point),
        Command::Mkfs(args) => mount::run_mkfs(&args.image, args.block_size, args.blocks),
    }
}
