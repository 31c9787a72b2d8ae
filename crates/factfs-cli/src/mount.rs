use std::path::Path;

use anyhow::{Context, Result};
use factfs_rs::Engine;
use fuser::MountOption;
use tracing::info;

use crate::fs::FactFuse;

/// Opens the image and hands it to the kernel. A broken header or catalog is
/// fatal here: nothing gets mounted over a catalog that did not validate.
pub(crate) fn run_mount(image: &Path, mount_point: &Path) -> Result<()> {
    let engine = Engine::open(image)
        .with_context(|| format!("failed to open image {}", image.display()))?;
    std::fs::create_dir_all(mount_point)
        .with_context(|| format!("failed to create mount point {}", mount_point.display()))?;

    info!(
        image = %image.display(),
        mount_point = %mount_point.display(),
        block_size = engine.block_size(),
        block_count = engine.block_count(),
        "mounting"
    );

    let options = vec![
        MountOption::RW,
        MountOption::FSName("factfs".into()),
        MountOption::DefaultPermissions,
    ];
    fuser::mount2(FactFuse::new(engine), mount_point, &options)
        .with_context(|| format!("failed to mount filesystem at {}", mount_point.display()))
}

pub(crate) fn run_mkfs(image: &Path, block_size: u64, blocks: u64) -> Result<()> {
    Engine::format(image, block_size, blocks)
        .with_context(|| format!("failed to format image {}", image.display()))?;
    info!(image = %image.display(), block_size, blocks, "formatted");
    Ok(())
}
