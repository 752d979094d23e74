use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::block::{classify, probe, root};
use crate::units;

/// One generation pass: resolve the root device, check that it lives on a
/// GPT disk, classify its sibling partitions and emit activation units for
/// the accepted ones into `dest`.
///
/// Unit emission failures are per-partition warnings; everything before
/// emission is all-or-nothing.
pub async fn cmd_generate(dest: &Path) -> Result<()> {
    let Some(root) = root::resolve_root_device()? else {
        debug!("root filesystem not on a (single) block device, nothing to do");
        return Ok(());
    };

    debug!(root = %root, "resolved root device");

    if !probe::is_gpt_partition(root)
        .await
        .context("Failed to verify that the root device is a GPT partition")?
    {
        debug!("root device is not part of a GPT partition table, nothing to do");
        return Ok(());
    }

    let result = classify::classify_siblings(root)
        .await
        .context("Failed to classify partitions of the root disk")?;

    if let Some(swap) = &result.swap {
        if let Err(error) = units::add_swap(dest, swap).await {
            warn!(?error, node = %swap.node.display(), "failed to generate swap unit");
        }
    }

    if let Some(home) = &result.home {
        match &home.fstype {
            None => {
                // A mount unit needs a filesystem type; a home partition
                // with no recognizable superblock is left alone.
                debug!(node = %home.node.display(), "home partition has no filesystem, skipping");
            }
            Some(fstype) => {
                if home_is_available().await {
                    if let Err(error) = units::add_home(dest, home, fstype).await {
                        warn!(?error, node = %home.node.display(), "failed to generate home mount unit");
                    }
                } else {
                    debug!("/home is not empty, not mounting over it");
                }
            }
        }
    }

    Ok(())
}

/// /home may only be auto-mounted while nothing is using the directory.
/// "Not confirmed empty" (including a read failure) means hands off.
async fn home_is_available() -> bool {
    crate::fs::dir_is_empty("/home").await.unwrap_or(false)
}
