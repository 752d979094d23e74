use anyhow::{Context, Result};
use nix::sys::statfs::{statfs, BTRFS_SUPER_MAGIC};
use tracing::debug;

use super::{btrfs, BlockDevice};

/// Resolve the physical block device backing the root filesystem.
///
/// `Ok(None)` means the root device cannot be attributed to a single block
/// device (virtual filesystem, multi-device btrfs). That is not an error;
/// the caller is expected to exit successfully without doing anything.
pub fn resolve_root_device() -> Result<Option<BlockDevice>> {
    let st = nix::sys::stat::lstat("/").context("Failed to stat root directory")?;

    // The straightforward case: the root filesystem sits directly on a
    // block device.
    if nix::sys::stat::major(st.st_dev) != 0 {
        return Ok(Some(BlockDevice::from_dev_t(st.st_dev)));
    }

    // Major 0 means a virtual device node. The only layering we know how to
    // unwind is btrfs over a single backing device.
    let sfs = statfs("/").context("Failed to statfs root directory")?;
    if sfs.filesystem_type() != BTRFS_SUPER_MAGIC {
        debug!("root filesystem is on a virtual device we cannot unwind");
        return Ok(None);
    }

    btrfs::single_backing_device("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    // The resolver inspects live kernel state and has no failure mode that
    // can be provoked portably, but it must be idempotent on an unchanged
    // filesystem.
    #[test]
    fn test_resolver_is_idempotent() -> Result<()> {
        let first = resolve_root_device();
        let second = resolve_root_device();
        match (first, second) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            (a, b) => panic!("resolver not idempotent: {a:?} vs {b:?}"),
        }
        Ok(())
    }
}
