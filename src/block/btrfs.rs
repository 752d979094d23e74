use std::ffi::CStr;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::errno::Errno;
use nix::sys::stat::SFlag;
use nix::{ioctl_read, ioctl_readwrite};
use tracing::debug;

use super::BlockDevice;

const BTRFS_IOCTL_MAGIC: u8 = 0x94;
const BTRFS_FSID_SIZE: usize = 16;
const BTRFS_UUID_SIZE: usize = 16;
const BTRFS_DEVICE_PATH_NAME_MAX: usize = 1024;

#[derive(Copy, Clone)]
#[repr(C)]
pub struct FsInfoArgs {
    pub max_id: u64,
    pub num_devices: u64,
    pub fsid: [u8; BTRFS_FSID_SIZE],
    pub nodesize: u32,
    pub sectorsize: u32,
    pub clone_alignment: u32,
    pub csum_type: u16,
    pub csum_size: u16,
    pub flags: u64,
    pub generation: u64,
    pub metadata_uuid: [u8; BTRFS_FSID_SIZE],
    pub reserved: [u8; 944],
}

impl Default for FsInfoArgs {
    fn default() -> Self {
        // SAFETY: the struct is plain old data, all-zeroes is a valid value
        unsafe { std::mem::zeroed() }
    }
}

#[derive(Copy, Clone)]
#[repr(C)]
pub struct DevInfoArgs {
    pub devid: u64,
    pub uuid: [u8; BTRFS_UUID_SIZE],
    pub bytes_used: u64,
    pub total_bytes: u64,
    pub unused: [u64; 379],
    pub path: [u8; BTRFS_DEVICE_PATH_NAME_MAX],
}

impl Default for DevInfoArgs {
    fn default() -> Self {
        // SAFETY: the struct is plain old data, all-zeroes is a valid value
        unsafe { std::mem::zeroed() }
    }
}

ioctl_read!(btrfs_fs_info, BTRFS_IOCTL_MAGIC, 31, FsInfoArgs);
ioctl_readwrite!(btrfs_dev_info, BTRFS_IOCTL_MAGIC, 30, DevInfoArgs);

/// Unwind a btrfs mount to its sole backing block device.
///
/// Multi-device filesystems cannot be attributed to one physical disk, so
/// they resolve to `None` rather than an error. The device id space may be
/// sparse after device removal; ids the kernel reports as gone are skipped.
pub fn single_backing_device(path: impl AsRef<Path>) -> Result<Option<BlockDevice>> {
    let path = path.as_ref();

    let dir = File::open(path).with_context(|| format!("Failed to open {path:?}"))?;

    let mut fs_info = FsInfoArgs::default();
    unsafe { btrfs_fs_info(dir.as_raw_fd(), &mut fs_info) }
        .with_context(|| format!("Failed to query btrfs filesystem info for {path:?}"))?;

    if fs_info.num_devices != 1 {
        debug!(
            num_devices = fs_info.num_devices,
            "btrfs filesystem spans more than one device"
        );
        return Ok(None);
    }

    for devid in 1..=fs_info.max_id {
        let mut dev_info = DevInfoArgs::default();
        dev_info.devid = devid;

        match unsafe { btrfs_dev_info(dir.as_raw_fd(), &mut dev_info) } {
            Ok(_) => {}
            Err(Errno::ENODEV) => continue,
            Err(errno) => {
                return Err(errno).with_context(|| {
                    format!("Failed to query btrfs device info for devid {devid}")
                })
            }
        }

        let node = device_node_path(&dev_info)?;
        let st = nix::sys::stat::stat(&node)
            .with_context(|| format!("Failed to stat backing device {node:?}"))?;

        if SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT != SFlag::S_IFBLK {
            bail!("btrfs backing device {node:?} is not a block device");
        }
        if nix::sys::stat::major(st.st_rdev) == 0 {
            bail!("btrfs backing device {node:?} has no real device number");
        }

        return Ok(Some(BlockDevice::from_dev_t(st.st_rdev)));
    }

    bail!("btrfs reported a single device but none was found in the id space")
}

fn device_node_path(dev_info: &DevInfoArgs) -> Result<PathBuf> {
    let cstr = CStr::from_bytes_until_nul(&dev_info.path)
        .context("btrfs device path is not NUL terminated")?;
    let os_str = std::ffi::OsStr::from_bytes(cstr.to_bytes());
    Ok(PathBuf::from(os_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_info_args_size() {
        assert_eq!(std::mem::size_of::<FsInfoArgs>(), 1024);
    }

    #[test]
    fn dev_info_args_size() {
        assert_eq!(std::mem::size_of::<DevInfoArgs>(), 4096);
    }

    #[test]
    fn test_device_node_path_reads_until_nul() -> Result<()> {
        let mut dev_info = DevInfoArgs::default();
        dev_info.path[..9].copy_from_slice(b"/dev/sda2");
        assert_eq!(device_node_path(&dev_info)?, PathBuf::from("/dev/sda2"));
        Ok(())
    }
}
