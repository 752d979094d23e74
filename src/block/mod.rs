pub mod btrfs;
pub mod classify;
pub mod probe;
pub mod root;

use std::fmt::{self, Display};
use std::path::PathBuf;

use uuid::{uuid, Uuid};

/// GPT partition type GUID for swap partitions.
pub const SWAP_PARTITION_TYPE: Uuid = uuid!("0657fd6d-a4ab-43c4-84e5-0933c84b4f4f");

/// GPT partition type GUID for the user home partition.
pub const HOME_PARTITION_TYPE: Uuid = uuid!("933ac7e1-2eb4-4f13-b844-0e14e2aef915");

/// A kernel block device, identified by its (major, minor) device number.
///
/// Equality on the device number is what we use to recognize "this is the
/// same device" when walking sibling partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDevice(libc::dev_t);

impl BlockDevice {
    pub fn from_dev_t(dev: libc::dev_t) -> Self {
        Self(dev)
    }

    pub fn as_dev_t(&self) -> libc::dev_t {
        self.0
    }

    pub fn major(&self) -> u64 {
        nix::sys::stat::major(self.0)
    }

    pub fn minor(&self) -> u64 {
        nix::sys::stat::minor(self.0)
    }

    /// The devtmpfs node for this device number.
    pub fn node_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/block/{}:{}", self.major(), self.minor()))
    }
}

impl Display for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}

/// What a GPT partition type GUID means to us, decided once at probe time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    Swap,
    Home,
    Other(Uuid),
}

impl From<Uuid> for PartitionRole {
    fn from(type_guid: Uuid) -> Self {
        if type_guid == SWAP_PARTITION_TYPE {
            PartitionRole::Swap
        } else if type_guid == HOME_PARTITION_TYPE {
            PartitionRole::Home
        } else {
            PartitionRole::Other(type_guid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_well_known_guids() {
        assert_eq!(PartitionRole::from(SWAP_PARTITION_TYPE), PartitionRole::Swap);
        assert_eq!(PartitionRole::from(HOME_PARTITION_TYPE), PartitionRole::Home);

        let efi = uuid!("c12a7328-f81f-11d2-ba4b-00a0c93ec93b");
        assert_eq!(PartitionRole::from(efi), PartitionRole::Other(efi));
    }

    #[test]
    fn test_node_path_from_dev_t() {
        let dev = BlockDevice::from_dev_t(nix::sys::stat::makedev(8, 2));
        assert_eq!(dev.major(), 8);
        assert_eq!(dev.minor(), 2);
        assert_eq!(dev.node_path(), PathBuf::from("/dev/block/8:2"));
        assert_eq!(dev.to_string(), "8:2");
    }

    #[test]
    fn test_device_equality_is_on_device_number() {
        let a = BlockDevice::from_dev_t(nix::sys::stat::makedev(8, 2));
        let b = BlockDevice::from_dev_t(nix::sys::stat::makedev(8, 2));
        let c = BlockDevice::from_dev_t(nix::sys::stat::makedev(8, 3));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
