use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use udev::Enumerator;

use super::{probe, BlockDevice, PartitionRole};

/// A partition accepted by the classifier, carrying everything the unit
/// emitter needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionCandidate {
    pub node: PathBuf,
    pub number: u32,
    pub fstype: Option<String>,
}

/// Outcome of one enumeration pass over the root disk's partitions: at most
/// one swap candidate and at most one home candidate.
#[derive(Debug, Default)]
pub struct ClassificationResult {
    pub swap: Option<PartitionCandidate>,
    pub home: Option<PartitionCandidate>,
}

impl ClassificationResult {
    /// Fold one classified partition into the accumulator.
    ///
    /// Swap keeps the first candidate seen and silently ignores later ones.
    /// Home keeps the candidate with the lowest partition number, which
    /// makes the selection independent of enumeration order.
    fn offer(&mut self, role: PartitionRole, candidate: PartitionCandidate) {
        match role {
            PartitionRole::Swap => {
                if self.swap.is_none() {
                    self.swap = Some(candidate);
                }
            }
            PartitionRole::Home => {
                let replace = match &self.home {
                    None => true,
                    Some(held) => candidate.number < held.number,
                };
                if replace {
                    self.home = Some(candidate);
                }
            }
            PartitionRole::Other(_) => {}
        }
    }
}

/// Enumerate all partitions sharing the root device's parent disk and
/// classify them by GPT partition type.
///
/// The root device and the parent disk itself are never candidates. A probe
/// failure on any sibling aborts the whole pass; partial results are never
/// returned.
pub async fn classify_siblings(root: BlockDevice) -> Result<ClassificationResult> {
    let root_device = udev::Device::from_devnum(udev::DeviceType::Block, root.as_dev_t())
        .with_context(|| format!("Failed to open udev device {root}"))?;
    let parent = root_device
        .parent()
        .ok_or_else(|| anyhow!("Root device {root} has no parent disk"))?;

    let mut enumerator = Enumerator::new().context("Failed to create udev enumerator")?;
    enumerator
        .match_parent(&parent)
        .context("Failed to restrict enumeration to the root disk")?;
    enumerator
        .match_subsystem("block")
        .context("Failed to restrict enumeration to block devices")?;

    let siblings = enumerator
        .scan_devices()
        .context("Failed to enumerate partitions of the root disk")?;

    let mut result = ClassificationResult::default();

    for device in siblings {
        let Some(devnum) = device.devnum() else {
            continue;
        };
        let candidate = BlockDevice::from_dev_t(devnum);

        // Never classify the root partition or the disk itself.
        if candidate == root || Some(devnum) == parent.devnum() {
            continue;
        }

        let node = device
            .devnode()
            .ok_or_else(|| {
                anyhow!("No device node for {}", device.syspath().to_string_lossy())
            })?
            .to_path_buf();

        let partition = probe::probe_partition(candidate)
            .await
            .with_context(|| format!("Failed to probe partition {candidate}"))?;

        let Some(partition) = partition else {
            debug!(device = %candidate, "not a GPT partition, skipping");
            continue;
        };

        debug!(
            device = %candidate,
            role = ?partition.role,
            number = partition.number,
            "classified partition"
        );

        result.offer(
            partition.role,
            PartitionCandidate {
                node,
                number: partition.number,
                fstype: partition.fstype,
            },
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::block::{HOME_PARTITION_TYPE, SWAP_PARTITION_TYPE};

    fn home(node: &str, number: u32) -> PartitionCandidate {
        PartitionCandidate {
            node: PathBuf::from(node),
            number,
            fstype: Some("ext4".to_string()),
        }
    }

    fn swap(node: &str, number: u32) -> PartitionCandidate {
        PartitionCandidate {
            node: PathBuf::from(node),
            number,
            fstype: None,
        }
    }

    #[rstest]
    #[case(&[4, 2, 7])]
    #[case(&[2, 4, 7])]
    #[case(&[7, 4, 2])]
    #[case(&[2, 7, 4])]
    fn test_home_selection_is_lowest_number_in_any_order(#[case] numbers: &[u32]) {
        let mut result = ClassificationResult::default();
        for &number in numbers {
            result.offer(
                PartitionRole::Home,
                home(&format!("/dev/sda{number}"), number),
            );
        }
        assert_eq!(result.home.unwrap().number, 2);
    }

    #[test]
    fn test_first_swap_wins_even_over_a_lower_numbered_one() {
        // Swap is first-found, home is min-by-number. The asymmetry is
        // intentional and pinned down here.
        let mut result = ClassificationResult::default();
        result.offer(PartitionRole::Swap, swap("/dev/sda5", 5));
        result.offer(PartitionRole::Swap, swap("/dev/sda3", 3));
        assert_eq!(result.swap.unwrap().node, PathBuf::from("/dev/sda5"));
    }

    #[test]
    fn test_other_roles_are_ignored() {
        let mut result = ClassificationResult::default();
        let efi = uuid::uuid!("c12a7328-f81f-11d2-ba4b-00a0c93ec93b");
        result.offer(PartitionRole::Other(efi), home("/dev/sda1", 1));
        assert!(result.swap.is_none());
        assert!(result.home.is_none());
    }

    #[test]
    fn test_swap_and_home_are_tracked_independently() {
        let mut result = ClassificationResult::default();
        result.offer(PartitionRole::Swap, swap("/dev/sda3", 3));
        result.offer(PartitionRole::Home, home("/dev/sda2", 2));
        assert_eq!(result.swap.unwrap().node, PathBuf::from("/dev/sda3"));
        assert_eq!(result.home.unwrap().node, PathBuf::from("/dev/sda2"));
    }

    #[test]
    fn test_role_constants_are_distinct() {
        assert_ne!(SWAP_PARTITION_TYPE, HOME_PARTITION_TYPE);
    }
}
