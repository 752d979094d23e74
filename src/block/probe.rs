use std::collections::HashMap;

use thiserror::Error;
use tokio::process::Command;

use crate::fs::cmd::CheckCommandOutput as _;

use super::{BlockDevice, PartitionRole};

/// blkid reports this exit code when low-level probing finds no
/// recognizable or unambiguous metadata on the device. That is not an
/// error for us, the device is simply not a usable GPT partition member.
const BLKID_EXIT_NOTHING_FOUND: i32 = 2;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to probe {device}: {detail}")]
    Io { device: String, detail: String },

    #[error("malformed GPT partition type {value:?} on {device}")]
    MalformedType { device: String, value: String },

    #[error("malformed GPT partition number {value:?} on {device}")]
    MalformedNumber { device: String, value: String },
}

/// GPT metadata of a single partition, as reported by the probe.
#[derive(Debug, Clone)]
pub struct GptPartition {
    pub role: PartitionRole,
    pub number: u32,
    pub fstype: Option<String>,
}

/// Probe a device and, if it is a GPT partition, report its partition type,
/// partition number and (best-effort) filesystem type.
///
/// Returns `Ok(None)` when the device carries no recognizable metadata or is
/// not part of a GPT partition table. Corrupt GPT metadata (a type GUID or
/// partition number that does not parse) is a hard error, not a skip.
pub async fn probe_partition(dev: BlockDevice) -> Result<Option<GptPartition>, ProbeError> {
    let device = dev.node_path().to_string_lossy().into_owned();

    let Some(output) = run_blkid(&device).await? else {
        return Ok(None);
    };

    interpret_probe_output(&device, &output)
}

/// The caller-requests-nothing variant: does the device belong to a GPT
/// partition table at all? Used on the root device before any sibling
/// enumeration is attempted.
pub async fn is_gpt_partition(dev: BlockDevice) -> Result<bool, ProbeError> {
    let device = dev.node_path().to_string_lossy().into_owned();

    let Some(output) = run_blkid(&device).await? else {
        return Ok(false);
    };

    Ok(partition_scheme(&output) == Some("gpt"))
}

/// Run blkid in low-level probing mode, which enables superblock type
/// detection and partition entry details and uses the safe probe internally.
async fn run_blkid(device: &str) -> Result<Option<String>, ProbeError> {
    Command::new("blkid")
        .args(["--probe", "--output", "export", device])
        .run_with_status_checker(|code, stdout, _| {
            if code == 0 {
                Ok(Some(String::from_utf8_lossy(&stdout).into_owned()))
            } else if code == BLKID_EXIT_NOTHING_FOUND {
                Ok(None)
            } else {
                anyhow::bail!("unexpected blkid exit code")
            }
        })
        .await
        .map_err(|error| ProbeError::Io {
            device: device.to_string(),
            detail: format!("{error:#}"),
        })
}

fn parse_export(output: &str) -> HashMap<&str, &str> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .collect()
}

fn partition_scheme(output: &str) -> Option<&str> {
    parse_export(output).get("PART_ENTRY_SCHEME").copied()
}

fn interpret_probe_output(
    device: &str,
    output: &str,
) -> Result<Option<GptPartition>, ProbeError> {
    let values = parse_export(output);

    match values.get("PART_ENTRY_SCHEME") {
        Some(&"gpt") => {}
        // Anything that is not a GPT partition entry is a skip, never an
        // error, including devices with a bare superblock and no partition
        // table membership at all.
        _ => return Ok(None),
    }

    let type_value = values.get("PART_ENTRY_TYPE").ok_or_else(|| ProbeError::Io {
        device: device.to_string(),
        detail: "GPT partition entry without PART_ENTRY_TYPE".to_string(),
    })?;
    let type_guid = uuid::Uuid::parse_str(type_value).map_err(|_| ProbeError::MalformedType {
        device: device.to_string(),
        value: type_value.to_string(),
    })?;

    let number_value = values
        .get("PART_ENTRY_NUMBER")
        .ok_or_else(|| ProbeError::Io {
            device: device.to_string(),
            detail: "GPT partition entry without PART_ENTRY_NUMBER".to_string(),
        })?;
    let number = number_value
        .parse::<u32>()
        .map_err(|_| ProbeError::MalformedNumber {
            device: device.to_string(),
            value: number_value.to_string(),
        })?;

    // Filesystem detection is best-effort, a partition with no recognizable
    // superblock simply has no type.
    let fstype = values.get("TYPE").map(|v| v.to_string());

    Ok(Some(GptPartition {
        role: PartitionRole::from(type_guid),
        number,
        fstype,
    }))
}
