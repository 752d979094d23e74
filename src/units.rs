//! Generation of systemd activation units for discovered partitions.
//!
//! One unit file is written per accepted partition, plus a dependency
//! symlink that pulls it into the relevant boot milestone. File and link
//! names are derived deterministically from the device path.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::block::classify::PartitionCandidate;

const UMOUNT_TARGET: &str = "umount.target";
const SWAP_TARGET: &str = "swap.target";
const LOCAL_FS_TARGET: &str = "local-fs.target";
const LOCAL_FS_PRE_TARGET: &str = "local-fs-pre.target";

const GENERATED_HEADER: &str = "# Automatically generated by gpt-autogen\n\n";

/// Escape a filesystem path into a systemd unit name with the given suffix.
///
/// Slashes become dashes, the root path becomes a single dash, and any byte
/// outside the unit-name alphabet is escaped as `\xNN`.
pub fn unit_name_from_path(path: impl AsRef<Path>, suffix: &str) -> String {
    let mut name = escape_path(path.as_ref());
    name.push_str(suffix);
    name
}

fn escape_path(path: &Path) -> String {
    let bytes = path.to_string_lossy().into_owned().into_bytes();
    let trimmed: Vec<u8> = {
        let start = bytes.iter().position(|&b| b != b'/').unwrap_or(bytes.len());
        let end = bytes.iter().rposition(|&b| b != b'/').map_or(0, |i| i + 1);
        bytes[start.min(end)..end].to_vec()
    };

    if trimmed.is_empty() {
        return "-".to_string();
    }

    let mut escaped = String::with_capacity(trimmed.len());
    for (i, &b) in trimmed.iter().enumerate() {
        if b == b'/' {
            escaped.push('-');
        } else if b.is_ascii_alphanumeric() || matches!(b, b':' | b'-' | b'_' | b'\\') {
            escaped.push(b as char);
        } else if b == b'.' && i > 0 {
            escaped.push('.');
        } else {
            let _ = write!(escaped, "\\x{b:02x}");
        }
    }
    escaped
}

/// Write a swap activation unit for the candidate device and hook it into
/// the swap milestone.
pub async fn add_swap(dest: &Path, swap: &PartitionCandidate) -> Result<()> {
    debug!(node = %swap.node.display(), fstype = ?swap.fstype, "adding swap");

    let name = unit_name_from_path(&swap.node, ".swap");
    let unit = dest.join(&name);

    let mut contents = String::from(GENERATED_HEADER);
    let _ = write!(
        contents,
        "[Unit]\n\
         DefaultDependencies=no\n\
         Conflicts={UMOUNT_TARGET}\n\
         Before={UMOUNT_TARGET} {SWAP_TARGET}\n\n\
         [Swap]\n\
         What={}\n",
        swap.node.display()
    );

    write_unit_file(&unit, &contents).await?;

    let link = dest.join(format!("{SWAP_TARGET}.wants")).join(&name);
    install_link(&unit, &link).await
}

/// Write a mount unit placing the candidate device on /home and hook it
/// into the local-filesystem milestone. The caller has already confirmed
/// that /home is empty and that the filesystem type is known.
pub async fn add_home(dest: &Path, home: &PartitionCandidate, fstype: &str) -> Result<()> {
    debug!(node = %home.node.display(), fstype, "adding home");

    let unit = dest.join("home.mount");

    let mut contents = String::from(GENERATED_HEADER);
    let _ = write!(
        contents,
        "[Unit]\n\
         DefaultDependencies=no\n\
         After={LOCAL_FS_PRE_TARGET}\n\
         Conflicts={UMOUNT_TARGET}\n\
         Before={UMOUNT_TARGET} {LOCAL_FS_TARGET}\n\n\
         [Mount]\n\
         What={}\n\
         Where=/home\n\
         Type={fstype}\n\
         FsckPassNo=2\n",
        home.node.display()
    );

    write_unit_file(&unit, &contents).await?;

    let link = dest
        .join(format!("{LOCAL_FS_TARGET}.requires"))
        .join("home.mount");
    install_link(&unit, &link).await
}

/// Create a unit file exclusively: clobbering an existing unit in the
/// output directory is always a bug somewhere, so it fails instead.
async fn write_unit_file(unit: &Path, contents: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt as _;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(unit)
        .await
        .with_context(|| format!("Failed to create unit file {unit:?}"))?;

    file.write_all(contents.as_bytes())
        .await
        .with_context(|| format!("Failed to write unit file {unit:?}"))?;

    Ok(())
}

async fn install_link(unit: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {parent:?}"))?;
    }

    tokio::fs::symlink(unit, link)
        .await
        .with_context(|| format!("Failed to create symlink {link:?}"))?;

    Ok(())
}
