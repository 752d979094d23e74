pub mod block;
pub mod cli;
pub mod cmd;
pub mod fs;
pub mod units;

use std::path::Path;

use anyhow::Result;
use clap::Parser as _;
use nix::sys::stat::Mode;
use shadow_rs::shadow;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

shadow!(build);

pub async fn run() -> Result<()> {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Args::parse();
    let dest = args.dest_dir()?;

    // Unit files and .wants/.requires directories must come out world
    // readable no matter how we were invoked.
    nix::sys::stat::umask(Mode::from_bits_truncate(0o022));

    if in_initrd() {
        // The transient initrd root has no final root device to inspect;
        // the real pass happens after switch-root.
        tracing::debug!("running in initrd, nothing to do");
        return Ok(());
    }

    cmd::generate::cmd_generate(&dest).await
}

fn in_initrd() -> bool {
    Path::new("/etc/initrd-release").exists()
}
