use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::build::CLAP_LONG_VERSION;

const DEFAULT_DEST_DIR: &str = "/tmp";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[clap(long_version = CLAP_LONG_VERSION)]
pub struct Args {
    /// Output directories for generated units (normal, early, late), as
    /// passed by the generator protocol. Units are written to the third
    /// directory. With no arguments, units go to /tmp.
    #[arg(value_name = "DEST_DIR")]
    pub dest_dirs: Vec<PathBuf>,
}

impl Args {
    /// The directory generated units are written to.
    pub fn dest_dir(&self) -> Result<PathBuf> {
        match self.dest_dirs.len() {
            0 => Ok(PathBuf::from(DEFAULT_DEST_DIR)),
            3 => Ok(self.dest_dirs[2].clone()),
            _ => bail!("This program takes three or no arguments"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("gpt-autogen").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_no_arguments_defaults_to_tmp() -> Result<()> {
        assert_eq!(parse(&[]).dest_dir()?, PathBuf::from("/tmp"));
        Ok(())
    }

    #[test]
    fn test_three_arguments_select_the_late_dir() -> Result<()> {
        let args = parse(&["/run/normal", "/run/early", "/run/late"]);
        assert_eq!(args.dest_dir()?, PathBuf::from("/run/late"));
        Ok(())
    }

    #[test]
    fn test_other_argument_counts_are_usage_errors() {
        assert!(parse(&["/run/only-one"]).dest_dir().is_err());
        assert!(parse(&["/run/a", "/run/b"]).dest_dir().is_err());
        assert!(parse(&["/a", "/b", "/c", "/d"]).dest_dir().is_err());
    }
}
