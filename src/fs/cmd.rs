use std::{
    marker::{Send, Sync},
    process::Stdio,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// Run an external command and let the caller decide what each exit code
/// means, with stdout/stderr captured and attached to any error.
#[async_trait]
pub trait CheckCommandOutput {
    /// Run and require exit code 0, returning stdout.
    async fn run(&mut self) -> Result<Vec<u8>>;

    async fn run_with_status_checker<R>(
        &mut self,
        f: impl Fn(i32, Vec<u8>, Vec<u8>) -> Result<R> + Send + Sync,
    ) -> Result<R>;
}

#[async_trait]
impl CheckCommandOutput for Command {
    async fn run(&mut self) -> Result<Vec<u8>> {
        self.run_with_status_checker(|code, stdout, _| {
            if code != 0 {
                bail!("Bad exit code")
            } else {
                Ok(stdout)
            }
        })
        .await
    }

    async fn run_with_status_checker<R>(
        &mut self,
        f: impl Fn(i32, Vec<u8>, Vec<u8>) -> Result<R> + Send + Sync,
    ) -> Result<R> {
        // reset all locale settings for this command
        self.env("LC_ALL", "C");

        tracing::trace!(cmd=?self.as_std(), "run external cmd");

        async {
            let output = async {
                self.stdin(Stdio::null());
                self.stdout(Stdio::piped());
                self.stderr(Stdio::piped());

                let child = self.kill_on_drop(true).spawn()?;

                child.wait_with_output().await.map_err(anyhow::Error::from)
            }
            .await
            .with_context(|| format!("cmd: {:?}", self.as_std()))?;

            let stdout = output.stdout;
            let stderr = output.stderr;
            let code = output.status.code();

            match code {
                Some(code) => f(code, stdout.clone(), stderr.clone()),
                None => Err(anyhow!("killed by signal")),
            }
            .with_context(|| {
                let stdout = String::from_utf8_lossy(&stdout);
                let stderr = String::from_utf8_lossy(&stderr);
                format!(
                    "\ncmd: {:?}\nexit code: {}\nstdout: {}\nstderr: {}",
                    self.as_std(),
                    code.map(|code| code.to_string())
                        .unwrap_or("unknown".to_string()),
                    if stdout.contains('\n') {
                        format!("(multi-line)\n\t{}", stdout.replace('\n', "\n\t"))
                    } else {
                        stdout.into()
                    },
                    if stderr.contains('\n') {
                        format!("(multi-line)\n\t{}", stderr.replace('\n', "\n\t"))
                    } else {
                        stderr.into()
                    },
                )
            })
        }
        .await
        .context("Failed to execute external command")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_stdout() -> Result<()> {
        let stdout = Command::new("echo").arg("hello").run().await?;
        assert_eq!(String::from_utf8_lossy(&stdout).trim(), "hello");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_rejects_nonzero_exit() {
        assert!(Command::new("false").run().await.is_err());
    }

    #[tokio::test]
    async fn test_status_checker_sees_exit_code() -> Result<()> {
        let code = Command::new("sh")
            .args(["-c", "exit 2"])
            .run_with_status_checker(|code, _, _| Ok(code))
            .await?;
        assert_eq!(code, 2);
        Ok(())
    }
}
