use anyhow::{Result, anyhow};
use tokio::io::AsyncReadExt;
use tokio::time::{Instant, timeout_at};

use super::tcp::connect;
use super::{Probe, numeric_argument};
use crate::check::Test;
use crate::options::ExecutionOptions;

/// SSH banner checker
pub struct SshProbe;

#[async_trait::async_trait]
impl Probe for SshProbe {
    fn arguments(&self) -> &'static [(&'static str, &'static str)] {
        &[("port", "^[0-9]+$")]
    }

    fn example(&self) -> &'static str {
        "
SSH Tester
----------
 The SSH tester connects to a remote host and ensures that a
 response is received that looks like an SSH-server banner.

 This test is invoked via input like so:

    host.example.com must run ssh [with port 2222]
"
    }

    async fn run_test(&self, test: &Test, target: &str, opts: ExecutionOptions) -> Result<()> {
        let port: u16 = numeric_argument(test, "port", 22)?;
        let deadline = Instant::now() + opts.timeout;

        let mut stream = connect(target, port, opts.timeout).await?;

        let mut banner = [0u8; 255];
        let read = timeout_at(deadline, stream.read(&mut banner))
            .await
            .map_err(|_| anyhow!("Timed out waiting for SSH banner from {}", target))??;

        let banner = String::from_utf8_lossy(&banner[..read]);
        if opts.verbose {
            tracing::debug!(target_addr = target, banner = %banner.trim_end(), "SSH banner");
        }

        if banner.starts_with("SSH-") {
            Ok(())
        } else {
            Err(anyhow!("Server on {} port {} did not send an SSH banner", target, port))
        }
    }
}
