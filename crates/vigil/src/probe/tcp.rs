use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{Probe, numeric_argument};
use crate::check::Test;
use crate::options::ExecutionOptions;

/// TCP port checker
pub struct TcpProbe;

#[async_trait::async_trait]
impl Probe for TcpProbe {
    fn arguments(&self) -> &'static [(&'static str, &'static str)] {
        &[("port", "^[0-9]+$")]
    }

    fn example(&self) -> &'static str {
        "
TCP Tester
----------
 The TCP tester connects to the given port and succeeds if the
 connection is accepted within the timeout.

 This test is invoked via input like so:

    host.example.com must run tcp with port 25
"
    }

    async fn run_test(&self, test: &Test, target: &str, opts: ExecutionOptions) -> Result<()> {
        let port: u16 = numeric_argument(test, "port", 0)?;
        if port == 0 {
            return Err(anyhow!("A port must be specified for tcp tests"));
        }

        connect(target, port, opts.timeout).await?;
        Ok(())
    }
}

/// Open a connection to `target:port`, bounded by `limit`.
///
/// `target` is normally a resolved IP address; anything else is handed to
/// the system resolver.
pub(crate) async fn connect(target: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    let attempt = async {
        match target.parse::<IpAddr>() {
            Ok(ip) => TcpStream::connect(SocketAddr::new(ip, port)).await,
            Err(_) => TcpStream::connect((target, port)).await,
        }
    };

    timeout(limit, attempt)
        .await
        .map_err(|_| anyhow!("Connection to {} port {} timed out after {:?}", target, port, limit))?
        .map_err(|e| anyhow!("Connection to {} port {} failed: {}", target, port, e))
}
