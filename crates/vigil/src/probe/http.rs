use std::net::{IpAddr, SocketAddr};

use anyhow::{Result, anyhow};
use url::{Host, Url};

use super::{Probe, numeric_argument};
use crate::check::Test;
use crate::options::ExecutionOptions;

/// HTTP/HTTPS checker
///
/// Requests go to the resolved address while keeping the original host name
/// for the `Host` header and TLS server name.
pub struct HttpProbe;

#[async_trait::async_trait]
impl Probe for HttpProbe {
    fn arguments(&self) -> &'static [(&'static str, &'static str)] {
        &[("status", "^[0-9]{3}$"), ("content", ".*")]
    }

    fn example(&self) -> &'static str {
        "
HTTP Tester
-----------
 The HTTP tester fetches a URL and checks the response status,
 which must be 200 unless another status is given. Redirects are
 not followed. Optionally the body must contain some text.

 This test is invoked via input like so:

    https://example.com/ must run https
    http://example.com/ must run http with status 301
    https://example.com/ must run https with content 'Example Domain'
"
    }

    async fn run_test(&self, test: &Test, target: &str, opts: ExecutionOptions) -> Result<()> {
        let url = request_url(test)?;
        let expected: u16 = numeric_argument(test, "status", 200)?;

        let mut builder = reqwest::Client::builder()
            .timeout(opts.timeout)
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none());

        if let (Some(Host::Domain(domain)), Ok(ip)) = (url.host(), target.parse::<IpAddr>()) {
            let port = url.port_or_known_default().unwrap_or(80);
            builder = builder.resolve(domain, SocketAddr::new(ip, port));
        }

        let client = builder.build()?;
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request to {} via {} failed: {}", url, target, e))?;

        let status = response.status().as_u16();
        if opts.verbose {
            tracing::debug!(%url, target_addr = target, status, "HTTP response");
        }
        if status != expected {
            return Err(anyhow!("Status code was {} not {}", status, expected));
        }

        if let Some(content) = test.argument("content") {
            let body = response.text().await?;
            if !body.contains(content) {
                return Err(anyhow!("Body didn't contain '{}'", content));
            }
        }

        Ok(())
    }
}

/// The URL to request; bare host names get the test type as scheme.
fn request_url(test: &Test) -> Result<Url> {
    let raw = if test.target.contains("://") {
        test.target.clone()
    } else {
        let scheme = if test.kind == "https" { "https" } else { "http" };
        format!("{}://{}/", scheme, test.target)
    };

    let url = Url::parse(&raw).map_err(|e| anyhow!("Invalid URL {}: {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("Unsupported URL scheme: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the port.
    async fn serve_once(response: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        port
    }

    fn options() -> ExecutionOptions {
        ExecutionOptions { verbose: false, timeout: Duration::from_secs(5) }
    }

    const OK: &str =
        "HTTP/1.1 200 OK\r\nContent-Length: 13\r\nConnection: close\r\n\r\nHello, world!";

    #[test]
    fn test_request_url() {
        let bare = Test::new("https", "example.com");
        assert_eq!(request_url(&bare).unwrap().as_str(), "https://example.com/");

        let full = Test::new("http", "http://example.com:8080/status");
        assert_eq!(request_url(&full).unwrap().port(), Some(8080));

        let ftp = Test::new("http", "ftp://example.com/");
        assert!(request_url(&ftp).is_err());
    }

    #[tokio::test]
    async fn test_http_pins_resolved_address() {
        let port = serve_once(OK).await;
        // The name never reaches DNS: it is pinned to the probed address
        let test = Test::new("http", format!("http://service.invalid:{port}/"));

        let result = HttpProbe.run_test(&test, "127.0.0.1", options()).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn test_http_content_mismatch() {
        let port = serve_once(OK).await;
        let test = Test::new("http", format!("http://service.invalid:{port}/"))
            .with_argument("content", "Goodbye");

        let err = HttpProbe.run_test(&test, "127.0.0.1", options()).await.unwrap_err();
        assert!(err.to_string().contains("Goodbye"));
    }

    #[tokio::test]
    async fn test_http_unexpected_status() {
        let port = serve_once(
            "HTTP/1.1 301 Moved Permanently\r\nLocation: /new\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let test = Test::new("http", format!("http://service.invalid:{port}/"));

        let err = HttpProbe.run_test(&test, "127.0.0.1", options()).await.unwrap_err();
        assert_eq!(err.to_string(), "Status code was 301 not 200");

        let port = serve_once(
            "HTTP/1.1 301 Moved Permanently\r\nLocation: /new\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let redirect = Test::new("http", format!("http://service.invalid:{port}/"))
            .with_argument("status", "301");
        assert!(HttpProbe.run_test(&redirect, "127.0.0.1", options()).await.is_ok());
    }
}
