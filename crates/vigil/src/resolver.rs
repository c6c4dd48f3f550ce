//! Target resolution and address-family filtering.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use url::{Host, Url};

use crate::error::ResolveError;
use crate::options::AddressFamilies;

/// Forward name lookup.
#[async_trait::async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Lookup through the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

#[async_trait::async_trait]
impl Lookup for SystemLookup {
    async fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((host, 0)).await? {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        Ok(ips)
    }
}

/// Turns test targets into the concrete addresses to probe.
#[derive(Clone)]
pub struct Resolver {
    lookup: Arc<dyn Lookup>,
    families: AddressFamilies,
}

impl Resolver {
    pub fn new(lookup: Arc<dyn Lookup>, families: AddressFamilies) -> Self {
        Self { lookup, families }
    }

    pub fn system(families: AddressFamilies) -> Self {
        Self::new(Arc::new(SystemLookup), families)
    }

    /// Resolve `target` and keep the addresses of enabled families, in
    /// lookup order.
    ///
    /// An empty result means every address belonged to a disabled family.
    pub async fn resolve(&self, target: &str) -> Result<Vec<String>, ResolveError> {
        let host = host_of(target)?;

        let ips = self
            .lookup
            .lookup_ip(&host)
            .await
            .map_err(|source| ResolveError::Lookup { host: host.clone(), source })?;

        // IPv4-mapped IPv6 addresses are probed and reported as IPv4
        let mut targets: Vec<String> = Vec::with_capacity(ips.len());
        for ip in ips.into_iter().map(|ip| ip.to_canonical()).filter(|ip| self.enabled(ip)) {
            let target = ip.to_string();
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    fn enabled(&self, ip: &IpAddr) -> bool {
        match ip {
            IpAddr::V4(_) => self.families.ipv4,
            IpAddr::V6(_) => self.families.ipv6,
        }
    }
}

/// The host part of a target: URIs are reduced to their host, anything else
/// is taken as-is.
pub fn host_of(target: &str) -> Result<String, ResolveError> {
    if !target.contains("://") {
        return Ok(target.to_string());
    }

    let url = Url::parse(target).map_err(|e| ResolveError::InvalidUri {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        None => Err(ResolveError::InvalidUri {
            target: target.to_string(),
            reason: "no host component".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticLookup(HashMap<&'static str, Vec<IpAddr>>);

    #[async_trait::async_trait]
    impl Lookup for StaticLookup {
        async fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>> {
            self.0
                .get(host)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"))
        }
    }

    fn resolver(ipv4: bool, ipv6: bool) -> Resolver {
        let lookup = StaticLookup(HashMap::from([(
            "dual.example.com",
            vec![
                "192.0.2.1".parse().unwrap(),
                "2001:db8::1".parse().unwrap(),
                "::ffff:192.0.2.2".parse().unwrap(),
            ],
        )]));
        Resolver::new(Arc::new(lookup), AddressFamilies { ipv4, ipv6 })
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("example.com").unwrap(), "example.com");
        assert_eq!(host_of("https://example.com:8443/path?q=1").unwrap(), "example.com");
        assert_eq!(host_of("http://[2001:db8::1]:8080/").unwrap(), "2001:db8::1");
        assert_eq!(host_of("http://user:pw@192.0.2.1/").unwrap(), "192.0.2.1");
        assert!(matches!(host_of("http://[broken/"), Err(ResolveError::InvalidUri { .. })));
    }

    #[tokio::test]
    async fn test_both_families() {
        let addrs = resolver(true, true).resolve("https://dual.example.com/").await.unwrap();
        assert_eq!(addrs, vec!["192.0.2.1", "2001:db8::1", "192.0.2.2"]);
    }

    #[tokio::test]
    async fn test_family_filtering() {
        let v4 = resolver(true, false).resolve("dual.example.com").await.unwrap();
        assert_eq!(v4, vec!["192.0.2.1", "192.0.2.2"]);

        let v6 = resolver(false, true).resolve("dual.example.com").await.unwrap();
        assert_eq!(v6, vec!["2001:db8::1"]);

        let none = resolver(false, false).resolve("dual.example.com").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_mapped_ipv4_reported_dotted() {
        let lookup = StaticLookup(HashMap::from([(
            "host.example",
            vec!["::ffff:192.0.2.2".parse().unwrap(), "192.0.2.2".parse().unwrap()],
        )]));
        let resolver = Resolver::new(Arc::new(lookup), AddressFamilies { ipv4: true, ipv6: false });

        assert_eq!(resolver.resolve("host.example").await.unwrap(), vec!["192.0.2.2"]);
    }

    #[tokio::test]
    async fn test_lookup_failure() {
        let err = resolver(true, true).resolve("missing.example.com").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to resolve name missing.example.com");
    }

    #[tokio::test]
    async fn test_system_lookup_of_literal() {
        let resolver = Resolver::system(AddressFamilies::default());
        let addrs = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1"]);
    }
}
