/// Probe module - pluggable protocol checks
///
/// Each supported test type is a separate [`Probe`] implementation. The
/// worker looks probes up by name in a [`ProbeRegistry`] that is built once
/// at start-up and shared read-only afterwards.
pub mod http;
pub mod k8s;
pub mod ssh;
pub mod tcp;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::check::Test;
use crate::error::RegistryError;
use crate::options::ExecutionOptions;

pub use http::HttpProbe;
pub use k8s::K8sServiceProbe;
pub use ssh::SshProbe;
pub use tcp::TcpProbe;

/// Contract every check type implements.
///
/// Probes never retry on their own; the worker owns retry. They must bound
/// their I/O by `opts.timeout`, a probe that ignores it stalls its worker.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Accepted optional arguments and the regex their values must match
    fn arguments(&self) -> &'static [(&'static str, &'static str)];

    /// Whether the worker resolves the target and runs once per address
    fn should_resolve_hostname(&self) -> bool {
        true
    }

    /// Usage text for `vigil examples`
    fn example(&self) -> &'static str;

    /// Run the check against `target`, the resolved address or the raw target
    async fn run_test(&self, test: &Test, target: &str, opts: ExecutionOptions) -> Result<()>;
}

/// Produces a fresh probe for each job.
pub type ProbeFactory = Arc<dyn Fn() -> Box<dyn Probe> + Send + Sync>;

/// Immutable mapping from test type name to probe factory.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    factories: HashMap<String, ProbeFactory>,
}

impl ProbeRegistry {
    pub fn builder() -> ProbeRegistryBuilder {
        ProbeRegistryBuilder::default()
    }

    /// Registry holding every probe shipped with this crate.
    pub fn with_defaults() -> Self {
        let factories =
            default_factories().into_iter().map(|(name, factory)| (name.to_string(), factory));
        Self { factories: factories.collect() }
    }

    /// Fresh probe instance for `kind`.
    pub fn get(&self, kind: &str) -> Result<Box<dyn Probe>, RegistryError> {
        self.factories
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownProbe(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeRegistry").field("probes", &self.names()).finish()
    }
}

#[derive(Default)]
pub struct ProbeRegistryBuilder {
    factories: HashMap<String, ProbeFactory>,
}

impl ProbeRegistryBuilder {
    /// Register a factory; a name may only be registered once.
    pub fn register<F>(mut self, name: &str, factory: F) -> Result<Self, RegistryError>
    where
        F: Fn() -> Box<dyn Probe> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
        Ok(self)
    }

    pub fn build(self) -> ProbeRegistry {
        ProbeRegistry { factories: self.factories }
    }
}

fn default_factories() -> Vec<(&'static str, ProbeFactory)> {
    vec![
        ("http", Arc::new(|| Box::new(HttpProbe) as Box<dyn Probe>)),
        ("https", Arc::new(|| Box::new(HttpProbe) as Box<dyn Probe>)),
        ("k8s-svc", Arc::new(|| Box::new(K8sServiceProbe) as Box<dyn Probe>)),
        ("ssh", Arc::new(|| Box::new(SshProbe) as Box<dyn Probe>)),
        ("tcp", Arc::new(|| Box::new(TcpProbe) as Box<dyn Probe>)),
    ]
}

/// Parse a numeric argument, falling back to `default` when absent.
pub(crate) fn numeric_argument<T>(test: &Test, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match test.argument(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", raw, name, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait::async_trait]
    impl Probe for Noop {
        fn arguments(&self) -> &'static [(&'static str, &'static str)] {
            &[]
        }

        fn example(&self) -> &'static str {
            "noop"
        }

        async fn run_test(&self, _: &Test, _: &str, _: ExecutionOptions) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_registry() {
        let registry = ProbeRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["http", "https", "k8s-svc", "ssh", "tcp"]);
        // No default silently replaces another
        assert_eq!(default_factories().len(), registry.names().len());
        assert!(!registry.get("k8s-svc").unwrap().should_resolve_hostname());
        assert!(registry.get("tcp").unwrap().should_resolve_hostname());
    }

    #[test]
    fn test_unknown_probe_is_an_error() {
        let registry = ProbeRegistry::with_defaults();
        let err = registry.get("gopher").err().unwrap();
        assert!(matches!(err, RegistryError::UnknownProbe(ref name) if name == "gopher"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = ProbeRegistry::builder()
            .register("noop", || Box::new(Noop))
            .unwrap()
            .register("noop", || Box::new(Noop));
        assert!(matches!(result, Err(RegistryError::Duplicate(_))));
    }

    #[test]
    fn test_numeric_argument() {
        let test = Test::new("tcp", "example.com").with_argument("port", "8080");
        assert_eq!(numeric_argument::<u16>(&test, "port", 22).unwrap(), 8080);
        assert_eq!(numeric_argument::<u16>(&test, "missing", 22).unwrap(), 22);

        let bad = Test::new("tcp", "example.com").with_argument("port", "99999");
        assert!(numeric_argument::<u16>(&bad, "port", 22).is_err());
    }

    #[test]
    fn test_every_probe_has_valid_argument_patterns() {
        let registry = ProbeRegistry::with_defaults();
        for name in registry.names() {
            let probe = registry.get(name).unwrap();
            assert!(!probe.example().is_empty());
            for (argument, pattern) in probe.arguments() {
                assert!(regex::Regex::new(pattern).is_ok(), "{name}/{argument}: bad pattern");
            }
        }
    }
}
