use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use super::{Probe, numeric_argument};
use crate::check::Test;
use crate::options::ExecutionOptions;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Kubernetes service endpoint-count checker
///
/// The target is `namespace/service`, not a host name, so it is never
/// resolved.
pub struct K8sServiceProbe;

#[async_trait::async_trait]
impl Probe for K8sServiceProbe {
    fn arguments(&self) -> &'static [(&'static str, &'static str)] {
        &[("min-endpoints", "^[0-9]+$")]
    }

    fn should_resolve_hostname(&self) -> bool {
        false
    }

    fn example(&self) -> &'static str {
        "
K8SSvc Tester
-------------
 The Kubernetes service tester checks that a service has at least
 the given number of available endpoints (default 1).

 This test is invoked via input like so:

    namespace-name/service-name must run k8s-svc

 The number of endpoints required can be raised:

    default/web must run k8s-svc with min-endpoints 2

 When KUBE_CONFIG_PATH is set, the API server and credentials come
 from that kubeconfig's current context. Otherwise the pod's service
 account is used; KUBE_API_SERVER and KUBE_TOKEN override it when set.
"
    }

    async fn run_test(&self, test: &Test, target: &str, opts: ExecutionOptions) -> Result<()> {
        let (namespace, service) = parse_target(target)?;
        let min_endpoints: usize = numeric_argument(test, "min-endpoints", 1)?;

        let access = ClusterAccess::from_env()?;
        let available = access.available_endpoints(namespace, service, opts.timeout).await?;

        if opts.verbose {
            tracing::debug!(namespace, service, available, min_endpoints, "Endpoint count");
        }
        if available < min_endpoints {
            return Err(anyhow!(
                "number of available endpoints ({}) is lower than min defined ({})",
                available,
                min_endpoints
            ));
        }
        Ok(())
    }
}

fn parse_target(target: &str) -> Result<(&str, &str)> {
    match target.split_once('/') {
        Some((namespace, service))
            if !namespace.is_empty() && !service.is_empty() && !service.contains('/') =>
        {
            Ok((namespace, service))
        }
        _ => Err(anyhow!("not a valid namespace-name/service-name target provided: {}", target)),
    }
}

/// How to reach the Kubernetes API server.
#[derive(Debug, Clone)]
pub struct ClusterAccess {
    pub api_server: String,
    pub token: Option<String>,
    pub ca_pem: Option<Vec<u8>>,
    pub insecure: bool,
}

impl ClusterAccess {
    /// `KUBE_CONFIG_PATH` when set, otherwise in-cluster configuration with
    /// `KUBE_API_SERVER`/`KUBE_TOKEN` overrides.
    pub fn from_env() -> Result<Self> {
        if let Some(path) = env::var_os("KUBE_CONFIG_PATH").filter(|path| !path.is_empty()) {
            return Self::from_kubeconfig(Path::new(&path));
        }
        Self::in_cluster()
    }

    fn in_cluster() -> Result<Self> {
        let account = Path::new(SERVICE_ACCOUNT_DIR);

        let api_server = match env::var("KUBE_API_SERVER") {
            Ok(server) => server,
            Err(_) => {
                let host = env::var("KUBERNETES_SERVICE_HOST")
                    .context("not running in a cluster: KUBERNETES_SERVICE_HOST is unset")?;
                let port = env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
                if host.contains(':') {
                    format!("https://[{host}]:{port}")
                } else {
                    format!("https://{host}:{port}")
                }
            }
        };

        let token = match env::var("KUBE_TOKEN") {
            Ok(token) => Some(token),
            Err(_) => fs::read_to_string(account.join("token"))
                .ok()
                .map(|token| token.trim().to_string()),
        };
        let ca_pem = fs::read(account.join("ca.crt")).ok();

        Ok(Self { api_server, token, ca_pem, insecure: false })
    }

    /// Server, CA and bearer token of the kubeconfig's current context.
    ///
    /// Relative file references are taken from the kubeconfig's directory.
    /// Client certificate authentication is not supported.
    pub fn from_kubeconfig(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        let kubeconfig: Kubeconfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse kubeconfig {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));

        let context_name = kubeconfig
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow!("kubeconfig {} has no current-context", path.display()))?;
        let context = &kubeconfig
            .contexts
            .iter()
            .find(|named| named.name == context_name)
            .ok_or_else(|| anyhow!("context {} not found in kubeconfig", context_name))?
            .context;
        let cluster = &kubeconfig
            .clusters
            .iter()
            .find(|named| named.name == context.cluster)
            .ok_or_else(|| anyhow!("cluster {} not found in kubeconfig", context.cluster))?
            .cluster;
        let user = context
            .user
            .as_deref()
            .and_then(|name| kubeconfig.users.iter().find(|named| named.name == name))
            .map(|named| &named.user);

        let ca_pem = match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
            (Some(data), _) => Some(
                STANDARD
                    .decode(data.trim())
                    .context("invalid certificate-authority-data in kubeconfig")?,
            ),
            (None, Some(file)) => Some(
                fs::read(base.join(file))
                    .with_context(|| format!("Failed to read certificate authority {}", file))?,
            ),
            (None, None) => None,
        };

        let token = match user {
            Some(KubeUser { token: Some(token), .. }) => Some(token.clone()),
            Some(KubeUser { token_file: Some(file), .. }) => Some(
                fs::read_to_string(base.join(file))
                    .with_context(|| format!("Failed to read token file {}", file))?
                    .trim()
                    .to_string(),
            ),
            _ => None,
        };

        Ok(Self {
            api_server: cluster.server.clone(),
            token,
            ca_pem,
            insecure: cluster.insecure_skip_tls_verify,
        })
    }

    /// Count ready addresses behind `namespace/service`.
    pub async fn available_endpoints(
        &self,
        namespace: &str,
        service: &str,
        timeout: Duration,
    ) -> Result<usize> {
        let mut builder = reqwest::Client::builder().timeout(timeout).no_proxy();
        if let Some(pem) = &self.ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }
        if self.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;

        let url = format!(
            "{}/api/v1/namespaces/{}/endpoints/{}",
            self.api_server.trim_end_matches('/'),
            namespace,
            service
        );
        let mut request = client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response =
            request.send().await.map_err(|e| anyhow!("Kubernetes API request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Kubernetes API returned {} for service {}/{}",
                response.status(),
                namespace,
                service
            ));
        }

        let endpoints: Endpoints = response.json().await?;
        Ok(endpoints.subsets.iter().map(|subset| subset.addresses.len()).sum())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    current_context: Option<String>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: KubeContext,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: KubeCluster,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: KubeUser,
}

#[derive(Debug, Deserialize)]
struct KubeContext {
    cluster: String,
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeCluster {
    server: String,
    certificate_authority: Option<String>,
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KubeUser {
    token: Option<String>,
    token_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Endpoints {
    #[serde(default)]
    subsets: Vec<Subset>,
}

#[derive(Debug, Deserialize)]
struct Subset {
    #[serde(default)]
    addresses: Vec<serde_json::Value>,
}
