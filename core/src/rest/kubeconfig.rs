//! Minimal kubeconfig loading
//!
//! Only the pieces a load generator needs: the current context's server URL,
//! bearer token and TLS-verification flag. Exec plugins, client certificates
//! and multi-document merging are not supported.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Connection parameters resolved from a kubeconfig.
#[derive(Debug, Clone)]
pub struct ClusterAccess {
    /// API server base URL.
    pub server: String,
    /// Bearer token, if the user entry carries one.
    pub token: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(default, rename = "current-context")]
    current_context: String,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
struct Cluster {
    server: String,
    #[serde(default, rename = "insecure-skip-tls-verify")]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    #[serde(default)]
    user: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: User,
}

#[derive(Debug, Default, Deserialize)]
struct User {
    #[serde(default)]
    token: Option<String>,
}

/// Load and resolve the kubeconfig file at `path`.
pub fn load(path: &str) -> Result<ClusterAccess> {
    let data = std::fs::read_to_string(path)?;
    resolve(&data)
}

/// Resolve the current context of kubeconfig YAML content.
pub fn resolve(data: &str) -> Result<ClusterAccess> {
    let config: Kubeconfig = serde_yaml::from_str(data)?;

    if config.current_context.is_empty() {
        return Err(Error::Client("kubeconfig has no current-context".to_string()));
    }

    let context = config
        .contexts
        .iter()
        .find(|c| c.name == config.current_context)
        .map(|c| &c.context)
        .ok_or_else(|| {
            Error::Client(format!(
                "context {:?} not found in kubeconfig",
                config.current_context
            ))
        })?;

    let cluster = config
        .clusters
        .iter()
        .find(|c| c.name == context.cluster)
        .map(|c| &c.cluster)
        .ok_or_else(|| {
            Error::Client(format!(
                "cluster {:?} not found in kubeconfig",
                context.cluster
            ))
        })?;

    let token = config
        .users
        .iter()
        .find(|u| u.name == context.user)
        .and_then(|u| u.user.token.clone());

    Ok(ClusterAccess {
        server: cluster.server.clone(),
        token,
        insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: bench
clusters:
- name: bench-cluster
  cluster:
    server: https://10.0.0.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: bench
  context:
    cluster: bench-cluster
    user: bench-user
users:
- name: bench-user
  user:
    token: abc123
"#;

    #[test]
    fn test_resolve_current_context() {
        let access = resolve(KUBECONFIG).unwrap();
        assert_eq!(access.server, "https://10.0.0.1:6443");
        assert_eq!(access.token.as_deref(), Some("abc123"));
        assert!(access.insecure_skip_tls_verify);
    }

    #[test]
    fn test_missing_context_fails() {
        let input = KUBECONFIG.replace("current-context: bench", "current-context: other");
        assert!(resolve(&input).is_err());
    }

    #[test]
    fn test_missing_current_context_fails() {
        let input = KUBECONFIG.replace("current-context: bench\n", "");
        assert!(resolve(&input).is_err());
    }
}
