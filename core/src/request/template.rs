//! Object manifests for generated mutating requests

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde_json::json;

use crate::error::{Error, Result};

/// The manifest shapes this tool can generate bodies for.
///
/// Only kinds that tolerate arbitrary payloads are supported; a pod, say,
/// would need volumes and capacity to be in place before a POST succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyTemplate {
    /// v1 ConfigMap
    ConfigMap,
    /// v1 Secret
    Secret,
}

impl BodyTemplate {
    /// Resolve the template for a resource name.
    pub fn for_resource(resource: &str) -> Result<Self> {
        match resource {
            "configmaps" => Ok(BodyTemplate::ConfigMap),
            "secrets" => Ok(BodyTemplate::Secret),
            other => Err(Error::Construction(format!(
                "no body template for resource {other:?} (supported: configmaps, secrets)"
            ))),
        }
    }

    /// Render a manifest with the given name and payload.
    pub fn render(&self, name: &str, namespace: &str, payload: &str) -> Vec<u8> {
        let mut metadata = json!({ "name": name });
        if !namespace.is_empty() {
            metadata["namespace"] = json!(namespace);
        }

        let manifest = match self {
            BodyTemplate::ConfigMap => json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": metadata,
                "data": { "payload": payload },
            }),
            BodyTemplate::Secret => json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": metadata,
                "type": "Opaque",
                "stringData": { "payload": payload },
            }),
        };

        manifest.to_string().into_bytes()
    }
}

/// Generate a random alphanumeric payload of `size` bytes.
pub fn random_payload(size: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}
