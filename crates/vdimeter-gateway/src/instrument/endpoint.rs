//! Endpoint identity extraction for streaming requests.

use vdimeter_core::labels::{normalize_path, path_params};

/// Derives the logical endpoint a streaming request addresses.
pub trait EndpointResolver: Send + Sync + 'static {
    /// `route` is the matched route template (or the raw path when routing
    /// did not record one), `path` the concrete request path.
    fn resolve(&self, route: &str, path: &str) -> String;
}

/// Resolves `namespace/name` from route parameters.
#[derive(Debug, Clone)]
pub struct NamespacedNameResolver {
    pub namespace_param: String,
    pub name_param: String,
    pub default_namespace: String,
}

impl NamespacedNameResolver {
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: default_namespace.into(),
            ..Self::default()
        }
    }
}

impl Default for NamespacedNameResolver {
    fn default() -> Self {
        Self {
            namespace_param: "namespace".into(),
            name_param: "name".into(),
            default_namespace: "default".into(),
        }
    }
}

impl EndpointResolver for NamespacedNameResolver {
    fn resolve(&self, route: &str, path: &str) -> String {
        let params = path_params(route, path);
        let lookup = |key: &str| params.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);

        let Some(name) = lookup(&self.name_param) else {
            return normalize_path(path).to_string();
        };
        let namespace = lookup(&self.namespace_param).unwrap_or(self.default_namespace.as_str());
        format!("{namespace}/{name}")
    }
}
