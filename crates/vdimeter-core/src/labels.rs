//! Label sets attached to instrument observations.
//!
//! Labels are derived once per request (or once per upgraded connection) and
//! never change afterwards.

use serde::Deserialize;

/// Streaming channel carried by an upgraded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Remote desktop display (video) stream.
    Display,
    /// Remote desktop audio stream.
    Audio,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Display => "display",
            ChannelKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of the latency histogram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestLabel {
    pub path: String,
    pub method: String,
}

impl RequestLabel {
    /// Build a label from a route path (normalized here) and an HTTP method.
    pub fn new(path: &str, method: &str) -> Self {
        Self {
            path: normalize_path(path).to_string(),
            method: method.to_string(),
        }
    }

    /// Values in `[path, method]` order.
    pub fn values(&self) -> [&str; 2] {
        [&self.path, &self.method]
    }

    /// Attach a final status code.
    pub fn with_status(&self, status: u16) -> ResponseLabel {
        ResponseLabel {
            path: self.path.clone(),
            method: self.method.clone(),
            status,
        }
    }
}

/// Key of the request counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseLabel {
    pub path: String,
    pub method: String,
    pub status: u16,
}

impl ResponseLabel {
    /// Status rendered the way it appears in the `code` label.
    pub fn code(&self) -> String {
        self.status.to_string()
    }
}

/// Identity of one upgraded connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamLabel {
    /// Logical destination, e.g. `namespace/desktop`.
    pub endpoint: String,
    /// Client address without its port.
    pub peer: String,
}

impl StreamLabel {
    /// `peer` may carry a port; it is stripped.
    pub fn new(endpoint: impl Into<String>, peer: &str) -> Self {
        Self {
            endpoint: endpoint.into(),
            peer: peer_host(peer).to_string(),
        }
    }

    /// Values in `[desktop, client]` order.
    pub fn values(&self) -> [&str; 2] {
        [&self.endpoint, &self.peer]
    }
}

/// Strip trailing slashes. The root path stays `/`.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Host part of a peer address.
///
/// Accepts `host:port`, `[v6]:port` and bare hosts (including bare IPv6).
pub fn peer_host(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split_once(']').map(|(host, _)| host).unwrap_or(rest);
    }
    match addr.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => addr,
    }
}

/// Align a route template with a concrete path and collect its parameters.
///
/// Supports `:name`, `{name}` and trailing `*rest` segments. Returns an empty
/// list when the path does not fit the template.
pub fn path_params<'r, 'p>(route: &'r str, path: &'p str) -> Vec<(&'r str, &'p str)> {
    let route = normalize_path(route);
    let path = normalize_path(path);

    let mut params = Vec::new();
    let mut rest = Some(path);
    for seg in route.split('/') {
        let Some(current) = rest else {
            return Vec::new();
        };
        if let Some(name) = seg.strip_prefix('*') {
            params.push((name, current));
            return params;
        }
        let (value, tail) = match current.split_once('/') {
            Some((v, t)) => (v, Some(t)),
            None => (current, None),
        };
        match param_name(seg) {
            Some(name) => params.push((name, value)),
            None if seg == value => {}
            None => return Vec::new(),
        }
        rest = tail;
    }

    if rest.is_some() {
        return Vec::new();
    }
    params
}

fn param_name(seg: &str) -> Option<&str> {
    seg.strip_prefix(':')
        .or_else(|| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
}
