//! Shared helpers for gateway integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use prometheus::{Registry, DEFAULT_BUCKETS};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration};

use vdimeter_core::ChannelKind;
use vdimeter_gateway::obs::Metrics;

pub const NS: &str = "test";

pub fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new(Registry::new(), NS, DEFAULT_BUCKETS.to_vec()).unwrap())
}

/// Number of label sets recorded under a metric family.
pub fn series_count(m: &Metrics, name: &str) -> usize {
    m.registry()
        .gather()
        .iter()
        .filter(|f| f.get_name() == name)
        .map(|f| f.get_metric().len())
        .sum()
}

pub fn upgrade_request(path: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: vdi-raw\r\n\r\n"
    )
}

/// Read a response head byte by byte so nothing after it is consumed.
pub async fn read_head(conn: &mut TcpStream) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let b = conn.read_u8().await.expect("connection closed before response head");
        head.push(b);
    }
    String::from_utf8(head).unwrap()
}

/// Gauge updates happen when the server side drops the stream; poll for it.
pub async fn wait_for_active(m: &Metrics, kind: ChannelKind, want: i64) {
    for _ in 0..300 {
        if m.active_streams(kind) == want {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(m.active_streams(kind), want, "active {kind} streams");
}
