#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use vdimeter_core::labels::{normalize_path, path_params, peer_host};
use vdimeter_core::{RequestLabel, StreamLabel};

#[test]
fn peer_host_strips_port() {
    assert_eq!(peer_host("10.0.0.5:51000"), "10.0.0.5");
    assert_eq!(peer_host("10.0.0.5"), "10.0.0.5");
    assert_eq!(peer_host("[::1]:8080"), "::1");
    assert_eq!(peer_host("fe80::1"), "fe80::1");
    assert_eq!(peer_host("client.example:443"), "client.example");
}

#[test]
fn trailing_slashes_are_stripped() {
    assert_eq!(normalize_path("/api/foo/"), "/api/foo");
    assert_eq!(normalize_path("/api/foo//"), "/api/foo");
    assert_eq!(normalize_path("/api/foo"), "/api/foo");
    assert_eq!(normalize_path("/"), "/");
}

#[test]
fn labels_are_normalized_once() {
    let req = RequestLabel::new("/api/foo/", "GET");
    assert_eq!(req.values(), ["/api/foo", "GET"]);

    let rsp = req.with_status(404);
    assert_eq!(rsp.path, "/api/foo");
    assert_eq!(rsp.code(), "404");

    let stream = StreamLabel::new("default/foo", "10.0.0.5:51000");
    assert_eq!(stream.values(), ["default/foo", "10.0.0.5"]);
}

#[test]
fn params_follow_the_template() {
    let got = path_params(
        "/api/desktops/ws/:namespace/:name/websockify",
        "/api/desktops/ws/team-a/foo/websockify",
    );
    assert_eq!(got, vec![("namespace", "team-a"), ("name", "foo")]);

    let got = path_params("/desktop/{name}/wsaudio", "/desktop/bar/wsaudio/");
    assert_eq!(got, vec![("name", "bar")]);

    let got = path_params("/files/*rest", "/files/a/b/c");
    assert_eq!(got, vec![("rest", "a/b/c")]);
}

#[test]
fn mismatched_paths_yield_nothing() {
    assert!(path_params("/desktop/:name/websockify", "/desktop/foo/wsaudio").is_empty());
    assert!(path_params("/desktop/:name", "/desktop/foo/extra").is_empty());
    assert!(path_params("/desktop/:name/websockify", "/desktop/foo").is_empty());
}
