//! Fuzz testing for client identity resolution and operator input validation.
//!
//! Forwarding headers, trusted proxy lists and operator paths all arrive from
//! outside. This target checks that none of them can make the gateway panic
//! and that resolution always yields a usable identity.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the identity fuzz target
//! cargo +nightly fuzz run fuzz_identity
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_identity -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `resolve_client_identity`: header precedence and trusted proxy checks
//! - `TrustedProxyConfig::new`: CIDR parsing of arbitrary strings
//! - `validate_identity` and `validate_block_minutes`: operator input bounds
//! - `validate_request_target`: request URIs reaching the proxy

#![no_main]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use arbitrary::Arbitrary;
use axum::body::Body;
use axum::http::Request;
use libfuzzer_sys::fuzz_target;
use quota_gate::middleware::{TrustedProxyConfig, resolve_client_identity};
use quota_gate::validation::{validate_block_minutes, validate_identity, validate_request_target};

#[derive(Debug, Arbitrary)]
struct Input {
    forwarded_for: String,
    real_ip: String,
    peer: Option<([u8; 4], u16)>,
    trusted_proxies: Vec<String>,
    target: String,
    minutes: u32,
}

fuzz_target!(|input: Input| {
    let proxies = TrustedProxyConfig::new(&input.trusted_proxies);

    let mut builder = Request::get("/");
    if let Ok(value) = axum::http::HeaderValue::from_str(&input.forwarded_for) {
        builder = builder.header("x-forwarded-for", value);
    }
    if let Ok(value) = axum::http::HeaderValue::from_str(&input.real_ip) {
        builder = builder.header("x-real-ip", value);
    }
    let Ok(req) = builder.body(Body::empty()) else {
        return;
    };

    let peer = input
        .peer
        .map(|(octets, port)| SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port));

    let identity = resolve_client_identity(&req, peer, &proxies);
    assert!(!identity.as_str().trim().is_empty());

    let _ = validate_identity(identity.as_str());
    let _ = validate_identity(&input.real_ip);
    let _ = validate_block_minutes(input.minutes);

    if let Ok(req) = Request::get(input.target.as_str()).body(Body::empty()) {
        let _ = validate_request_target(&req);
    }
});
