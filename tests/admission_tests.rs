//! Admission scenarios driven through the public API with a controlled clock.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::Request;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use quota_gate::admission::{
    AdmissionEngine, BlockReason, ClientIdentity, Limits, Rejection, StatsReporter, nonzero,
};
use quota_gate::middleware::{TrustedProxyConfig, resolve_client_identity};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

fn engine(per_hour: u32, per_minute: u32, block_minutes: u32) -> AdmissionEngine {
    AdmissionEngine::new(Limits {
        requests_per_hour: nonzero(per_hour),
        ddos_requests_per_minute: nonzero(per_minute),
        block_duration_minutes: nonzero(block_minutes),
    })
}

#[test]
fn test_steady_client_over_two_hours() {
    let engine = engine(60, 20, 60);
    let client = ClientIdentity::new("198.51.100.1");
    let t0 = start();

    // One request a minute for an hour fills the quota exactly
    for minute in 0..60 {
        let now = t0 + TimeDelta::minutes(minute);
        assert!(engine.decide(&client, now).is_ok(), "minute {minute}");
    }

    let over = engine.decide(&client, t0 + TimeDelta::seconds(3590));
    assert!(matches!(
        over,
        Err(Rejection::RateLimited {
            hourly_count: 61,
            limit: 60,
            reset_in_minutes: 1,
        })
    ));

    // Window opened at t0, so t0 + 1h starts a new one
    let admission = engine
        .decide(&client, t0 + TimeDelta::hours(1))
        .expect("new window should admit");
    assert_eq!(admission.hourly_count, 1);
}

#[test]
fn test_flood_block_lifecycle() {
    let engine = engine(1000, 10, 5);
    let attacker = ClientIdentity::new("203.0.113.9");
    let bystander = ClientIdentity::new("203.0.113.10");
    let t0 = start();

    for i in 0..10 {
        engine
            .decide(&attacker, t0 + TimeDelta::milliseconds(i * 10))
            .expect("within threshold");
    }
    let flood = engine.decide(&attacker, t0 + TimeDelta::milliseconds(200));
    assert!(matches!(
        flood,
        Err(Rejection::DdosBlocked {
            minute_count: 11,
            block_duration_minutes: 5,
        })
    ));

    // Bystanders keep flowing
    assert!(engine.decide(&bystander, t0 + TimeDelta::seconds(1)).is_ok());

    let blocked = engine.decide(&attacker, t0 + TimeDelta::minutes(2));
    assert!(matches!(
        blocked,
        Err(Rejection::Blocked {
            remaining_minutes: 4,
            ..
        })
    ));

    let reporter = StatsReporter::new(&engine);
    let detail = reporter.detailed_snapshot(t0 + TimeDelta::minutes(2));
    assert_eq!(detail.blocked.len(), 1);
    assert_eq!(detail.blocked[0].identity, attacker);
    assert_eq!(detail.blocked[0].reason, BlockReason::Ddos);

    // Block and minute window both lapsed
    let after = t0 + TimeDelta::minutes(6);
    assert!(engine.decide(&attacker, after).is_ok());

    let health = StatsReporter::new(&engine).health_snapshot(after);
    assert_eq!(health.blocked_identity_count, 0);
    assert_eq!(health.counters.ddos_blocked_requests, 1);
    assert_eq!(health.counters.blocked_requests, 1);
    assert_eq!(health.counters.total_requests, 14);
}

#[test]
fn test_manual_block_outlives_quota_reset() {
    let engine = engine(5, 20, 60);
    let client = ClientIdentity::new("192.0.2.44");
    let t0 = start();

    engine.manual_block(&client, t0, nonzero(120));

    assert!(matches!(
        engine.decide(&client, t0 + TimeDelta::minutes(90)),
        Err(Rejection::Blocked { .. })
    ));
    assert!(engine.decide(&client, t0 + TimeDelta::minutes(120)).is_ok());
}

#[test]
fn test_sweep_reclaims_idle_clients() {
    let engine = engine(60, 20, 1);
    let t0 = start();

    for i in 0..50 {
        let client = ClientIdentity::new(format!("10.0.0.{i}"));
        engine.decide(&client, t0).expect("first request admitted");
    }
    engine.manual_block(&ClientIdentity::new("10.0.0.1"), t0, nonzero(1));
    assert_eq!(engine.tracked_identity_count(), 50);

    let report = engine.sweep(t0 + TimeDelta::minutes(30));
    assert_eq!(report.dropped_records, 0);
    assert_eq!(report.expired_blocks.len(), 1);

    let report = engine.sweep(t0 + TimeDelta::hours(2));
    assert_eq!(report.dropped_records, 50);
    assert_eq!(engine.tracked_identity_count(), 0);
    assert_eq!(engine.active_identity_count(t0 + TimeDelta::hours(2)), 0);
}

#[test]
fn test_spoofed_forwarding_headers_cannot_evade_quota() {
    let engine = engine(2, 20, 60);
    let proxies = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
    let direct_peer = "198.51.100.77:50000".parse().ok();
    let t0 = start();

    let mut outcomes = Vec::new();
    for i in 0..3 {
        let req = Request::get("/")
            .header("x-forwarded-for", format!("203.0.113.{i}"))
            .body(Body::empty())
            .unwrap();
        let identity = resolve_client_identity(&req, direct_peer, &proxies);
        assert_eq!(identity.as_str(), "198.51.100.77");
        outcomes.push(engine.decide(&identity, t0).is_ok());
    }

    assert_eq!(outcomes, vec![true, true, false]);
}

#[test]
fn test_trusted_proxy_separates_clients() {
    let engine = engine(1, 20, 60);
    let proxies = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
    let proxy_peer = "10.1.2.3:443".parse().ok();
    let t0 = start();

    for i in 0..3 {
        let req = Request::get("/")
            .header("x-forwarded-for", format!("203.0.113.{i}, 10.1.2.3"))
            .body(Body::empty())
            .unwrap();
        let identity = resolve_client_identity(&req, proxy_peer, &proxies);
        assert!(engine.decide(&identity, t0).is_ok());
    }

    assert_eq!(engine.active_identity_count(t0), 3);
}
