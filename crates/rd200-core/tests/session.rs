//! Session tests against the scripted mock transport.
//!
//! These run without hardware:
//! `cargo test --package rd200-core --test session`

use std::time::Duration;

use rd200_core::commands::{READ_LEVELS, READ_PEAK, READ_UPTIME};
use rd200_core::mock::{MockOp, MockReply, MockTransport, frames};
use rd200_core::types::uuids::{LEGACY_WRITE, STANDARD_READ, STANDARD_WRITE};
use rd200_core::{
    CharacteristicPair, ConnectionFailureReason, Error, Metric, MetricValue, ProtocolVariant,
    RadonUnit, SessionConfig, run_session, run_session_with_config,
};

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";
const STANDARD_NAME: &str = "FR:RD-0001";
const LEGACY_NAME: &str = "FR:R2-1234";

fn standard_transport() -> MockTransport {
    MockTransport::standard(
        frames::standard_levels_with_counts(50, 40, 30, 12, 11),
        frames::standard_peak(370, "RD200", "V1.2.4"),
        frames::standard_uptime(1500),
    )
}

/// Every subscribe is followed by the matching unsubscribe before the next
/// subscribe.
fn assert_subscriptions_balanced(ops: &[MockOp]) {
    let mut open: Option<uuid::Uuid> = None;
    for op in ops {
        match op {
            MockOp::Subscribe(uuid) => {
                assert!(open.is_none(), "overlapping subscriptions in {:?}", ops);
                open = Some(*uuid);
            }
            MockOp::Unsubscribe(uuid) => {
                assert_eq!(open.take(), Some(*uuid), "unbalanced unsubscribe in {:?}", ops);
            }
            _ => {}
        }
    }
    assert!(open.is_none(), "subscription leaked in {:?}", ops);
}

#[tokio::test]
async fn test_standard_session_full_snapshot() {
    let transport = standard_transport();

    let snapshot = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    assert_eq!(snapshot.address, ADDRESS);
    assert_eq!(snapshot.name, STANDARD_NAME);
    assert_eq!(snapshot.identifier, STANDARD_NAME);
    assert_eq!(snapshot.variant, Some(ProtocolVariant::Standard));
    assert_eq!(snapshot.hw_version, "RD200");
    assert_eq!(snapshot.sw_version, "V1.2.4");
    assert!(snapshot.captured_at.is_some());

    assert_eq!(snapshot.number(Metric::Radon), Some(50.0));
    assert_eq!(snapshot.number(Metric::Radon1DayLevel), Some(40.0));
    assert_eq!(snapshot.number(Metric::Radon1MonthLevel), Some(30.0));
    assert_eq!(snapshot.number(Metric::RadonPeak), Some(370.0));
    assert_eq!(snapshot.number(Metric::RadonCNow), Some(12.0));
    assert_eq!(snapshot.number(Metric::RadonCLast), Some(11.0));
    assert_eq!(snapshot.number(Metric::RadonUptime), Some(90000.0));
    assert_eq!(
        snapshot.get(Metric::RadonUptimeString),
        Some(&MetricValue::Text("1d 01:00:00".to_string()))
    );

    let writes: Vec<_> = transport
        .operations()
        .into_iter()
        .filter(|op| matches!(op, MockOp::Write(..)))
        .collect();
    assert_eq!(
        writes,
        vec![
            MockOp::Write(STANDARD_WRITE, vec![READ_LEVELS]),
            MockOp::Write(STANDARD_WRITE, vec![READ_PEAK]),
            MockOp::Write(STANDARD_WRITE, vec![READ_UPTIME]),
        ]
    );
}

#[tokio::test]
async fn test_standard_session_pci_units() {
    let transport = standard_transport();

    let snapshot = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::PciPerL)
        .await
        .unwrap();

    assert_eq!(snapshot.unit, RadonUnit::PciPerL);
    assert_eq!(snapshot.number(Metric::Radon), Some(1.35));
    assert_eq!(snapshot.number(Metric::RadonPeak), Some(10.0));
    // Counters and uptime are not concentrations.
    assert_eq!(snapshot.number(Metric::RadonCNow), Some(12.0));
    assert_eq!(snapshot.number(Metric::RadonUptime), Some(90000.0));
}

#[tokio::test]
async fn test_operation_order_and_teardown() {
    let transport = standard_transport();
    run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    let ops = transport.operations();
    assert_eq!(ops.first(), Some(&MockOp::Connect(ADDRESS.to_string())));
    assert_eq!(ops.last(), Some(&MockOp::Disconnect));
    assert_eq!(transport.count(|op| matches!(op, MockOp::Disconnect)), 1);
    assert_eq!(
        transport.count(|op| *op == MockOp::Subscribe(STANDARD_READ)),
        3
    );
    assert_subscriptions_balanced(&ops);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_earlier_metrics() {
    let transport = standard_transport();
    transport.set_reply(CharacteristicPair::STANDARD, READ_PEAK, MockReply::Silence);

    let snapshot = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    assert_eq!(snapshot.number(Metric::Radon), Some(50.0));
    assert_eq!(snapshot.number(Metric::RadonUptime), Some(90000.0));
    assert!(!snapshot.has(Metric::RadonPeak));
    assert!(snapshot.hw_version.is_empty());

    let ops = transport.operations();
    assert_subscriptions_balanced(&ops);
    assert_eq!(ops.last(), Some(&MockOp::Disconnect));
}

#[tokio::test(start_paused = true)]
async fn test_every_command_silent_still_disconnects() {
    let transport = MockTransport::builder().build();

    let snapshot = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    assert!(snapshot.sensors.is_empty());
    assert_eq!(transport.operations().last(), Some(&MockOp::Disconnect));
}

#[tokio::test]
async fn test_wrong_length_reply_is_absent_not_zero() {
    let transport = standard_transport();
    transport.set_reply(
        CharacteristicPair::STANDARD,
        READ_LEVELS,
        MockReply::Frame(vec![0x50, 0x0A, 0x32, 0x00, 0x00]),
    );

    let snapshot = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    for metric in [
        Metric::Radon,
        Metric::Radon1DayLevel,
        Metric::Radon1MonthLevel,
        Metric::RadonCNow,
        Metric::RadonCLast,
    ] {
        assert!(!snapshot.has(metric), "{metric} should be absent");
    }
    assert_eq!(snapshot.number(Metric::RadonPeak), Some(370.0));
}

#[tokio::test]
async fn test_frame_before_write_is_discarded() {
    let transport = standard_transport();
    // Stale levels reply from a previous exchange, pushed as soon as the
    // next exchange subscribes.
    transport.push_late_frame(frames::standard_levels(999, 999, 999));

    let snapshot = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    assert_eq!(snapshot.number(Metric::Radon), Some(50.0));
    assert_eq!(snapshot.number(Metric::Radon1DayLevel), Some(40.0));
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_does_not_answer_next_command() {
    let transport = standard_transport();
    // Levels answers after its 5 s deadline, while the uptime exchange is
    // still waiting for its own reply.
    transport.set_reply(
        CharacteristicPair::STANDARD,
        READ_LEVELS,
        MockReply::Delayed(Duration::from_secs(6), frames::standard_levels(999, 1, 1)),
    );
    transport.set_reply(
        CharacteristicPair::STANDARD,
        READ_UPTIME,
        MockReply::Delayed(Duration::from_secs(3), frames::standard_uptime(60)),
    );

    let snapshot = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    assert!(!snapshot.has(Metric::Radon));
    assert_eq!(snapshot.number(Metric::RadonPeak), Some(370.0));
    assert_eq!(snapshot.number(Metric::RadonUptime), Some(3600.0));
}

#[tokio::test(start_paused = true)]
async fn test_custom_deadline_is_honored() {
    let transport = standard_transport();
    transport.set_reply(
        CharacteristicPair::STANDARD,
        READ_UPTIME,
        MockReply::Delayed(Duration::from_secs(8), frames::standard_uptime(60)),
    );

    let default = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();
    assert!(!default.has(Metric::RadonUptime));

    let config = SessionConfig::new().uptime_deadline(Duration::from_secs(10));
    let patient =
        run_session_with_config(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3, config)
            .await
            .unwrap();
    assert_eq!(patient.number(Metric::RadonUptime), Some(3600.0));
}

#[tokio::test]
async fn test_missing_characteristic_clears_cache_and_disconnects() {
    let transport = MockTransport::builder()
        .missing_characteristic(STANDARD_WRITE)
        .build();

    let err = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap_err();
    assert!(err.is_missing_characteristic());

    let ops = transport.operations();
    let n = ops.len();
    assert_eq!(
        ops[n - 2..],
        [MockOp::ClearServiceCache, MockOp::Disconnect]
    );
    assert_subscriptions_balanced(&ops);
    // The failing command was the first; nothing else ran.
    assert_eq!(transport.count(|op| matches!(op, MockOp::Write(..))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_is_surfaced() {
    let transport = MockTransport::builder()
        .connect_failure(ConnectionFailureReason::OutOfRange)
        .build();

    let err = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::ConnectionFailed {
            reason: ConnectionFailureReason::OutOfRange,
            ..
        }
    ));
    // One attempt plus three retries, and nothing after a failed connect.
    assert_eq!(
        transport.operations(),
        vec![MockOp::Connect(ADDRESS.to_string()); 4]
    );
}

#[tokio::test]
async fn test_rejected_connect_is_not_retried() {
    let transport = MockTransport::builder()
        .connect_failure(ConnectionFailureReason::Rejected)
        .build();

    let err = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::ConnectionFailed {
            reason: ConnectionFailureReason::Rejected,
            ..
        }
    ));
    assert_eq!(
        transport.operations(),
        vec![MockOp::Connect(ADDRESS.to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_connect_attempt_is_retried() {
    let transport = MockTransport::builder()
        .reply(
            CharacteristicPair::STANDARD,
            READ_LEVELS,
            MockReply::Frame(frames::standard_levels(48, 52, 61)),
        )
        .slow_connect(Duration::from_secs(20))
        .build();

    let snapshot = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    assert_eq!(snapshot.number(Metric::Radon), Some(48.0));
    assert_eq!(
        transport.count(|op| matches!(op, MockOp::Connect(_))),
        2
    );
    assert_eq!(transport.count(|op| matches!(op, MockOp::Disconnect)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_bounds_each_attempt() {
    let transport = standard_transport();
    for _ in 0..4 {
        transport.push_slow_connect(Duration::from_secs(60));
    }
    let config = SessionConfig::new().connect_timeout(Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    let err = run_session_with_config(
        &transport,
        ADDRESS,
        STANDARD_NAME,
        RadonUnit::BqPerM3,
        config,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(
        transport.count(|op| matches!(op, MockOp::Connect(_))),
        4
    );
    // Four 5 s attempts plus backoff, far short of one stalled connect.
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test]
async fn test_unclassifiable_device_never_connects() {
    let transport = standard_transport();

    let err = run_session(&transport, ADDRESS, "Other", RadonUnit::BqPerM3)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnclassifiableDevice { .. }));
    assert!(transport.operations().is_empty());
}

#[tokio::test]
async fn test_invalid_config_never_connects() {
    let transport = standard_transport();
    let config = SessionConfig::new().levels_deadline(Duration::ZERO);

    let err =
        run_session_with_config(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3, config)
            .await
            .unwrap_err();

    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(transport.operations().is_empty());
}

#[tokio::test]
async fn test_legacy_session_two_exchanges() {
    let transport = MockTransport::legacy(
        frames::legacy_levels(1.0, 2.0, 3.0),
        frames::legacy_peak_uptime(4.0, 1500),
    );

    let snapshot = run_session(&transport, ADDRESS, LEGACY_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    assert_eq!(snapshot.variant, Some(ProtocolVariant::LegacyR2));
    assert_eq!(snapshot.number(Metric::Radon), Some(37.0));
    assert_eq!(snapshot.number(Metric::Radon1DayLevel), Some(74.0));
    assert_eq!(snapshot.number(Metric::Radon1MonthLevel), Some(111.0));
    assert_eq!(snapshot.number(Metric::RadonPeak), Some(148.0));
    assert_eq!(
        snapshot.get(Metric::RadonUptimeString),
        Some(&MetricValue::Text("1d 01:00:00".to_string()))
    );
    assert!(!snapshot.has(Metric::RadonCNow));
    assert!(snapshot.hw_version.is_empty());

    let writes: Vec<_> = transport
        .operations()
        .into_iter()
        .filter(|op| matches!(op, MockOp::Write(..)))
        .collect();
    assert_eq!(
        writes,
        vec![
            MockOp::Write(LEGACY_WRITE, vec![READ_LEVELS]),
            MockOp::Write(LEGACY_WRITE, vec![READ_UPTIME]),
        ]
    );
    assert_subscriptions_balanced(&transport.operations());
}

#[tokio::test]
async fn test_legacy_session_pci_units() {
    let transport = MockTransport::legacy(
        frames::legacy_levels(111.0, 2.5, 0.75),
        frames::legacy_peak_uptime(4.25, 61),
    );

    let snapshot = run_session(&transport, ADDRESS, LEGACY_NAME, RadonUnit::PciPerL)
        .await
        .unwrap();

    assert_eq!(snapshot.number(Metric::Radon), Some(111.0));
    assert_eq!(snapshot.number(Metric::RadonPeak), Some(4.25));
    assert_eq!(
        snapshot.get(Metric::RadonUptimeString),
        Some(&MetricValue::Text("0d 01:01:00".to_string()))
    );
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let transport = standard_transport();

    let first = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();
    transport.set_reply(
        CharacteristicPair::STANDARD,
        READ_LEVELS,
        MockReply::Frame(frames::standard_levels(60, 40, 30)),
    );
    let second = run_session(&transport, ADDRESS, STANDARD_NAME, RadonUnit::BqPerM3)
        .await
        .unwrap();

    assert_eq!(first.number(Metric::Radon), Some(50.0));
    assert_eq!(second.number(Metric::Radon), Some(60.0));
    assert_eq!(transport.count(|op| matches!(op, MockOp::Connect(_))), 2);
}
