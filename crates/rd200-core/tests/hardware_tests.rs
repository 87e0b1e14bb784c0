//! Hardware integration tests for rd200-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```text
//! cargo test --package rd200-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Set `RD200_DEVICE` to the address, peripheral ID or advertised name of
//! the monitor to test. Without it the first RD200 found by a scan is used.

use std::env;
use std::time::Duration;

use rd200_core::scan::{DiscoveredDevice, ScanOptions, scan_for_devices};
use rd200_core::{BleTransport, Metric, RadonUnit, Session, SessionState};
use tokio::time::timeout;

/// Upper bound for a whole session, connect retries included.
const SESSION_TIMEOUT: Duration = Duration::from_secs(90);

async fn find_target() -> Option<DiscoveredDevice> {
    let wanted = env::var("RD200_DEVICE").ok().filter(|s| !s.is_empty());
    let devices = scan_for_devices(ScanOptions::default().duration_secs(10))
        .await
        .expect("scan failed");

    match wanted {
        Some(wanted) => devices.into_iter().find(|d| {
            d.identifier.eq_ignore_ascii_case(&wanted)
                || d.address.eq_ignore_ascii_case(&wanted)
                || d.name == wanted
        }),
        None => devices.into_iter().next(),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_reports_only_rd200_devices() {
    let devices = timeout(
        Duration::from_secs(30),
        scan_for_devices(ScanOptions::default().duration_secs(10)),
    )
    .await
    .expect("scan timed out")
    .expect("scan failed");

    println!("Scan discovered {} RD200 devices:", devices.len());
    for device in &devices {
        println!(
            "  - {} ({}, {}, rssi {:?})",
            device.name, device.identifier, device.variant, device.rssi
        );
        assert!(rd200_core::ProtocolVariant::from_name(&device.name).is_some());
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_full_session() {
    let Some(device) = find_target().await else {
        println!("SKIP: no RD200 in range (set RD200_DEVICE to pick one)");
        return;
    };
    println!("Polling {} at {}", device.name, device.identifier);

    let transport = BleTransport::new().await.expect("no adapter");
    let mut session =
        Session::new(&device.identifier, &device.name, RadonUnit::BqPerM3).expect("unsupported");

    let snapshot = timeout(SESSION_TIMEOUT, session.run(&transport))
        .await
        .expect("session timed out")
        .expect("session failed");

    assert_eq!(session.state(), SessionState::Disconnected);
    for metric in Metric::ALL {
        match snapshot.get(metric) {
            Some(value) => println!("  {}: {}", metric.label(), value),
            None => println!("  {}: unknown", metric.label()),
        }
    }
    println!("  hw {:?} sw {:?}", snapshot.hw_version, snapshot.sw_version);
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_back_to_back_sessions() {
    let Some(device) = find_target().await else {
        println!("SKIP: no RD200 in range (set RD200_DEVICE to pick one)");
        return;
    };

    let transport = BleTransport::new().await.expect("no adapter");
    for round in 1..=2 {
        let snapshot = timeout(
            SESSION_TIMEOUT,
            rd200_core::run_session(&transport, &device.identifier, &device.name, RadonUnit::PciPerL),
        )
        .await
        .expect("session timed out")
        .expect("session failed");
        println!("Round {}: radon {:?}", round, snapshot.number(Metric::Radon));
    }
}
