//! Integration tests for the volume watchdog
//!
//! These tests drive the controller against the in-memory host, with every
//! notification flowing through the same queue a real backend would use.

use std::time::Duration;
use volguard_core::domain::audio::{AudioSubsystem, DeviceId, Scope};
use volguard_core::domain::{Config, Role};
use volguard_infra::audio::VolumeWrite;
use volguard_tests::{speakers_config, Harness};

fn write(device: &str, channel: u32, scope: Scope, volume: f32) -> VolumeWrite {
    VolumeWrite {
        device: DeviceId::new(device),
        channel,
        scope,
        volume,
    }
}

// ============================================================================
// TOPOLOGY SCENARIOS
// ============================================================================

#[test]
fn test_no_target_and_no_proxy() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("hp", "Headphones");

    harness.start().unwrap();

    assert_eq!(harness.active_roles(), vec![Role::DefaultOutput]);
    assert!(harness.writes().is_empty());
}

#[test]
fn test_target_with_unrelated_proxy() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("spk", "Speakers");
    harness.host.add_device("eq", "eqMac BlackHole");

    harness.start().unwrap();

    assert_eq!(harness.active_roles(), vec![Role::TargetVolume, Role::ProxyName]);
    assert_eq!(harness.bound_name(Role::TargetVolume).as_deref(), Some("Speakers"));
    assert_eq!(harness.bound_name(Role::ProxyName).as_deref(), Some("eqMac BlackHole"));
    assert_eq!(harness.writes(), vec![write("spk", 0, Scope::Output, 0.035)]);
}

#[test]
fn test_proxy_renamed_to_carry_target() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("eq", "eqMac BlackHole");
    harness.start().unwrap();
    assert!(!harness.active_roles().contains(&Role::ProxyVolume));

    harness.host.rename_device("eq", "eqMac Speakers").unwrap();
    harness.settle();

    assert!(harness.active_roles().contains(&Role::ProxyVolume));
    assert_eq!(harness.writes(), vec![write("eq", 0, Scope::Output, 0.035)]);
    assert_eq!(harness.bound_name(Role::ProxyName).as_deref(), Some("eqMac Speakers"));
}

#[test]
fn test_proxy_renamed_away_from_target() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("eq", "eqMac Speakers");
    harness.start().unwrap();
    assert!(harness.active_roles().contains(&Role::ProxyVolume));

    harness.host.rename_device("eq", "eqMac Headphones").unwrap();
    harness.settle();

    assert_eq!(harness.active_roles(), vec![Role::ProxyName]);
}

#[test]
fn test_device_hotplug() {
    let mut harness = Harness::new(speakers_config());
    harness.start().unwrap();
    assert!(!harness.active_roles().contains(&Role::TargetVolume));

    harness.host.add_device("spk", "Speakers");
    harness.settle();
    assert!(harness.active_roles().contains(&Role::TargetVolume));
    assert_eq!(harness.host.volume(&DeviceId::new("spk"), 0, Scope::Output), Some(0.035));

    harness.host.remove_device("spk");
    harness.settle();
    assert!(!harness.active_roles().contains(&Role::TargetVolume));
}

#[test]
fn test_default_output_discovers_proxy() {
    let mut harness = Harness::new(speakers_config());
    harness.start().unwrap();
    assert_eq!(harness.active_roles(), vec![Role::DefaultOutput]);

    // Adding the proxy also changes the device list; both paths must agree
    harness.host.add_device("eq", "eqMac Speakers");
    harness.host.set_default_output(Some("eq")).unwrap();
    harness.settle();

    assert_eq!(harness.active_roles(), vec![Role::ProxyVolume, Role::ProxyName]);
    assert_eq!(harness.writes(), vec![write("eq", 0, Scope::Output, 0.035)]);
}

#[test]
fn test_replugged_target_rebinds() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("spk-1", "Speakers");
    harness.start().unwrap();

    harness.host.remove_device("spk-1");
    harness.host.add_device("spk-2", "Speakers");
    harness.settle();

    let slot = harness.controller.reconciler().slots().get(Role::TargetVolume);
    assert!(slot.is_bound_to(&DeviceId::new("spk-2")));

    // The new device is protected, the old registration is gone
    harness.host.change_volume("spk-2", 0, Scope::Output, 0.9).unwrap();
    harness.settle();
    assert_eq!(harness.host.volume(&DeviceId::new("spk-2"), 0, Scope::Output), Some(0.035));
    assert_eq!(harness.host.live_registrations(), 3);
}

// ============================================================================
// WATCHDOG BEHAVIOUR
// ============================================================================

#[test]
fn test_dangerous_volume_clamped_exactly_once() {
    let config = Config::new("Speakers", 0.035, 0.08, 0, Scope::Output).unwrap();
    let mut harness = Harness::new(config);
    harness.host.add_device("spk", "Speakers");
    harness.start().unwrap();
    let baseline = harness.writes().len();

    harness.host.change_volume("spk", 0, Scope::Output, 0.5).unwrap();
    harness.settle();

    let writes = harness.writes();
    assert_eq!(&writes[baseline..], &[write("spk", 0, Scope::Output, 0.035)]);
    assert_eq!(harness.host.volume(&DeviceId::new("spk"), 0, Scope::Output), Some(0.035));
}

#[test]
fn test_safe_volume_left_alone() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("spk", "Speakers");
    harness.start().unwrap();
    let baseline = harness.writes().len();

    harness.host.change_volume("spk", 0, Scope::Output, 0.08).unwrap();
    harness.host.change_volume("spk", 0, Scope::Output, 0.01).unwrap();
    harness.settle();

    assert_eq!(harness.writes().len(), baseline);
    assert_eq!(harness.host.volume(&DeviceId::new("spk"), 0, Scope::Output), Some(0.01));
}

#[test]
fn test_clamp_targets_reported_channel() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device_with_controls(
        "spk",
        "Speakers",
        &[(0, Scope::Output, 0.02), (2, Scope::Output, 0.02)],
    );
    harness.start().unwrap();

    harness.host.change_volume("spk", 2, Scope::Output, 0.7).unwrap();
    harness.settle();

    assert_eq!(harness.writes().last(), Some(&write("spk", 2, Scope::Output, 0.035)));
    assert_eq!(harness.host.volume(&DeviceId::new("spk"), 0, Scope::Output), Some(0.035));
}

#[test]
fn test_unsupported_activation_control_still_watches() {
    let config = Config::new("Speakers", 0.035, 0.08, 1, Scope::Main).unwrap();
    let mut harness = Harness::new(config);
    harness.host.add_device("spk", "Speakers");

    harness.start().unwrap();

    // The baseline write failed, but the watchdog is in place
    assert!(harness.active_roles().contains(&Role::TargetVolume));
    harness.host.change_volume("spk", 0, Scope::Output, 0.6).unwrap();
    harness.settle();
    assert_eq!(harness.host.volume(&DeviceId::new("spk"), 0, Scope::Output), Some(0.035));
}

#[test]
fn test_proxy_and_target_both_clamped() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("spk", "Speakers");
    harness.host.add_device("eq", "eqMac Speakers");
    harness.start().unwrap();

    harness.host.change_volume("spk", 0, Scope::Output, 1.0).unwrap();
    harness.host.change_volume("eq", 0, Scope::Output, 1.0).unwrap();
    harness.settle();

    assert_eq!(harness.host.volume(&DeviceId::new("spk"), 0, Scope::Output), Some(0.035));
    assert_eq!(harness.host.volume(&DeviceId::new("eq"), 0, Scope::Output), Some(0.035));
}

// ============================================================================
// SUBSCRIPTION BOOKKEEPING
// ============================================================================

#[test]
fn test_repeated_topology_events_do_not_leak() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("spk", "Speakers");
    harness.start().unwrap();
    let subscribes = harness.host.subscribe_count();

    for i in 0..10 {
        harness.host.add_device(&format!("extra-{i}"), "USB Mic");
        harness.settle();
    }

    assert_eq!(harness.host.subscribe_count(), subscribes);
    assert_eq!(harness.host.live_registrations(), 3);
}

#[test]
fn test_flapping_target_balances_registrations() {
    let mut harness = Harness::new(speakers_config());
    harness.start().unwrap();

    for _ in 0..5 {
        harness.host.add_device("spk", "Speakers");
        harness.settle();
        harness.host.remove_device("spk");
        harness.settle();
    }

    // Device list watch plus default output watch
    assert_eq!(harness.host.live_registrations(), 2);
    assert_eq!(
        harness.host.subscribe_count() - harness.host.unsubscribe_count(),
        2
    );
}

#[tokio::test]
async fn test_event_loop_clamps_and_releases() {
    let mut harness = Harness::new(speakers_config());
    harness.host.add_device("spk", "Speakers");
    harness.start().unwrap();

    harness.host.change_volume("spk", 0, Scope::Output, 0.9).unwrap();
    harness.run_for(Duration::from_millis(50)).await;

    assert_eq!(harness.host.volume(&DeviceId::new("spk"), 0, Scope::Output), Some(0.035));
    assert_eq!(harness.host.live_registrations(), 0);
    assert!(!harness.controller.is_started());
}
