/// Discovery rounds against a loopback responder.
mod common;

use common::*;
use hdhomerun_tuner::codec::seal_frame;
use hdhomerun_tuner::{DiscoverySocketPool, FrameType, DEVICE_TYPE_TUNER, DEVICE_TYPE_WILDCARD};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

fn pool_for(peer: &MockDiscoverPeer) -> DiscoverySocketPool {
    let config = loopback_config(peer.port, 0);
    DiscoverySocketPool::new(&config, loopback_interfaces(), null_logger()).unwrap()
}

#[test]
fn test_wildcard_discovery_finds_device() {
    let peer = MockDiscoverPeer::start(vec![MockDevice::tuner(0x1004_0001, Some(2))]);
    let mut pool = pool_for(&peer);

    let found = pool.find_devices(0, DEVICE_TYPE_TUNER, WILDCARD, 1);

    assert_eq!(found.len(), 1);
    let device = &found[0];
    assert_eq!(device.ip(), Ipv4Addr::LOCALHOST);
    assert_eq!(device.device_type, 1);
    assert_eq!(device.device_id, 0x1004_0001);
    assert_eq!(device.tuner_count, 2);
    assert_eq!(device.base_url, None);
}

#[test]
fn test_targeted_discovery() {
    let mut mock = MockDevice::tuner(0x1040_0001, Some(4));
    mock.base_url = Some("http://127.0.0.1:5004".to_string());
    let peer = MockDiscoverPeer::start(vec![mock]);
    let mut pool = pool_for(&peer);

    let found = pool.find_devices(LOOPBACK, DEVICE_TYPE_WILDCARD, 0x1040_0001, 1);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].tuner_count, 4);
    assert_eq!(found[0].base_url.as_deref(), Some("http://127.0.0.1:5004"));
}

#[test]
fn test_obsolete_device_is_excluded() {
    let peer = MockDiscoverPeer::start(vec![MockDevice::tuner(0x1010_0001, Some(2))]);
    let mut pool = pool_for(&peer);

    let found = pool.find_devices(0, DEVICE_TYPE_TUNER, WILDCARD, 1);
    assert!(found.is_empty());
    // No result, so the request is repeated
    assert_eq!(peer.request_count(), 2);
}

#[test]
fn test_device_id_and_type_filters() {
    let mut storage = MockDevice::tuner(0x1060_0003, Some(1));
    storage.device_type = 5;
    let peer = MockDiscoverPeer::start(vec![
        MockDevice::tuner(0x1040_0001, Some(2)),
        storage,
        MockDevice::tuner(0x1050_0002, Some(2)),
    ]);
    let mut pool = pool_for(&peer);

    let found = pool.find_devices(0, DEVICE_TYPE_TUNER, 0x1050_0002, 5);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].device_id, 0x1050_0002);

    let found = pool.find_devices(0, DEVICE_TYPE_TUNER, WILDCARD, 5);
    let ids: Vec<u32> = found.iter().map(|d| d.device_id).collect();
    assert_eq!(ids, vec![0x1040_0001, 0x1050_0002]);
}

#[test]
fn test_max_count_and_deduplication() {
    let peer = MockDiscoverPeer::start(vec![
        MockDevice::tuner(0x1040_0001, Some(2)),
        MockDevice::tuner(0x1040_0001, Some(2)),
        MockDevice::tuner(0x1050_0002, Some(2)),
        MockDevice::tuner(0x1070_0003, Some(2)),
    ]);
    let mut pool = pool_for(&peer);

    let found = pool.find_devices(0, DEVICE_TYPE_TUNER, WILDCARD, 2);
    let ids: Vec<u32> = found.iter().map(|d| d.device_id).collect();
    assert_eq!(ids, vec![0x1040_0001, 0x1050_0002]);
}

#[test]
fn test_corrupted_replies_are_ignored() {
    let mut corrupted = MockDevice::tuner(0x1080_0004, Some(2)).reply_frame();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;
    let getset = seal_frame(&[], FrameType::GETSET_REPLY);

    let peer = MockDiscoverPeer::start_with_noise(
        vec![MockDevice::tuner(0x1040_0001, Some(2))],
        vec![corrupted, getset, vec![0x00, 0x03]],
    );
    let mut pool = pool_for(&peer);

    let found = pool.find_devices(0, DEVICE_TYPE_TUNER, WILDCARD, 5);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].device_id, 0x1040_0001);
}

#[test]
fn test_multicast_target_sends_nothing() {
    let peer = MockDiscoverPeer::start(vec![MockDevice::tuner(0x1040_0001, Some(2))]);
    let mut pool = pool_for(&peer);

    let start = Instant::now();
    let found = pool.find_devices(u32::from(Ipv4Addr::new(239, 255, 255, 250)), DEVICE_TYPE_TUNER, WILDCARD, 1);
    assert!(found.is_empty());
    assert!(start.elapsed() < Duration::from_millis(100));

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(peer.request_count(), 0);
}

#[test]
fn test_no_reply_times_out() {
    let peer = MockDiscoverPeer::start(Vec::new());
    let mut pool = pool_for(&peer);

    let start = Instant::now();
    let found = pool.find_devices(0, DEVICE_TYPE_TUNER, WILDCARD, 1);
    assert!(found.is_empty());
    // Two rounds of 200ms for the one socket that sent
    assert!(start.elapsed() >= Duration::from_millis(400));
    assert_eq!(peer.request_count(), 2);
}
