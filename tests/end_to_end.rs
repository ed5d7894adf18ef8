use std::time::Duration;

use tokio::time::{Instant, advance};

use genial_t31_bridge_lib::config::TimingConfig;
use genial_t31_bridge_lib::core::bluetooth::mock::MockTransport;
use genial_t31_bridge_lib::core::codec::handshake_packets;
use genial_t31_bridge_lib::{BridgeHandle, DeviceIdentity, MacAddress, Sensor, Supervisor};

fn identity() -> DeviceIdentity {
    DeviceIdentity::new(MacAddress::new([0xA4, 0xC1, 0x38, 0x0B, 0x5E, 0x7F]), "Nursery")
}

fn temperature_frame(raw: u16) -> Vec<u8> {
    let mut frame = vec![0u8; 13];
    frame[3..5].copy_from_slice(&raw.to_be_bytes());
    frame
}

fn battery_frame(raw: u16) -> Vec<u8> {
    let mut frame = vec![0u8; 9];
    frame[5..7].copy_from_slice(&raw.to_be_bytes());
    frame
}

#[tokio::test(start_paused = true)]
async fn test_device_appearing_late_is_picked_up_after_cooldown() {
    let transport = MockTransport::new();
    let mut supervisor = Supervisor::new(transport.clone(), identity(), TimingConfig::default());

    // Neither direct lookup nor scan can see the device yet.
    let snapshot = supervisor.tick(Instant::now()).await;
    assert!(!snapshot.connected);
    assert!(!supervisor.session().effectively_connected().await);
    assert_eq!(transport.connect_calls(), 0);

    transport.set_in_scan(true);

    advance(Duration::from_secs(30)).await;
    supervisor.tick(Instant::now()).await;
    assert_eq!(transport.connect_calls(), 0);

    advance(Duration::from_secs(31)).await;
    supervisor.tick(Instant::now()).await;
    assert_eq!(transport.connect_calls(), 1);
    assert_eq!(transport.written().len(), handshake_packets().len());
    assert!(transport.is_notifying());

    assert!(transport.push_frame(&temperature_frame(0x0E42)));
    assert!(transport.push_frame(&battery_frame(0x00E6)));
    assert_eq!(supervisor.process_pending_events().await, 2);

    assert!(supervisor.session().effectively_connected().await);
    assert_eq!(supervisor.session().temperature(), Some(36.5));
    assert_eq!(supervisor.session().battery(), Some(66));

    let snapshot = supervisor.snapshot().clone();
    assert!(snapshot.connected);
    assert_eq!(snapshot.temperature, Some(36.5));
    assert!(snapshot.last_data_received.is_some());

    let rendered: Vec<String> = Sensor::all(&identity())
        .iter()
        .map(|sensor| sensor.render(&snapshot))
        .collect();
    assert_eq!(rendered, vec!["temperature: 36.50 °C", "battery: 66 %"]);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_frames_keep_previous_reading() {
    let transport = MockTransport::with_known_device();
    let mut supervisor = Supervisor::new(transport.clone(), identity(), TimingConfig::default());
    supervisor.tick(Instant::now()).await;

    transport.push_frame(&temperature_frame(0x0834));
    transport.push_frame(&temperature_frame(0x1195));
    transport.push_frame(&[0x01, 0x02, 0x03]);
    supervisor.process_pending_events().await;

    assert_eq!(supervisor.session().temperature(), Some(21.0));
    assert_eq!(supervisor.session().battery(), None);
}

#[tokio::test(start_paused = true)]
async fn test_bridge_handle_lifecycle() {
    let transport = MockTransport::with_known_device();
    let supervisor = Supervisor::new(transport.clone(), identity(), TimingConfig::default());
    let bridge = BridgeHandle::spawn(supervisor);

    // Whichever of the first tick or this refresh runs first does the connect.
    bridge.refresh().await;
    let snapshot = bridge.refresh().await.expect("supervisor running");
    assert!(snapshot.connected);
    assert_eq!(transport.connect_calls(), 1);

    let mut snapshots = bridge.subscribe();
    snapshots.borrow_and_update();
    assert!(transport.push_frame(&temperature_frame(0x0E4C)));
    while snapshots.borrow_and_update().temperature.is_none() {
        snapshots.changed().await.expect("supervisor running");
    }
    assert_eq!(bridge.snapshot().temperature, Some(36.6));

    // Already connected, so no new attempt.
    assert!(bridge.connect().await);
    assert_eq!(transport.connect_calls(), 1);

    bridge.disconnect().await;
    assert!(!bridge.snapshot().connected);
    assert!(!transport.is_link_connected());

    assert!(bridge.connect().await);
    assert_eq!(transport.connect_calls(), 2);

    bridge.shutdown().await;
    assert!(!transport.is_link_connected());
    assert_eq!(transport.disconnect_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_device_side_drop_reconnects_on_next_tick() {
    let transport = MockTransport::with_known_device();
    let mut supervisor = Supervisor::new(transport.clone(), identity(), TimingConfig::default());
    supervisor.tick(Instant::now()).await;
    assert_eq!(transport.connect_calls(), 1);

    transport.drop_link();
    supervisor.process_pending_events().await;
    assert!(!supervisor.snapshot().connected);

    advance(Duration::from_secs(61)).await;
    supervisor.tick(Instant::now()).await;
    assert_eq!(transport.connect_calls(), 2);
    assert!(supervisor.session().effectively_connected().await);
}
