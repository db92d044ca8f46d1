//! Polling gateway tests, driving the full device protocol.

use std::time::Duration;

use trafficlink_commands::{CommandQueue, CommandStatus, GatewaySettings, PollingGateway};
use trafficlink_core::ErrorKind;
use trafficlink_devices::{DeviceRecord, DeviceRegistry, NewDevice, PreferenceStore, PreferenceUpdate};
use trafficlink_storage::Database;

struct Harness {
    registry: DeviceRegistry,
    queue: CommandQueue,
    preferences: PreferenceStore,
    gateway: PollingGateway,
}

fn harness(settings: GatewaySettings) -> Harness {
    let db = Database::in_memory().unwrap();
    let registry = DeviceRegistry::new(db.clone());
    let queue = CommandQueue::new(db.clone());
    let preferences = PreferenceStore::new(db);
    let gateway = PollingGateway::new(
        registry.clone(),
        queue.clone(),
        preferences.clone(),
        settings,
    );
    Harness {
        registry,
        queue,
        preferences,
        gateway,
    }
}

/// Baseline protocol: no keys, no claiming.
fn open_settings() -> GatewaySettings {
    GatewaySettings {
        claim_lease: None,
        require_device_key: false,
        ..Default::default()
    }
}

fn register(h: &Harness, id: &str) -> DeviceRecord {
    h.registry
        .register(NewDevice::new(id, "Junction", "Bridge road"))
        .unwrap()
}

#[test]
fn test_end_to_end_device_round_trip() {
    let h = harness(open_settings());
    register(&h, "esp-1");

    let cmd = h.queue.enqueue("esp-1", "open_corridor").unwrap();
    assert_eq!(cmd.status, CommandStatus::Pending);

    let batch = h.gateway.poll("esp-1", None).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, cmd.id);

    let done = h
        .gateway
        .report(&cmd.id.to_string(), "executed", None)
        .unwrap();
    assert_eq!(done.status, CommandStatus::Executed);
    assert!(done.executed_at.is_some());

    assert!(h.gateway.poll("esp-1", None).unwrap().is_empty());

    let err = h
        .gateway
        .report(&cmd.id.to_string(), "failed", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[test]
fn test_poll_touches_last_seen() {
    let h = harness(open_settings());
    register(&h, "esp-1");
    assert!(h.registry.get("esp-1").unwrap().last_seen_at.is_none());

    h.gateway.poll("esp-1", None).unwrap();
    assert!(h.registry.get("esp-1").unwrap().last_seen_at.is_some());
}

#[test]
fn test_poll_unknown_device() {
    let h = harness(open_settings());
    let err = h.gateway.poll("ghost-device", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_poll_batch_is_bounded() {
    let h = harness(open_settings());
    register(&h, "esp-1");
    for _ in 0..12 {
        h.queue.enqueue("esp-1", "open_corridor").unwrap();
    }

    let batch = h.gateway.poll("esp-1", None).unwrap();
    assert_eq!(batch.len(), 10);
    assert!(batch.windows(2).all(|w| w[0].id < w[1].id));

    // Without claiming, an unanswered batch is offered again.
    assert_eq!(h.gateway.poll("esp-1", None).unwrap(), batch);
}

#[test]
fn test_report_validates_id_and_status() {
    let h = harness(open_settings());
    register(&h, "esp-1");
    let cmd = h.queue.enqueue("esp-1", "open_corridor").unwrap();

    let err = h.gateway.report("abc", "executed", None).unwrap_err();
    assert_eq!(err.field(), Some("commandId"));

    let err = h
        .gateway
        .report(&cmd.id.to_string(), "done", None)
        .unwrap_err();
    assert_eq!(err.field(), Some("status"));

    let err = h.gateway.report("987654", "executed", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(h.queue.get(cmd.id).unwrap().status, CommandStatus::Pending);
}

#[test]
fn test_claiming_prevents_double_delivery() {
    let h = harness(GatewaySettings {
        claim_lease: Some(Duration::from_secs(60)),
        require_device_key: false,
        ..Default::default()
    });
    register(&h, "esp-1");
    let cmd = h.queue.enqueue("esp-1", "open_corridor").unwrap();

    assert_eq!(h.gateway.poll("esp-1", None).unwrap().len(), 1);
    assert!(h.gateway.poll("esp-1", None).unwrap().is_empty());

    h.gateway
        .report(&cmd.id.to_string(), "executed", None)
        .unwrap();
}

#[test]
fn test_expired_lease_is_reoffered() {
    let h = harness(GatewaySettings {
        claim_lease: Some(Duration::from_millis(20)),
        require_device_key: false,
        ..Default::default()
    });
    register(&h, "esp-1");
    let cmd = h.queue.enqueue("esp-1", "open_corridor").unwrap();

    assert_eq!(h.gateway.poll("esp-1", None).unwrap().len(), 1);
    std::thread::sleep(Duration::from_millis(50));

    let again = h.gateway.poll("esp-1", None).unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, cmd.id);
}

#[test]
fn test_device_key_required() {
    let h = harness(GatewaySettings {
        claim_lease: None,
        ..Default::default()
    });
    let esp1 = register(&h, "esp-1");
    let esp2 = register(&h, "esp-2");
    let cmd = h.queue.enqueue("esp-1", "open_corridor").unwrap();
    let id = cmd.id.to_string();

    assert_eq!(
        h.gateway.poll("esp-1", None).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );
    assert_eq!(
        h.gateway.poll("esp-1", Some("tlk_forged")).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );
    assert_eq!(
        h.gateway.poll("esp-1", Some(&esp2.api_key)).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );
    assert_eq!(h.gateway.poll("esp-1", Some(&esp1.api_key)).unwrap().len(), 1);

    // Another device cannot resolve esp-1's command.
    assert_eq!(
        h.gateway
            .report(&id, "failed", Some(&esp2.api_key))
            .unwrap_err()
            .kind(),
        ErrorKind::Unauthorized
    );
    assert_eq!(
        h.gateway
            .report("987654", "failed", Some(&esp1.api_key))
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
    let done = h
        .gateway
        .report(&id, "executed", Some(&esp1.api_key))
        .unwrap();
    assert_eq!(done.status, CommandStatus::Executed);
}

#[test]
fn test_sync_preferences() {
    let h = harness(GatewaySettings {
        claim_lease: None,
        ..Default::default()
    });
    let esp1 = register(&h, "esp-1");

    let first = h
        .gateway
        .sync_preferences("esp-1", Some(&esp1.api_key))
        .unwrap();
    assert_eq!(first.sampling_rate_ms, 1000);
    assert!(h.registry.get("esp-1").unwrap().last_seen_at.is_some());

    h.preferences
        .upsert(
            "esp-1",
            &PreferenceUpdate::default().with_jam_threshold_cm(75),
        )
        .unwrap();

    let second = h
        .gateway
        .sync_preferences("esp-1", Some(&esp1.api_key))
        .unwrap();
    assert_eq!(second.jam_threshold_cm, 75);
    assert_eq!(second.sampling_rate_ms, 1000);

    assert_eq!(
        h.gateway.sync_preferences("esp-1", None).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );
}

#[test]
fn test_deleted_device_loses_its_queue() {
    let h = harness(open_settings());
    register(&h, "esp-1");
    let cmd = h.queue.enqueue("esp-1", "open_corridor").unwrap();

    h.registry.delete("esp-1").unwrap();

    assert_eq!(h.queue.get(cmd.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        h.gateway.poll("esp-1", None).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}
