//! Command queue tests: lifecycle, ordering, limits and racing reports.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use trafficlink_commands::{CommandOutcome, CommandQueue, CommandStatus, CommandType};
use trafficlink_core::ErrorKind;
use trafficlink_devices::{DeviceRegistry, NewDevice};
use trafficlink_storage::Database;

/// Helper to create a queue with registered devices.
fn make_queue(devices: &[&str]) -> CommandQueue {
    let db = Database::in_memory().unwrap();
    let registry = DeviceRegistry::new(db.clone());
    for id in devices {
        registry
            .register(NewDevice::new(*id, "Test junction", "Test street"))
            .unwrap();
    }
    CommandQueue::new(db)
}

#[test]
fn test_enqueue_then_list_pending() {
    let queue = make_queue(&["esp-1"]);

    let cmd = queue.enqueue("esp-1", "open_corridor").unwrap();
    assert_eq!(cmd.device_id, "esp-1");
    assert_eq!(cmd.command_type, CommandType::OpenCorridor);
    assert_eq!(cmd.status, CommandStatus::Pending);
    assert!(cmd.executed_at.is_none());

    let pending = queue.list_pending("esp-1", None).unwrap();
    assert_eq!(pending, vec![cmd]);
}

#[test]
fn test_enqueue_rejects_unknown_type_and_device() {
    let queue = make_queue(&["esp-1"]);

    let err = queue.enqueue("esp-1", "self_destruct").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.field(), Some("commandType"));

    let err = queue.enqueue("ghost-device", "open_corridor").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(queue.list_for_device("ghost-device", None).unwrap().is_empty());
    assert!(queue.list_pending("esp-1", None).unwrap().is_empty());
}

#[test]
fn test_list_pending_caps_at_ten() {
    let queue = make_queue(&["esp-1"]);
    let ids: Vec<u64> = (0..15)
        .map(|_| queue.enqueue("esp-1", "open_corridor").unwrap().id)
        .collect();

    let pending = queue.list_pending("esp-1", Some(100)).unwrap();
    assert_eq!(pending.len(), 10);
    let got: Vec<u64> = pending.iter().map(|c| c.id).collect();
    assert_eq!(got, ids[..10].to_vec());

    assert_eq!(queue.list_pending("esp-1", Some(4)).unwrap().len(), 4);
    assert_eq!(queue.list_pending("esp-1", None).unwrap().len(), 10);
}

#[test]
fn test_list_pending_never_returns_resolved() {
    let queue = make_queue(&["esp-1"]);
    let a = queue.enqueue("esp-1", "open_corridor").unwrap();
    let b = queue.enqueue("esp-1", "open_corridor").unwrap();
    let c = queue.enqueue("esp-1", "open_corridor").unwrap();

    queue.report_outcome(a.id, CommandOutcome::Executed).unwrap();
    queue.report_outcome(c.id, CommandOutcome::Failed).unwrap();

    let pending = queue.list_pending("esp-1", None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, b.id);
    assert!(pending.iter().all(|c| c.status == CommandStatus::Pending));
}

#[test]
fn test_report_outcome_is_one_shot() {
    let queue = make_queue(&["esp-1"]);
    let cmd = queue.enqueue("esp-1", "open_corridor").unwrap();

    let done = queue.report_outcome(cmd.id, CommandOutcome::Failed).unwrap();
    assert_eq!(done.status, CommandStatus::Failed);
    assert!(done.executed_at.is_some());

    let err = queue
        .report_outcome(cmd.id, CommandOutcome::Executed)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    // The first outcome stands.
    let stored = queue.get(cmd.id).unwrap();
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(stored.executed_at, done.executed_at);
}

#[test]
fn test_report_outcome_unknown_command() {
    let queue = make_queue(&["esp-1"]);
    let err = queue
        .report_outcome(4242, CommandOutcome::Executed)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_concurrent_reports_exactly_one_wins() {
    let queue = make_queue(&["esp-1"]);

    for _ in 0..20 {
        let id = queue.enqueue("esp-1", "open_corridor").unwrap().id;
        let barrier = Arc::new(Barrier::new(2));

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = [CommandOutcome::Executed, CommandOutcome::Failed]
                .into_iter()
                .map(|outcome| {
                    let queue = queue.clone();
                    let barrier = barrier.clone();
                    s.spawn(move || {
                        barrier.wait();
                        queue.report_outcome(id, outcome)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::InvalidTransition);

        assert_eq!(queue.get(id).unwrap().status, winners[0].status);
    }
}

#[test]
fn test_claim_pending_leases_commands() {
    let queue = make_queue(&["esp-1"]);
    let a = queue.enqueue("esp-1", "open_corridor").unwrap();
    let b = queue.enqueue("esp-1", "open_corridor").unwrap();
    let lease = Duration::from_secs(60);

    let first = queue.claim_pending("esp-1", None, lease).unwrap();
    assert_eq!(first.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a.id, b.id]);

    // Overlapping poll sees nothing new.
    assert!(queue.claim_pending("esp-1", None, lease).unwrap().is_empty());

    // A newly queued command is still handed out.
    let c = queue.enqueue("esp-1", "open_corridor").unwrap();
    let second = queue.claim_pending("esp-1", None, lease).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, c.id);

    // Leased commands remain pending and reportable.
    assert_eq!(queue.list_pending("esp-1", None).unwrap().len(), 3);
    queue.report_outcome(a.id, CommandOutcome::Executed).unwrap();
}

#[test]
fn test_history_newest_first() {
    let queue = make_queue(&["esp-1", "esp-2"]);
    let a = queue.enqueue("esp-1", "open_corridor").unwrap();
    queue.enqueue("esp-2", "open_corridor").unwrap();
    let b = queue.enqueue("esp-1", "open_corridor").unwrap();
    queue.report_outcome(a.id, CommandOutcome::Executed).unwrap();

    let history = queue.list_for_device("esp-1", None).unwrap();
    assert_eq!(history.iter().map(|c| c.id).collect::<Vec<_>>(), vec![b.id, a.id]);
    assert_eq!(history[1].status, CommandStatus::Executed);

    assert_eq!(queue.list_for_device("esp-1", Some(1)).unwrap().len(), 1);
}

#[test]
fn test_claim_with_overflowing_lease_is_an_error() {
    let queue = make_queue(&["esp-1"]);
    let cmd = queue.enqueue("esp-1", "open_corridor").unwrap();

    let err = queue
        .claim_pending("esp-1", None, Duration::from_secs(10_000_000_000_000))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    // Nothing was leased, so a sane lease still hands the command out.
    let claimed = queue
        .claim_pending("esp-1", None, Duration::from_secs(30))
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, cmd.id);
}
