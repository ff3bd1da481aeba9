use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use accord_core::models::{Amount, CoreErrorKind, Handle, Notification, TaskId};
use accord_core::registry::{
    CallContext, CallbackResult, CallbackTarget, PriceBook, RegistryConfig, SubmissionStatus,
    TaskRegistry,
};

#[derive(Default)]
struct RecordingCallback {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingCallback {
    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl CallbackTarget for RecordingCallback {
    fn invoke(&self, method: &str, _args: &Value, result: &str) -> CallbackResult {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), result.to_string()));
        Ok(())
    }
}

struct FailingCallback;

impl CallbackTarget for FailingCallback {
    fn invoke(&self, _method: &str, _args: &Value, _result: &str) -> CallbackResult {
        Err(accord_core::models::CoreError {
            task: None,
            worker: None,
            kind: CoreErrorKind::Internal,
            message: "requester callback exploded".to_string(),
        })
    }
}

fn test_registry(worker_count: usize) -> TaskRegistry {
    let registry = TaskRegistry::new(RegistryConfig {
        service: Handle::from("accord.service"),
        owner: Handle::from("owner"),
        price_book: PriceBook::new(Some(Amount::from_units(1))),
    });
    let owner_ctx = CallContext::direct(Handle::from("owner"));
    for index in 0..worker_count {
        registry
            .add_worker(&owner_ctx, Handle::from(format!("worker-{index}")))
            .unwrap();
    }
    registry
}

fn create_task(registry: &TaskRegistry, redundancy: u32) -> TaskId {
    let ctx = CallContext::relayed(Handle::from("requester"), Handle::from("end-user"));
    let spec = json!({
        "config": "cfg-ref",
        "input": { "question": "2+2" },
        "redundancy": redundancy,
    });
    registry
        .create_task(&ctx, Amount::from_units(9), &spec, "on_result", json!({}))
        .unwrap()
}

fn submit(registry: &TaskRegistry, worker: &str, task_id: TaskId, result: &str) -> Result<(), CoreErrorKind> {
    let ctx = CallContext::direct(Handle::from(worker));
    registry
        .submit(&ctx, task_id, result.to_string())
        .map_err(|error| error.kind)
}

#[test]
fn matching_submissions_finalize_at_the_redundancy_threshold() {
    let registry = test_registry(3);
    let requester = Arc::new(RecordingCallback::default());
    registry.register_callback_target(Handle::from("requester"), requester.clone());
    let task_id = create_task(&registry, 2);

    submit(&registry, "worker-0", task_id, "A").unwrap();
    assert_eq!(requester.calls().len(), 0);
    assert!(registry.get_task(task_id).is_some());

    submit(&registry, "worker-1", task_id, "A").unwrap();
    assert_eq!(requester.calls(), vec![("on_result".to_string(), "A".to_string())]);
    assert_eq!(registry.get_task(task_id), None);

    // The slow third worker finds nothing left to submit to.
    assert_eq!(
        submit(&registry, "worker-2", task_id, "B"),
        Err(CoreErrorKind::NotFound)
    );
    assert_eq!(requester.calls().len(), 1);
}

#[test]
fn disagreeing_submissions_accumulate_without_finalizing() {
    let registry = test_registry(3);
    let requester = Arc::new(RecordingCallback::default());
    registry.register_callback_target(Handle::from("requester"), requester.clone());
    let task_id = create_task(&registry, 2);

    submit(&registry, "worker-0", task_id, "A").unwrap();
    submit(&registry, "worker-1", task_id, "B").unwrap();
    assert!(registry.get_task(task_id).is_some());
    assert_eq!(requester.calls().len(), 0);

    submit(&registry, "worker-2", task_id, "B").unwrap();
    assert_eq!(requester.calls(), vec![("on_result".to_string(), "B".to_string())]);
    assert_eq!(registry.get_task(task_id), None);
}

#[test]
fn redundancy_one_finalizes_on_the_first_submission() {
    let registry = test_registry(2);
    let requester = Arc::new(RecordingCallback::default());
    registry.register_callback_target(Handle::from("requester"), requester.clone());
    let task_id = create_task(&registry, 1);

    submit(&registry, "worker-1", task_id, "only answer").unwrap();
    assert_eq!(
        requester.calls(),
        vec![("on_result".to_string(), "only answer".to_string())]
    );
    assert_eq!(registry.get_task(task_id), None);
}

#[test]
fn duplicate_submissions_are_rejected_without_mutation() {
    let registry = test_registry(3);
    let task_id = create_task(&registry, 3);

    submit(&registry, "worker-0", task_id, "A").unwrap();
    assert_eq!(
        submit(&registry, "worker-0", task_id, "A"),
        Err(CoreErrorKind::DuplicateSubmission)
    );
    assert_eq!(
        submit(&registry, "worker-0", task_id, "different"),
        Err(CoreErrorKind::DuplicateSubmission)
    );

    assert_eq!(
        registry
            .check_status(task_id, &Handle::from("worker-0"))
            .unwrap(),
        SubmissionStatus::AlreadySubmitted
    );
    assert_eq!(
        registry
            .check_status(task_id, &Handle::from("worker-1"))
            .unwrap(),
        SubmissionStatus::Ok
    );
    assert!(registry.get_task(task_id).is_some());
}

#[test]
fn unauthorized_workers_cannot_submit() {
    let registry = test_registry(2);
    let task_id = create_task(&registry, 1);
    assert_eq!(
        submit(&registry, "impostor", task_id, "A"),
        Err(CoreErrorKind::Authorization)
    );
    assert!(registry.get_task(task_id).is_some());
}

#[test]
fn submitting_to_an_unknown_task_fails() {
    let registry = test_registry(2);
    assert_eq!(
        submit(&registry, "worker-0", TaskId(41), "A"),
        Err(CoreErrorKind::NotFound)
    );
}

#[test]
fn status_reports_not_found_for_unknown_and_finalized_tasks() {
    let registry = test_registry(2);
    assert_eq!(
        registry
            .check_status(TaskId(7), &Handle::from("worker-0"))
            .unwrap(),
        SubmissionStatus::NotFound
    );

    let task_id = create_task(&registry, 1);
    assert_eq!(
        registry
            .check_status(task_id, &Handle::from("worker-0"))
            .unwrap(),
        SubmissionStatus::Ok
    );
    submit(&registry, "worker-0", task_id, "A").unwrap();
    assert_eq!(
        registry
            .check_status(task_id, &Handle::from("worker-1"))
            .unwrap(),
        SubmissionStatus::NotFound
    );
}

#[test]
fn a_full_slot_log_without_agreement_is_terminal() {
    let registry = test_registry(3);
    let requester = Arc::new(RecordingCallback::default());
    registry.register_callback_target(Handle::from("requester"), requester.clone());
    let task_id = create_task(&registry, 2);

    submit(&registry, "worker-0", task_id, "A").unwrap();
    submit(&registry, "worker-1", task_id, "B").unwrap();
    submit(&registry, "worker-2", task_id, "C").unwrap();

    // Every slot is taken and no value reached the threshold; anyone still
    // probing the task sees the dead end.
    assert_eq!(
        registry
            .check_status(task_id, &Handle::from("worker-9"))
            .unwrap(),
        SubmissionStatus::NoConsensus
    );
    for worker in ["worker-0", "worker-1", "worker-2"] {
        assert_eq!(
            registry
                .check_status(task_id, &Handle::from(worker))
                .unwrap(),
            SubmissionStatus::AlreadySubmitted
        );
    }
    assert_eq!(requester.calls().len(), 0);
    assert!(registry.get_task(task_id).is_some());
}

#[test]
fn a_dead_end_task_rejects_further_disagreeing_submissions() {
    let registry = test_registry(3);
    let task_id = create_task(&registry, 2);

    submit(&registry, "worker-0", task_id, "A").unwrap();
    submit(&registry, "worker-1", task_id, "B").unwrap();
    submit(&registry, "worker-2", task_id, "C").unwrap();

    // Swapping the roster brings in a fresh worker, but the slot log is
    // already at the roster size: only a threshold match could still land.
    let owner_ctx = CallContext::direct(Handle::from("owner"));
    registry
        .remove_worker(&owner_ctx, Handle::from("worker-0"))
        .unwrap();
    registry
        .add_worker(&owner_ctx, Handle::from("worker-3"))
        .unwrap();
    assert_eq!(
        submit(&registry, "worker-3", task_id, "D"),
        Err(CoreErrorKind::NoConsensus)
    );
    assert!(registry.get_task(task_id).is_some());
}

#[test]
fn callback_failure_does_not_undo_finalization() {
    let registry = test_registry(2);
    registry.register_callback_target(Handle::from("requester"), Arc::new(FailingCallback));
    let mut events = registry.subscribe();
    let task_id = create_task(&registry, 1);

    submit(&registry, "worker-0", task_id, "A").unwrap();
    assert_eq!(registry.get_task(task_id), None);

    assert_eq!(
        events.try_recv().unwrap(),
        Notification::TaskCreated { task_id, redundancy: 1 }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        Notification::TaskFinalized { task_id }
    );
}

#[test]
fn finalization_fires_even_with_no_registered_target() {
    let registry = test_registry(2);
    let mut events = registry.subscribe();
    let task_id = create_task(&registry, 1);

    submit(&registry, "worker-0", task_id, "A").unwrap();
    assert_eq!(registry.get_task(task_id), None);
    assert_eq!(
        events.try_recv().unwrap(),
        Notification::TaskCreated { task_id, redundancy: 1 }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        Notification::TaskFinalized { task_id }
    );
}
