pub mod finalize;
pub mod pricing;
pub mod quorum;
pub mod schema;
pub mod submissions;

pub use finalize::{CallbackResult, CallbackTarget, Finalization, FinalizedSource};
pub use pricing::PriceBook;
pub use quorum::{QUORUM_RESULT_METHOD, QuorumLog, QuorumRequest, default_threshold};
pub use schema::{TaskSpec, validate_task_spec};
pub use submissions::{SubmissionLog, SubmissionSlot, SubmissionStatus};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::models::{
    Amount, CallbackSpec, CoreError, CoreErrorKind, Handle, Notification, QuorumTask,
    QuorumTaskId, RosterChange, Task, TaskId,
};
use crate::registry::quorum::{bind_quorum_args, bound_quorum_id};

pub type RegistryResult<T> = Result<T, CoreError>;

const NOTIFICATION_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Handle the registry itself acts under; quorum sub-task callbacks are
    /// addressed to it.
    pub service: Handle,
    /// Only this handle may mutate the worker roster.
    pub owner: Handle,
    pub price_book: PriceBook,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallContext {
    pub caller: Handle,
    pub originator: Handle,
}

impl CallContext {
    pub fn direct(handle: Handle) -> Self {
        Self {
            caller: handle.clone(),
            originator: handle,
        }
    }

    pub fn relayed(caller: Handle, originator: Handle) -> Self {
        Self { caller, originator }
    }
}

/// The coordination service: task registry, submission and quorum
/// aggregators, and the finalization dispatcher. Every public operation is a
/// single lock-scoped read-decide-write; callbacks run only after the lock
/// is released and the finalized state is gone.
pub struct TaskRegistry {
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    targets: Mutex<HashMap<Handle, Arc<dyn CallbackTarget>>>,
    events: broadcast::Sender<Notification>,
}

#[derive(Default)]
struct RegistryState {
    last_task_id: u64,
    last_quorum_task_id: u64,
    roster: Vec<Handle>,
    tasks: HashMap<TaskId, Task>,
    submissions: HashMap<TaskId, SubmissionLog>,
    quorum_tasks: HashMap<QuorumTaskId, QuorumTask>,
    quorum_results: HashMap<QuorumTaskId, QuorumLog>,
}

impl TaskRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            config,
            state: Mutex::new(RegistryState::default()),
            targets: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    pub fn register_callback_target(&self, handle: Handle, target: Arc<dyn CallbackTarget>) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.insert(handle, target);
        }
    }

    pub fn add_worker(&self, ctx: &CallContext, worker: Handle) -> RegistryResult<()> {
        self.ensure_owner(ctx)?;
        {
            let mut state = self.lock_state()?;
            if state.roster.contains(&worker) {
                return Err(validation_error(format!(
                    "worker '{worker}' is already on the roster"
                )));
            }
            state.roster.push(worker.clone());
        }
        self.emit(Notification::RosterChanged {
            change: RosterChange::Added,
            worker,
        });
        Ok(())
    }

    pub fn remove_worker(&self, ctx: &CallContext, worker: Handle) -> RegistryResult<()> {
        self.ensure_owner(ctx)?;
        {
            let mut state = self.lock_state()?;
            let Some(position) = state.roster.iter().position(|entry| entry == &worker) else {
                return Err(validation_error(format!(
                    "worker '{worker}' is not on the roster"
                )));
            };
            state.roster.remove(position);
        }
        self.emit(Notification::RosterChanged {
            change: RosterChange::Removed,
            worker,
        });
        Ok(())
    }

    pub fn workers(&self) -> RegistryResult<Vec<Handle>> {
        Ok(self.lock_state()?.roster.clone())
    }

    /// Insertion-order index and roster size as of this call. Both shift
    /// under roster mutation, so schedulers must read them at processing
    /// time.
    pub fn worker_position(&self, worker: &Handle) -> Option<(usize, usize)> {
        let state = self.state.lock().ok()?;
        let index = state.roster.iter().position(|entry| entry == worker)?;
        Some((index, state.roster.len()))
    }

    pub fn create_task(
        &self,
        ctx: &CallContext,
        payment: Amount,
        spec: &Value,
        callback_method: &str,
        callback_args: Value,
    ) -> RegistryResult<TaskId> {
        ensure_intermediary(ctx)?;
        let spec = validate_task_spec(spec)?;
        let (task_id, redundancy) = {
            let mut state = self.lock_state()?;
            self.create_task_locked(
                &mut state,
                ctx.caller.clone(),
                payment,
                spec,
                callback_method,
                callback_args,
            )?
        };
        self.emit(Notification::TaskCreated { task_id, redundancy });
        Ok(task_id)
    }

    pub fn get_task(&self, task_id: TaskId) -> Option<Task> {
        self.state.lock().ok()?.tasks.get(&task_id).cloned()
    }

    pub fn check_status(
        &self,
        task_id: TaskId,
        worker: &Handle,
    ) -> RegistryResult<SubmissionStatus> {
        let state = self.lock_state()?;
        let status = match state.submissions.get(&task_id) {
            Some(log) if state.tasks.contains_key(&task_id) => {
                log.status_for(worker, state.roster.len())
            }
            _ => SubmissionStatus::NotFound,
        };
        Ok(status)
    }

    pub fn submit(&self, ctx: &CallContext, task_id: TaskId, result: String) -> RegistryResult<()> {
        let worker = ctx.caller.clone();
        let finalization = {
            let mut guard = self.lock_state()?;
            let state = &mut *guard;
            if !state.roster.contains(&worker) {
                return Err(unauthorized_worker(&worker, task_id));
            }
            let redundancy = match state.tasks.get(&task_id) {
                Some(task) => task.redundancy,
                None => return Err(task_lookup_error(task_id)),
            };
            let log = state.submissions.entry(task_id).or_default();
            if log.has_submission_from(&worker) {
                return Err(duplicate_submission(&worker, task_id));
            }
            if log.matches_for(&result) >= redundancy {
                state.submissions.remove(&task_id);
                state
                    .tasks
                    .remove(&task_id)
                    .map(|task| Finalization::for_task(task, result))
            } else if log.slots().len() >= state.roster.len() {
                // Slots are bounded by the roster size; a full log with no
                // value at threshold is terminal.
                return Err(no_consensus_error(task_id));
            } else {
                log.record(worker, result);
                None
            }
        };
        if let Some(finalization) = finalization {
            self.dispatch(finalization);
        }
        Ok(())
    }

    pub fn create_quorum_task(
        &self,
        ctx: &CallContext,
        payment: Amount,
        request: QuorumRequest,
    ) -> RegistryResult<QuorumTaskId> {
        ensure_intermediary(ctx)?;
        if request.variants.is_empty() {
            return Err(validation_error("quorum task requires at least one variant"));
        }
        let variant_count = request.variants.len() as u32;
        let quorum_threshold = request
            .quorum_threshold
            .unwrap_or_else(|| default_threshold(variant_count));
        if quorum_threshold == 0 || quorum_threshold > variant_count {
            return Err(validation_error(format!(
                "quorum threshold {quorum_threshold} must be between 1 and {variant_count}"
            )));
        }

        // Every variant must price before anything is dispatched.
        let mut sub_prices = Vec::with_capacity(request.variants.len());
        let mut total_price = Amount::ZERO;
        for variant in &request.variants {
            let unit_price = self.config.price_book.unit_price(Some(variant))?;
            let sub_price = self
                .config
                .price_book
                .total_price(unit_price, request.redundancy)?;
            total_price = total_price
                .checked_add(sub_price)
                .ok_or_else(quorum_price_overflow)?;
            sub_prices.push(sub_price);
        }

        // The payment check runs only after the fan-out below; when it
        // fails, the quorum task is aborted but the sub-tasks stay
        // dispatched and their eventual results land in the idempotent
        // no-op path.
        let payment_ok = payment >= total_price;
        let mut created = Vec::with_capacity(request.variants.len());
        let quorum_task_id = {
            let mut guard = self.lock_state()?;
            let state = &mut *guard;
            if request.redundancy == 0 || request.redundancy as usize > state.roster.len() {
                return Err(redundancy_bound_error(request.redundancy, state.roster.len()));
            }
            let quorum_task_id = QuorumTaskId(state.last_quorum_task_id + 1);
            state.last_quorum_task_id = quorum_task_id.0;
            state.quorum_tasks.insert(
                quorum_task_id,
                QuorumTask {
                    id: quorum_task_id,
                    requester: ctx.caller.clone(),
                    callback: CallbackSpec {
                        receiver: ctx.caller.clone(),
                        method: request.callback_method.clone(),
                        args: request.callback_args.clone(),
                    },
                    quorum_threshold,
                    variant_count,
                },
            );
            state.quorum_results.insert(quorum_task_id, QuorumLog::new());

            for (variant, sub_price) in request.variants.iter().zip(&sub_prices) {
                let spec = TaskSpec {
                    config_ref: request.config_ref.clone(),
                    inputs: request.inputs.clone(),
                    variant: Some(variant.clone()),
                    redundancy: request.redundancy,
                    flags: request.flags,
                };
                let (task_id, redundancy) = self.create_task_locked(
                    state,
                    self.config.service.clone(),
                    *sub_price,
                    spec,
                    QUORUM_RESULT_METHOD,
                    bind_quorum_args(quorum_task_id),
                )?;
                created.push(Notification::TaskCreated { task_id, redundancy });
            }

            if !payment_ok {
                state.quorum_tasks.remove(&quorum_task_id);
                state.quorum_results.remove(&quorum_task_id);
                state.last_quorum_task_id = quorum_task_id.0 - 1;
            }
            quorum_task_id
        };

        for notification in created {
            self.emit(notification);
        }
        if !payment_ok {
            return Err(CoreError {
                task: None,
                worker: None,
                kind: CoreErrorKind::InsufficientPayment,
                message: format!("payment {payment} below quorum total price {total_price}"),
            });
        }
        self.emit(Notification::QuorumTaskCreated {
            quorum_task_id,
            variant_count,
            quorum_threshold,
        });
        Ok(quorum_task_id)
    }

    pub fn get_quorum_task(&self, quorum_task_id: QuorumTaskId) -> Option<QuorumTask> {
        self.state
            .lock()
            .ok()?
            .quorum_tasks
            .get(&quorum_task_id)
            .cloned()
    }

    /// Collected sub-results in completion order, or `None` once the quorum
    /// task is finalized or was never created.
    pub fn quorum_results(&self, quorum_task_id: QuorumTaskId) -> Option<Vec<String>> {
        let state = self.state.lock().ok()?;
        if !state.quorum_tasks.contains_key(&quorum_task_id) {
            return None;
        }
        Some(
            state
                .quorum_results
                .get(&quorum_task_id)
                .map(|log| log.results().to_vec())
                .unwrap_or_default(),
        )
    }

    /// Restricted entry point for sub-task results; only the service handle
    /// itself may deliver them. Unknown quorum ids are ignored.
    pub fn on_sub_result(
        &self,
        ctx: &CallContext,
        quorum_task_id: QuorumTaskId,
        result: &str,
    ) -> RegistryResult<()> {
        if ctx.caller != self.config.service {
            return Err(CoreError {
                task: None,
                worker: Some(ctx.caller.clone()),
                kind: CoreErrorKind::Authorization,
                message: "quorum sub-results are accepted only from the service itself"
                    .to_string(),
            });
        }
        if let Some(finalization) = self.apply_sub_result(quorum_task_id, result) {
            self.dispatch(finalization);
        }
        Ok(())
    }
}

impl TaskRegistry {
    fn create_task_locked(
        &self,
        state: &mut RegistryState,
        requester: Handle,
        payment: Amount,
        spec: TaskSpec,
        callback_method: &str,
        callback_args: Value,
    ) -> RegistryResult<(TaskId, u32)> {
        if spec.redundancy == 0 || spec.redundancy as usize > state.roster.len() {
            return Err(redundancy_bound_error(spec.redundancy, state.roster.len()));
        }
        let unit_price = self.config.price_book.unit_price(spec.variant.as_deref())?;
        let total_price = self
            .config
            .price_book
            .total_price(unit_price, spec.redundancy)?;
        if payment < total_price {
            return Err(CoreError {
                task: None,
                worker: None,
                kind: CoreErrorKind::InsufficientPayment,
                message: format!("payment {payment} below total price {total_price}"),
            });
        }

        let task_id = TaskId(state.last_task_id + 1);
        state.last_task_id = task_id.0;
        let redundancy = spec.redundancy;
        let callback = CallbackSpec {
            receiver: requester.clone(),
            method: callback_method.to_string(),
            args: callback_args,
        };
        state.tasks.insert(
            task_id,
            Task {
                id: task_id,
                requester,
                payment,
                variant: spec.variant,
                config_ref: spec.config_ref,
                inputs: spec.inputs,
                callback,
                redundancy,
                flags: spec.flags,
            },
        );
        state.submissions.insert(task_id, SubmissionLog::new());
        Ok((task_id, redundancy))
    }

    fn dispatch(&self, finalization: Finalization) {
        let mut next = Some(finalization);
        while let Some(finalization) = next.take() {
            next = self.dispatch_one(finalization);
        }
    }

    fn dispatch_one(&self, finalization: Finalization) -> Option<Finalization> {
        let Finalization {
            source,
            callback,
            result,
        } = finalization;
        let followup = if callback.receiver == self.config.service
            && callback.method == QUORUM_RESULT_METHOD
        {
            match bound_quorum_id(&callback.args) {
                Some(quorum_task_id) => self.apply_sub_result(quorum_task_id, &result),
                None => {
                    tracing::warn!(
                        method = %callback.method,
                        "quorum sub-result finalized without a bound quorum task id"
                    );
                    None
                }
            }
        } else {
            self.invoke_callback(&callback, &result);
            None
        };
        match source {
            FinalizedSource::Task(task_id) => self.emit(Notification::TaskFinalized { task_id }),
            FinalizedSource::Quorum(quorum_task_id) => {
                self.emit(Notification::QuorumReached { quorum_task_id })
            }
        }
        followup
    }

    fn invoke_callback(&self, callback: &CallbackSpec, result: &str) {
        let target = match self.targets.lock() {
            Ok(targets) => targets.get(&callback.receiver).cloned(),
            Err(_) => {
                tracing::error!("callback target mutex poisoned");
                None
            }
        };
        let Some(target) = target else {
            tracing::warn!(
                receiver = %callback.receiver,
                method = %callback.method,
                "no callback target registered; finalization already applied"
            );
            return;
        };
        if let Err(error) = target.invoke(&callback.method, &callback.args, result) {
            tracing::warn!(
                receiver = %callback.receiver,
                method = %callback.method,
                kind = ?error.kind,
                message = %error.message,
                "task callback failed; finalization already applied"
            );
        }
    }

    fn apply_sub_result(
        &self,
        quorum_task_id: QuorumTaskId,
        result: &str,
    ) -> Option<Finalization> {
        let mut guard = match self.lock_state() {
            Ok(guard) => guard,
            Err(error) => {
                tracing::error!(
                    quorum_task_id = quorum_task_id.0,
                    message = %error.message,
                    "dropping quorum sub-result"
                );
                return None;
            }
        };
        let state = &mut *guard;
        let quorum_threshold = match state.quorum_tasks.get(&quorum_task_id) {
            Some(task) => task.quorum_threshold,
            None => {
                tracing::debug!(
                    quorum_task_id = quorum_task_id.0,
                    "sub-result for unknown or finalized quorum task ignored"
                );
                return None;
            }
        };
        let log = state.quorum_results.entry(quorum_task_id).or_default();
        if log.matches_for(result) >= quorum_threshold {
            state.quorum_results.remove(&quorum_task_id);
            state
                .quorum_tasks
                .remove(&quorum_task_id)
                .map(|task| Finalization::for_quorum(quorum_task_id, task.callback, result.to_string()))
        } else {
            log.record(result.to_string());
            None
        }
    }

    fn ensure_owner(&self, ctx: &CallContext) -> RegistryResult<()> {
        if ctx.caller != self.config.owner {
            return Err(CoreError {
                task: None,
                worker: Some(ctx.caller.clone()),
                kind: CoreErrorKind::Authorization,
                message: "only the owner may change the worker roster".to_string(),
            });
        }
        Ok(())
    }

    fn emit(&self, notification: Notification) {
        let _ = self.events.send(notification);
    }

    fn lock_state(&self) -> RegistryResult<MutexGuard<'_, RegistryState>> {
        self.state.lock().map_err(|_| CoreError {
            task: None,
            worker: None,
            kind: CoreErrorKind::Internal,
            message: "task registry mutex poisoned".to_string(),
        })
    }
}

fn ensure_intermediary(ctx: &CallContext) -> RegistryResult<()> {
    if ctx.caller == ctx.originator {
        return Err(CoreError {
            task: None,
            worker: None,
            kind: CoreErrorKind::Authorization,
            message: "tasks must be requested by an intermediary program, not the transaction originator".to_string(),
        });
    }
    Ok(())
}

fn redundancy_bound_error(redundancy: u32, roster_size: usize) -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Validation,
        message: format!(
            "redundancy {redundancy} must be between 1 and the current roster size {roster_size}"
        ),
    }
}

fn task_lookup_error(task_id: TaskId) -> CoreError {
    CoreError {
        task: Some(task_id),
        worker: None,
        kind: CoreErrorKind::NotFound,
        message: format!("unknown task id '{}'", task_id.0),
    }
}

fn unauthorized_worker(worker: &Handle, task_id: TaskId) -> CoreError {
    CoreError {
        task: Some(task_id),
        worker: Some(worker.clone()),
        kind: CoreErrorKind::Authorization,
        message: format!("worker '{worker}' is not on the roster"),
    }
}

fn no_consensus_error(task_id: TaskId) -> CoreError {
    CoreError {
        task: Some(task_id),
        worker: None,
        kind: CoreErrorKind::NoConsensus,
        message: format!(
            "every submission slot for task '{}' is filled without consensus",
            task_id.0
        ),
    }
}

fn duplicate_submission(worker: &Handle, task_id: TaskId) -> CoreError {
    CoreError {
        task: Some(task_id),
        worker: Some(worker.clone()),
        kind: CoreErrorKind::DuplicateSubmission,
        message: format!("worker '{worker}' already submitted for task '{}'", task_id.0),
    }
}

fn validation_error(message: impl Into<String>) -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Validation,
        message: message.into(),
    }
}

fn quorum_price_overflow() -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Internal,
        message: "quorum total price overflow".to_string(),
    }
}
