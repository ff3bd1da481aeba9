use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::models::{Handle, Notification, Task, TaskId};
use crate::registry::{CallContext, SubmissionStatus, TaskRegistry};
use crate::worker::content::ContentStore;
use crate::worker::prompt::{extract_result_tag, parse_config, render_prompt};
use crate::worker::provider::{CompletionRequest, ComputeProvider};
use crate::worker::schedule::{DEFAULT_BASE_INTERVAL, stagger_delay};

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub handle: Handle,
    pub base_interval: Duration,
}

impl WorkerConfig {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            base_interval: DEFAULT_BASE_INTERVAL,
        }
    }

    pub fn with_base_interval(mut self, base_interval: Duration) -> Self {
        self.base_interval = base_interval;
        self
    }
}

/// One long-lived worker process: reacts to task notifications, holds back
/// per the stagger schedule, and pushes at most one submission per task.
/// Subscription happens at construction, so tasks created after `new` are
/// seen even if the run loop starts later.
pub struct Worker {
    pipeline: TaskPipeline,
    events: broadcast::Receiver<Notification>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        registry: Arc<TaskRegistry>,
        provider: Arc<dyn ComputeProvider>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        let events = registry.subscribe();
        Self {
            pipeline: TaskPipeline {
                config,
                registry,
                provider,
                content,
            },
            events,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        loop {
            match self.events.recv().await {
                Ok(Notification::TaskCreated { task_id, redundancy }) => {
                    let pipeline = self.pipeline.clone();
                    tokio::spawn(async move {
                        pipeline.process_task(task_id, redundancy).await;
                    });
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        worker = %self.pipeline.config.handle,
                        skipped,
                        "notification stream lagged; task notifications were missed"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[derive(Clone)]
struct TaskPipeline {
    config: WorkerConfig,
    registry: Arc<TaskRegistry>,
    provider: Arc<dyn ComputeProvider>,
    content: Arc<dyn ContentStore>,
}

impl TaskPipeline {
    async fn process_task(&self, task_id: TaskId, redundancy: u32) {
        // Roster position is read now, not at task creation; staggering
        // follows whatever the roster looks like at processing time.
        let Some((worker_index, total_workers)) =
            self.registry.worker_position(&self.config.handle)
        else {
            tracing::debug!(
                worker = %self.config.handle,
                task_id = task_id.0,
                "not on the roster; skipping task"
            );
            return;
        };
        let delay = stagger_delay(
            task_id.0,
            redundancy,
            worker_index,
            total_workers,
            self.config.base_interval,
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.task_still_open(task_id, "before compute") {
            return;
        }
        let Some(task) = self.registry.get_task(task_id) else {
            return;
        };
        let Some(request) = self.prepare_request(&task) else {
            return;
        };

        let output = match self.provider.complete(request).await {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(
                    worker = %self.config.handle,
                    task_id = task_id.0,
                    kind = ?error.kind,
                    message = %error.message,
                    "compute provider failed; forfeiting this task"
                );
                return;
            }
        };

        // Advisory only: a consensus that lands between this check and the
        // submission is still handled by the aggregator's rejection.
        if !self.task_still_open(task_id, "before submission") {
            return;
        }
        let Some(result) = self.shape_result(&task, output) else {
            return;
        };
        let ctx = CallContext::direct(self.config.handle.clone());
        if let Err(error) = self.registry.submit(&ctx, task_id, result) {
            tracing::debug!(
                worker = %self.config.handle,
                task_id = task_id.0,
                kind = ?error.kind,
                message = %error.message,
                "submission not applied"
            );
        }
    }

    fn task_still_open(&self, task_id: TaskId, stage: &str) -> bool {
        match self.registry.check_status(task_id, &self.config.handle) {
            Ok(SubmissionStatus::Ok) => true,
            Ok(status) => {
                tracing::debug!(
                    worker = %self.config.handle,
                    task_id = task_id.0,
                    status = ?status,
                    stage,
                    "task no longer open; skipping"
                );
                false
            }
            Err(error) => {
                tracing::warn!(
                    worker = %self.config.handle,
                    task_id = task_id.0,
                    message = %error.message,
                    stage,
                    "status check failed; skipping"
                );
                false
            }
        }
    }

    fn prepare_request(&self, task: &Task) -> Option<CompletionRequest> {
        let blob = match self.content.get(&task.config_ref) {
            Ok(blob) => blob,
            Err(error) => {
                tracing::warn!(
                    worker = %self.config.handle,
                    task_id = task.id.0,
                    config_ref = %task.config_ref,
                    message = %error.message,
                    "config resolution failed; task left pending"
                );
                return None;
            }
        };
        let config = parse_config(&blob);
        let Some(model) = config.model.clone().or_else(|| task.variant.clone()) else {
            tracing::warn!(
                worker = %self.config.handle,
                task_id = task.id.0,
                "config names no model and the task carries no variant; task left pending"
            );
            return None;
        };
        let prompt = match render_prompt(&config.template, &task.inputs, self.content.as_ref()) {
            Ok(prompt) => prompt,
            Err(error) => {
                tracing::warn!(
                    worker = %self.config.handle,
                    task_id = task.id.0,
                    message = %error.message,
                    "prompt rendering failed; task left pending"
                );
                return None;
            }
        };
        Some(CompletionRequest { model, prompt })
    }

    fn shape_result(&self, task: &Task, output: String) -> Option<String> {
        let result = if task.flags.extract_result_tag {
            extract_result_tag(&output)
        } else {
            output
        };
        if !task.flags.store_result_offchain {
            return Some(result);
        }
        match self.content.put(&result) {
            Ok(hash) => Some(hash),
            Err(error) => {
                tracing::warn!(
                    worker = %self.config.handle,
                    task_id = task.id.0,
                    message = %error.message,
                    "failed to store result offchain; forfeiting this task"
                );
                None
            }
        }
    }
}
