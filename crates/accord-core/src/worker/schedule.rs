use std::time::Duration;

pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(60_000);

/// How long a worker holds back before attempting a task.
///
/// Positions rotate by `task_id mod total_workers` so different tasks lead
/// with different workers. The first `redundancy` rotated positions start
/// immediately; each later position waits one more `base_interval`, so
/// backups only spend compute when the primaries have had their window.
pub fn stagger_delay(
    task_id: u64,
    redundancy: u32,
    worker_index: usize,
    total_workers: usize,
    base_interval: Duration,
) -> Duration {
    if total_workers == 0 {
        return Duration::ZERO;
    }
    let total = total_workers as u64;
    let start = task_id % total;
    let position = (worker_index as u64 + total - start) % total;
    if position < redundancy as u64 {
        return Duration::ZERO;
    }
    base_interval * ((position - redundancy as u64 + 1) as u32)
}
