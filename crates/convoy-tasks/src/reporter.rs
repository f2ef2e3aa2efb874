//! Task execution reporting

use std::time::Duration;

/// Events emitted during task execution
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task is starting
    Started {
        id: String,
    },
    /// A task produced a line of output
    Output {
        id: String,
        line: String,
        is_stderr: bool,
    },
    /// A task completed; `cached` marks a cache hit that skipped execution
    Completed {
        id: String,
        duration: Duration,
        cached: bool,
    },
    /// A task failed
    Failed {
        id: String,
        duration: Duration,
        error: String,
    },
    /// A failed task is being restarted
    Restarted {
        id: String,
        attempt: u32,
    },
    /// A topological layer is starting
    LayerStarted {
        layer: usize,
        task_count: usize,
    },
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id } => {
                tracing::info!("Starting {}", id);
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if *is_stderr {
                    tracing::warn!("[{}] {}", id, line);
                } else {
                    tracing::debug!("[{}] {}", id, line);
                }
            }
            TaskEvent::Completed { id, duration, cached } => {
                if *cached {
                    tracing::info!("{} skipped, cache hit ({:.1}s)", id, duration.as_secs_f64());
                } else {
                    tracing::info!("{} completed in {:.1}s", id, duration.as_secs_f64());
                }
            }
            TaskEvent::Failed { id, duration, error } => {
                tracing::error!("{} failed after {:.1}s: {}", id, duration.as_secs_f64(), error);
            }
            TaskEvent::Restarted { id, attempt } => {
                tracing::info!("Restarting {} (attempt {})", id, attempt);
            }
            TaskEvent::LayerStarted { layer, task_count } => {
                tracing::info!("Starting layer {} ({} tasks)", layer, task_count);
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
