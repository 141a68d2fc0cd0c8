//! Periodic key update scheduler
//!
//! Each task wires one builder, provider and manager. When a task fires it
//! runs the builder, then re-arms itself at half of the remaining lifetime of
//! the manager's keys, never sooner than [`MIN_PERIOD_MS`].
//!
//! All tasks of a scheduler share one dedicated OS thread running a
//! current-thread tokio runtime. Stopping the scheduler joins that thread
//! before the task state is torn down, so no update can run afterwards.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::builder::KeyBuilder;
use crate::error::{KeyError, KeyResult};
use crate::manager::KeyManager;
use crate::provider::KeyProvider;
use parking_lot::Mutex;
use sks_types::{
    Event, EventType, KeysUpdateFailedPayload, KeysUpdatedPayload, TaskDegradedPayload,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

/// Lower bound of the delay between two runs of a task
pub const MIN_PERIOD_MS: u32 = 2000;

const EVENT_SOURCE: &str = "sks-scheduler";
const EVENT_CAPACITY: usize = 64;

/// Delay before the next run, given the remaining lifetime of the stored keys
pub fn next_period_ms(all_keys_lifetime_ms: u32) -> u32 {
    (all_keys_lifetime_ms / 2).max(MIN_PERIOD_MS)
}

/// Lifecycle of one scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Registered, scheduler not started
    Idle,
    /// Waiting for its next fire
    Armed,
    /// Builder update in progress
    Firing,
    /// Scheduler stopped
    Cancelled,
    /// Stopped rescheduling itself after an unrecoverable fire
    Degraded,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Armed => "armed",
            TaskState::Firing => "firing",
            TaskState::Cancelled => "cancelled",
            TaskState::Degraded => "degraded",
        }
    }
}

/// Point-in-time view of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub security_group_id: String,
    pub state: TaskState,
    /// Delay used for the current (or last) arming
    pub period_ms: u32,
    pub runs: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct SchedulerShared {
    tasks: Mutex<Vec<Arc<Mutex<TaskSnapshot>>>>,
    degraded: AtomicBool,
}

/// Read-only handle on a scheduler's task states
#[derive(Clone)]
pub struct SchedulerMonitor {
    shared: Arc<SchedulerShared>,
}

impl SchedulerMonitor {
    pub fn task_snapshots(&self) -> Vec<TaskSnapshot> {
        self.shared
            .tasks
            .lock()
            .iter()
            .map(|status| status.lock().clone())
            .collect()
    }

    /// True once any task stopped rescheduling itself
    pub fn is_degraded(&self) -> bool {
        self.shared.degraded.load(Ordering::SeqCst)
    }
}

struct TaskParts {
    builder: Arc<dyn KeyBuilder>,
    provider: Arc<dyn KeyProvider>,
}

struct SchedulerTask {
    manager: Arc<dyn KeyManager>,
    initial_period_ms: u32,
    slot: Arc<tokio::sync::Mutex<Option<TaskParts>>>,
    status: Arc<Mutex<TaskSnapshot>>,
}

struct TaskContext {
    security_group_id: String,
    manager: Arc<dyn KeyManager>,
    initial_period_ms: u32,
    slot: Arc<tokio::sync::Mutex<Option<TaskParts>>>,
    status: Arc<Mutex<TaskSnapshot>>,
    shared: Arc<SchedulerShared>,
    events: broadcast::Sender<Event>,
}

struct RunningScheduler {
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// Drives key updates for one or more security groups
pub struct KeyScheduler {
    tasks: Vec<SchedulerTask>,
    shared: Arc<SchedulerShared>,
    events: broadcast::Sender<Event>,
    running: Option<RunningScheduler>,
    started: bool,
}

impl KeyScheduler {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tasks: Vec::new(),
            shared: Arc::new(SchedulerShared::default()),
            events,
            running: None,
            started: false,
        }
    }

    /// Register a task. Builders and providers may be shared between tasks.
    pub fn add_task(
        &mut self,
        builder: Arc<dyn KeyBuilder>,
        provider: Arc<dyn KeyProvider>,
        manager: Arc<dyn KeyManager>,
        initial_period_ms: u32,
    ) -> KeyResult<()> {
        if self.started {
            return Err(KeyError::InvalidState(
                "cannot add a task to a started scheduler".to_string(),
            ));
        }
        if initial_period_ms == 0 {
            return Err(KeyError::InvalidParameters(
                "initial period must be greater than 0".to_string(),
            ));
        }

        let status = Arc::new(Mutex::new(TaskSnapshot {
            security_group_id: manager.security_group_id().to_string(),
            state: TaskState::Idle,
            period_ms: initial_period_ms,
            runs: 0,
            failures: 0,
            last_error: None,
        }));
        self.shared.tasks.lock().push(status.clone());

        debug!(
            security_group_id = %manager.security_group_id(),
            initial_period_ms = initial_period_ms,
            "Scheduler task added"
        );

        self.tasks.push(SchedulerTask {
            manager,
            initial_period_ms,
            slot: Arc::new(tokio::sync::Mutex::new(Some(TaskParts { builder, provider }))),
            status,
        });
        Ok(())
    }

    /// Spawn the scheduler thread and arm every task
    pub fn start(&mut self) -> KeyResult<()> {
        if self.running.is_some() || self.started {
            return Err(KeyError::InvalidState("scheduler already started".to_string()));
        }
        if self.tasks.is_empty() {
            return Err(KeyError::InvalidState("scheduler has no task".to_string()));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let contexts: Vec<TaskContext> = self
            .tasks
            .iter()
            .map(|task| TaskContext {
                security_group_id: task.manager.security_group_id().to_string(),
                manager: task.manager.clone(),
                initial_period_ms: task.initial_period_ms,
                slot: task.slot.clone(),
                status: task.status.clone(),
                shared: self.shared.clone(),
                events: self.events.clone(),
            })
            .collect();
        for task in &self.tasks {
            task.status.lock().state = TaskState::Armed;
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let nb_tasks = contexts.len();
        let thread = std::thread::Builder::new()
            .name("sks-scheduler".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    for context in contexts {
                        tokio::spawn(run_task(context));
                    }
                    let _ = shutdown_rx.await;
                });
                // Dropping the runtime here cancels every pending timer
            })?;

        self.started = true;
        self.running = Some(RunningScheduler { shutdown, thread });
        info!(tasks = nb_tasks, "Key scheduler started");
        Ok(())
    }

    /// Stop the scheduler thread and release every builder and provider.
    ///
    /// Managers are left untouched. Safe to call more than once.
    pub fn stop_and_clear(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
            if running.thread.join().is_err() {
                error!("Key scheduler thread panicked");
            }
            info!("Key scheduler stopped");
        }

        for task in self.tasks.drain(..) {
            match task.slot.try_lock() {
                Ok(mut parts) => {
                    parts.take();
                }
                Err(_) => warn!(
                    security_group_id = %task.manager.security_group_id(),
                    "Task slot still locked while clearing"
                ),
            }
            let mut status = task.status.lock();
            if status.state != TaskState::Degraded {
                status.state = TaskState::Cancelled;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn monitor(&self) -> SchedulerMonitor {
        SchedulerMonitor {
            shared: self.shared.clone(),
        }
    }

    /// Receive key lifecycle events published by the tasks
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

impl Default for KeyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeyScheduler {
    fn drop(&mut self) {
        self.stop_and_clear();
    }
}

async fn run_task(context: TaskContext) {
    let mut period_ms = context.initial_period_ms;

    loop {
        let Some(deadline) =
            tokio::time::Instant::now().checked_add(Duration::from_millis(period_ms as u64))
        else {
            degrade(&context, format!("timer deadline for {} ms is not representable", period_ms));
            return;
        };
        tokio::time::sleep_until(deadline).await;

        let slot = context.slot.lock().await;
        let Some(parts) = slot.as_ref() else {
            return;
        };
        context.status.lock().state = TaskState::Firing;

        let builder = parts.builder.clone();
        let provider = parts.provider.clone();
        let manager = context.manager.clone();
        let outcome = tokio::spawn(async move {
            builder.update(provider.as_ref(), manager.as_ref()).await
        })
        .await;

        let result = match outcome {
            Ok(result) => result,
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    "key update panicked".to_string()
                } else {
                    "key update was cancelled".to_string()
                };
                degrade(&context, reason);
                return;
            }
        };

        period_ms = next_period_ms(context.manager.all_keys_lifetime());
        let key_count = context.manager.size();
        {
            let mut status = context.status.lock();
            status.state = TaskState::Armed;
            status.period_ms = period_ms;
            match &result {
                Ok(()) => {
                    status.runs += 1;
                    status.last_error = None;
                }
                Err(e) => {
                    status.failures += 1;
                    status.last_error = Some(e.to_string());
                }
            }
        }

        let event = match result {
            Ok(()) => {
                info!(
                    security_group_id = %context.security_group_id,
                    key_count = key_count,
                    next_period_ms = period_ms,
                    "Keys updated"
                );
                Event::new(
                    EventType::KeysUpdated,
                    EVENT_SOURCE,
                    KeysUpdatedPayload {
                        security_group_id: context.security_group_id.clone(),
                        key_count,
                        next_period_ms: period_ms,
                    },
                )
            }
            Err(e) => {
                warn!(
                    security_group_id = %context.security_group_id,
                    error = %e,
                    next_period_ms = period_ms,
                    "Key update failed"
                );
                Event::new(
                    EventType::KeysUpdateFailed,
                    EVENT_SOURCE,
                    KeysUpdateFailedPayload {
                        security_group_id: context.security_group_id.clone(),
                        error: e.to_string(),
                        next_period_ms: period_ms,
                    },
                )
            }
        };
        publish(&context, event);
    }
}

fn degrade(context: &TaskContext, reason: String) {
    error!(
        security_group_id = %context.security_group_id,
        reason = %reason,
        "Scheduler task degraded, no further key updates"
    );
    {
        let mut status = context.status.lock();
        status.state = TaskState::Degraded;
        status.last_error = Some(reason.clone());
    }
    context.shared.degraded.store(true, Ordering::SeqCst);

    let event = Event::new(
        EventType::TaskDegraded,
        EVENT_SOURCE,
        TaskDegradedPayload {
            security_group_id: context.security_group_id.clone(),
            reason,
        },
    );
    publish(context, event);
}

fn publish(context: &TaskContext, event: sks_types::Result<Event>) {
    match event {
        // No subscriber is not an error
        Ok(event) => {
            let _ = context.events.send(event);
        }
        Err(e) => warn!(error = %e, "Failed to build scheduler event"),
    }
}
