//! IOC core: PV registration, startup hooks and the per-task loops.
//!
//! Every periodic task runs on its own thread:
//! `startup(); loop { tick(); sleep(period - elapsed) }` until the running
//! flag clears. A fatal tick error stops only that task, a panic is
//! confined to its thread and the other tasks keep running.

use simioc_common::pv::ValueStore;
use simioc_common::sim::{SimError, SimTask, StartupHook};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::ioc_registry::IocAssembly;
use crate::state::{PersistedPosition, PersistedState, StatePersistence};

/// Longest uninterrupted sleep, so shutdown is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Timing statistics of one task loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingStats {
    /// Number of ticks executed
    pub tick_count: u64,
    /// Ticks that took longer than the period
    pub timing_violations: u64,
    /// Maximum observed tick time
    pub max_tick_time_us: u64,
    /// Sum of tick times for average calculation
    pub total_tick_time_us: u64,
}

impl TimingStats {
    fn record(&mut self, name: &str, elapsed: Duration, period: Duration) {
        let tick_time_us = elapsed.as_micros() as u64;
        self.tick_count += 1;
        self.total_tick_time_us += tick_time_us;
        self.max_tick_time_us = self.max_tick_time_us.max(tick_time_us);

        if elapsed > period {
            self.timing_violations += 1;
            if self.timing_violations <= 10 || self.timing_violations % 1000 == 0 {
                warn!(
                    "Task {}: timing violation #{}: tick took {}us (period {}us)",
                    name,
                    self.timing_violations,
                    tick_time_us,
                    period.as_micros()
                );
            }
        }
    }

    /// Mean tick time.
    pub fn average_tick_time_us(&self) -> u64 {
        self.total_tick_time_us.checked_div(self.tick_count).unwrap_or(0)
    }
}

/// How a task loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskExit {
    /// The running flag cleared.
    Stopped,
    /// A fatal error ended the loop.
    Halted(String),
    /// The task thread panicked.
    Panicked,
}

/// Outcome of one task loop.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Task name
    pub name: String,
    /// Loop timing
    pub stats: TimingStats,
    /// Why the loop ended
    pub exit: TaskExit,
}

/// Runs one assembled IOC against a value store.
pub struct IocCore {
    ioc: String,
    store: Arc<dyn ValueStore>,
    tasks: Vec<Box<dyn SimTask>>,
    startup: Vec<(String, StartupHook)>,
    running: Arc<AtomicBool>,
    persistence: Option<StatePersistence>,
}

impl IocCore {
    /// Register the assembly's PVs into `store` and prepare its tasks.
    ///
    /// # Errors
    /// Returns `SimError::InitFailed` if a PV cannot be registered.
    pub fn new(ioc: &str, assembly: IocAssembly, store: Arc<dyn ValueStore>) -> Result<Self, SimError> {
        assembly
            .schema
            .register_into(store.as_ref())
            .map_err(|e| SimError::InitFailed(format!("PV registration failed: {e}")))?;

        info!(
            "IOC '{}' created: {} PVs, {} tasks, {} startup hooks",
            ioc,
            assembly.schema.len(),
            assembly.tasks.len(),
            assembly.startup.len()
        );

        Ok(Self {
            ioc: ioc.to_string(),
            store,
            tasks: assembly.tasks,
            startup: assembly.startup,
            running: Arc::new(AtomicBool::new(true)),
            persistence: None,
        })
    }

    /// Persist motor positions to `persistence`.
    pub fn with_persistence(mut self, persistence: StatePersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// The value store.
    pub fn store(&self) -> &Arc<dyn ValueStore> {
        &self.store
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Names of the prepared tasks.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    fn run_startup_hooks(&mut self) -> Result<(), SimError> {
        for (name, hook) in self.startup.drain(..) {
            debug!("Running startup hook '{}'", name);
            hook(self.store.as_ref())
                .map_err(|e| SimError::InitFailed(format!("startup hook '{name}': {e}")))?;
        }
        Ok(())
    }

    fn restore_positions(&mut self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let state = match persistence.load(&self.ioc) {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(e) => {
                warn!("Ignoring state file: {}", e);
                return;
            }
        };

        for task in &mut self.tasks {
            let Some(position) = task.state_key().and_then(|key| state.position(key)) else {
                continue;
            };
            if let Err(e) = task.restore_position(self.store.as_ref(), position) {
                warn!("Failed to restore {}: {}", task.name(), e);
            } else {
                debug!("Restored {} to {}", task.name(), position);
            }
        }
    }

    fn save_positions(&self, tasks: &[Box<dyn SimTask>]) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let mut state = PersistedState::new(self.ioc.as_str());
        state.positions = tasks
            .iter()
            .filter_map(|task| {
                let key = task.state_key()?;
                let position = task.snapshot_position(self.store.as_ref())?;
                Some(PersistedPosition {
                    key: key.to_string(),
                    position,
                })
            })
            .collect();
        if let Err(e) = persistence.save(&state) {
            warn!("Failed to save state: {}", e);
        }
    }

    /// Run startup hooks, restore persisted positions and run every task
    /// until the running flag clears. Blocks until all task threads have
    /// exited.
    ///
    /// # Errors
    /// Returns `SimError::InitFailed` if a startup hook fails or a task
    /// thread cannot be spawned.
    pub fn run(&mut self) -> Result<Vec<TaskReport>, SimError> {
        self.run_startup_hooks()?;
        self.restore_positions();

        info!("Starting {} tasks for IOC '{}'", self.tasks.len(), self.ioc);

        let mut handles: Vec<(String, JoinHandle<(Box<dyn SimTask>, TaskReport)>)> = Vec::new();
        for task in self.tasks.drain(..) {
            let name = task.name().to_string();
            let store = Arc::clone(&self.store);
            let running = Arc::clone(&self.running);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_task(task, store, running))
                .map_err(|e| {
                    self.running.store(false, Ordering::SeqCst);
                    SimError::InitFailed(format!("failed to spawn task {name}: {e}"))
                });
            match handle {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    join_all(handles);
                    return Err(e);
                }
            }
        }

        let (finished, reports) = join_all(handles);
        self.save_positions(&finished);

        let halted = reports
            .iter()
            .filter(|r| r.exit != TaskExit::Stopped)
            .count();
        info!(
            "IOC '{}' stopped: {} tasks, {} halted",
            self.ioc,
            reports.len(),
            halted
        );
        Ok(reports)
    }

    /// Request shutdown of all task loops.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
    }
}

fn join_all(
    handles: Vec<(String, JoinHandle<(Box<dyn SimTask>, TaskReport)>)>,
) -> (Vec<Box<dyn SimTask>>, Vec<TaskReport>) {
    let mut tasks = Vec::with_capacity(handles.len());
    let mut reports = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        match handle.join() {
            Ok((task, report)) => {
                tasks.push(task);
                reports.push(report);
            }
            Err(_) => {
                error!("Task {} panicked", name);
                reports.push(TaskReport {
                    name,
                    stats: TimingStats::default(),
                    exit: TaskExit::Panicked,
                });
            }
        }
    }
    (tasks, reports)
}

/// Sleep for `duration`, waking early when the running flag clears.
fn sleep_while_running(duration: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= deadline || !running.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

fn run_task(
    mut task: Box<dyn SimTask>,
    store: Arc<dyn ValueStore>,
    running: Arc<AtomicBool>,
) -> (Box<dyn SimTask>, TaskReport) {
    let name = task.name().to_string();
    let period = task.period();
    let mut stats = TimingStats::default();

    let exit = match task.startup(store.as_ref()) {
        Err(e) => {
            error!("Task {} failed to start: {}", name, e);
            TaskExit::Halted(e.to_string())
        }
        Ok(()) => {
            debug!("Task {} running every {:?}", name, period);
            let mut exit = TaskExit::Stopped;
            while running.load(Ordering::SeqCst) {
                let tick_start = Instant::now();
                match task.tick(store.as_ref()) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        error!("Task {} halted: {}", name, e);
                        exit = TaskExit::Halted(e.to_string());
                        break;
                    }
                    Err(e) => warn!("Task {} tick failed: {}", name, e),
                }

                let elapsed = tick_start.elapsed();
                stats.record(&name, elapsed, period);
                if elapsed < period {
                    sleep_while_running(period - elapsed, &running);
                }
            }
            exit
        }
    };

    if let Err(e) = task.shutdown(store.as_ref()) {
        warn!("Task {} shutdown failed: {}", name, e);
    }
    debug!(
        "Task {} stopped after {} ticks (avg={}us, max={}us, violations={})",
        name,
        stats.tick_count,
        stats.average_tick_time_us(),
        stats.max_tick_time_us,
        stats.timing_violations
    );

    (task, TaskReport { name, stats, exit })
}
