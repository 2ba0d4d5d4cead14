use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::Runtime;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::SchedulerError;

pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Longest supported period; longer intervals are clamped to it
pub const MAX_INTERVAL: Duration = Duration::from_secs(u32::MAX as u64);

/// Unit of work run by the scheduler
pub trait Job: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Execute once
    fn run(&self) -> BoxFuture<'_, Result<(), JobError>>;
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker threads, and the maximum number of jobs running at once
    pub worker_threads: usize,
    /// Skip firings missed while a run was in progress
    pub coalesce: bool,
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 3,
            coalesce: true,
            thread_name: "alert-worker".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Shutdown,
}

struct IntervalJob {
    job: Arc<dyn Job>,
    every: Duration,
}

/// Interval job scheduler backed by its own tokio runtime.
///
/// The public API is synchronous and must be driven from outside any async
/// context; `shutdown(true)` blocks on the worker runtime.
pub struct Scheduler {
    config: SchedulerConfig,
    runtime: Option<Runtime>,
    jobs: Vec<IntervalJob>,
    tasks: Vec<JoinHandle<()>>,
    permits: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    state: SchedulerState,
}

impl Scheduler {
    /// Create an idle scheduler
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let worker_threads = config.worker_threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            runtime: Some(runtime),
            jobs: Vec::new(),
            tasks: Vec::new(),
            permits: Arc::new(Semaphore::new(worker_threads)),
            shutdown_tx,
            state: SchedulerState::Idle,
        })
    }

    /// Register a job firing every `every`, starting one period after the
    /// scheduler (or, when already running, the job) starts
    pub fn add_interval_job(
        &mut self,
        job: Arc<dyn Job>,
        every: Duration,
    ) -> Result<usize, SchedulerError> {
        if self.state == SchedulerState::Shutdown {
            return Err(SchedulerError::Shutdown);
        }
        if every.is_zero() {
            return Err(SchedulerError::InvalidInterval(job.name().to_string()));
        }

        let every = every.min(MAX_INTERVAL);
        let entry = IntervalJob { job, every };
        if self.state == SchedulerState::Running {
            let handle = self.spawn_interval(&entry)?;
            self.tasks.push(handle);
        }
        self.jobs.push(entry);

        tracing::debug!(
            job_count = self.jobs.len(),
            interval = ?every,
            "Interval job added"
        );

        Ok(self.jobs.len() - 1)
    }

    /// Fire a job once on the worker pool, outside any schedule
    pub fn run_once(&mut self, job: Arc<dyn Job>) -> Result<(), SchedulerError> {
        match self.state {
            SchedulerState::Running => {}
            SchedulerState::Idle => return Err(SchedulerError::NotRunning),
            SchedulerState::Shutdown => return Err(SchedulerError::Shutdown),
        }
        let runtime = self.runtime.as_ref().ok_or(SchedulerError::Shutdown)?;
        let permits = Arc::clone(&self.permits);

        let handle = runtime.spawn(async move {
            execute(&*job, &permits).await;
        });
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(handle);
        Ok(())
    }

    /// Start firing registered jobs; a no-op when already running
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        match self.state {
            SchedulerState::Running => return Ok(()),
            SchedulerState::Shutdown => return Err(SchedulerError::Shutdown),
            SchedulerState::Idle => {}
        }

        let mut handles = Vec::with_capacity(self.jobs.len());
        for entry in &self.jobs {
            handles.push(self.spawn_interval(entry)?);
        }
        self.tasks.extend(handles);
        self.state = SchedulerState::Running;

        tracing::info!(
            jobs = self.jobs.len(),
            workers = self.config.worker_threads,
            "Scheduler started"
        );
        Ok(())
    }

    /// Stop the scheduler. With `wait`, in-flight runs finish first; without
    /// it every job task is aborted. The scheduler cannot be restarted.
    pub fn shutdown(&mut self, wait: bool) {
        if self.state == SchedulerState::Shutdown {
            return;
        }
        self.state = SchedulerState::Shutdown;
        let _ = self.shutdown_tx.send(true);

        let tasks = std::mem::take(&mut self.tasks);
        if let Some(runtime) = self.runtime.take() {
            if wait {
                runtime.block_on(async {
                    for task in tasks {
                        let _ = task.await;
                    }
                });
            } else {
                for task in &tasks {
                    task.abort();
                }
            }
            runtime.shutdown_background();
        }
        self.permits.close();

        tracing::info!(jobs = self.jobs.len(), wait, "Scheduler shut down");
    }

    /// Number of registered interval jobs
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    fn spawn_interval(&self, entry: &IntervalJob) -> Result<JoinHandle<()>, SchedulerError> {
        let runtime = self.runtime.as_ref().ok_or(SchedulerError::Shutdown)?;
        let job = Arc::clone(&entry.job);
        let every = entry.every;
        let permits = Arc::clone(&self.permits);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let missed = if self.config.coalesce {
            MissedTickBehavior::Skip
        } else {
            MissedTickBehavior::Burst
        };

        Ok(runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(missed);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                execute(&*job, &permits).await;
            }
        }))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn execute(job: &dyn Job, permits: &Semaphore) {
    // Closed once the scheduler shuts down
    let Ok(_permit) = permits.acquire().await else {
        return;
    };

    if let Err(e) = job.run().await {
        tracing::error!(job = %job.name(), error = %e, "Job run failed");
    }
}
