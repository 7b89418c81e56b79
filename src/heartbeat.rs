//! Periodic-job coordinator.
//!
//! Each watcher registers as a named job with its own interval. The
//! coordinator ticks on a short base interval, starts jobs whose interval
//! has elapsed, and enforces single-flight per job: a tick is skipped while
//! the previous run of the same job is still in progress. Actual work runs
//! in spawned tokio tasks gated by a semaphore.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

type JobRunFn =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

struct Job {
    name: String,
    interval: Duration,
    last_run: Option<Instant>,
    /// Guards against overlapping invocations of the same job.
    is_running: Arc<AtomicBool>,
    consecutive_failures: Arc<AtomicU32>,
    run: JobRunFn,
}

pub struct Heartbeat {
    jobs: Vec<Job>,
    semaphore: Arc<Semaphore>,
    tick_interval: Duration,
}

impl Heartbeat {
    pub fn new(tick_interval: Duration, max_concurrent: usize) -> Self {
        Self {
            jobs: Vec::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            tick_interval,
        }
    }

    /// Register a periodic job. The closure is called once per due tick and
    /// its future runs in a spawned task.
    pub fn register_job<F, Fut>(&mut self, name: &str, interval: Duration, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.jobs.push(Job {
            name: name.to_string(),
            interval,
            last_run: None,
            is_running: Arc::new(AtomicBool::new(false)),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            run: Box::new(move || Box::pin(f())),
        });
    }

    /// Consume self and run the tick loop in a spawned task. Jobs run on
    /// their first tick, then again whenever their interval elapses.
    pub fn start(mut self) {
        info!(jobs = self.jobs.len(), "heartbeat started");
        tokio::spawn(async move {
            loop {
                self.tick().await;
                tokio::time::sleep(self.tick_interval).await;
            }
        });
    }

    async fn tick(&mut self) {
        for job in &mut self.jobs {
            let due = job.last_run.map_or(true, |last| last.elapsed() >= job.interval);
            if !due {
                continue;
            }
            if job.is_running.swap(true, Ordering::SeqCst) {
                warn!(job = %job.name, "previous run still in progress, skipping tick");
                continue;
            }
            job.last_run = Some(Instant::now());

            let name = job.name.clone();
            let running = Arc::clone(&job.is_running);
            let failures = Arc::clone(&job.consecutive_failures);
            let semaphore = Arc::clone(&self.semaphore);
            let fut = (job.run)();
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                };
                match fut.await {
                    Ok(()) => {
                        failures.store(0, Ordering::SeqCst);
                    }
                    Err(e) => {
                        let n = failures.fetch_add(1, Ordering::SeqCst) + 1;
                        error!(job = %name, consecutive_failures = n, "job failed: {e:#}");
                    }
                }
                running.store(false, Ordering::SeqCst);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn overlapping_ticks_are_single_flight() {
        let mut heartbeat = Heartbeat::new(Duration::from_millis(5), 4);
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        heartbeat.register_job("slow", Duration::ZERO, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok(())
            }
        });

        heartbeat.tick().await;
        heartbeat.tick().await; // previous run still sleeping -> skipped
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        heartbeat.tick().await; // first run finished -> runs again
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn jobs_respect_their_own_interval() {
        let mut heartbeat = Heartbeat::new(Duration::from_millis(5), 4);
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        heartbeat.register_job("rare", Duration::from_secs(3600), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        heartbeat.tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        heartbeat.tick().await; // interval not elapsed -> not due
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_do_not_stop_later_runs() {
        let mut heartbeat = Heartbeat::new(Duration::from_millis(5), 4);
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        heartbeat.register_job("flaky", Duration::ZERO, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("transient")
            }
        });

        heartbeat.tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        heartbeat.tick().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
