use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, info};

use crate::consts::POLL_INTERVAL;
use crate::error::RemoteError;
use crate::remote::{GenerationJob, MediaBackend};

/// Rotates through a fixed list of progress strings, wrapping at the end.
pub struct ProgressTicker {
    messages: &'static [&'static str],
    index: usize,
}

impl ProgressTicker {
    pub fn new(messages: &'static [&'static str]) -> Self {
        Self { messages, index: 0 }
    }

    pub fn current(&self) -> &'static str {
        self.messages.get(self.index).copied().unwrap_or_default()
    }

    pub fn advance(&mut self) -> &'static str {
        self.index = (self.index + 1) % self.messages.len().max(1);
        self.current()
    }
}

/// Background task publishing the next progress message every period.
///
/// The first message is assumed to be shown already; the first tick lands
/// one period after spawning. The task is aborted on `stop` or drop.
pub struct ProgressTask {
    handle: JoinHandle<()>,
}

impl ProgressTask {
    pub fn spawn<F>(messages: &'static [&'static str], period: Duration, on_tick: F) -> Self
    where
        F: Fn(&'static str) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = ProgressTicker::new(messages);
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                on_tick(ticker.advance());
            }
        });

        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for ProgressTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Hands out job generations. Only the latest generation is current.
#[derive(Debug, Default)]
pub struct JobTracker {
    current: AtomicU64,
}

impl JobTracker {
    /// Starts a new generation, superseding every earlier token
    pub fn begin(self: &Arc<Self>) -> JobToken {
        let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        JobToken {
            tracker: Arc::clone(self),
            id,
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct JobToken {
    tracker: Arc<JobTracker>,
    id: u64,
}

impl JobToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.tracker.current() == self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The service reported `done`; the job may still carry a failure
    Complete(GenerationJob),
    Superseded,
}

pub struct JobPoller {
    backend: Arc<dyn MediaBackend>,
    interval: Duration,
}

impl JobPoller {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Re-fetches the job status until it reports completion.
    ///
    /// A status error ends the loop immediately. No retries, no backoff.
    pub async fn run(
        &self,
        mut job: GenerationJob,
        token: &JobToken,
    ) -> Result<PollOutcome, RemoteError> {
        let mut attempts = 0u32;

        while !job.done {
            sleep(self.interval).await;

            if !token.is_current() {
                info!(
                    "Job {} superseded by generation {}, no longer polling {}",
                    token.id(),
                    token.tracker.current(),
                    job.name
                );
                return Ok(PollOutcome::Superseded);
            }

            attempts += 1;
            debug!("Polling {} (attempt {})", job.name, attempts);
            job = self.backend.video_status(&job).await?;
        }

        info!("Job {} completed after {} status checks", job.name, attempts);
        Ok(PollOutcome::Complete(job))
    }
}
