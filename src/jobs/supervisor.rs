//! Worker subprocess supervision.
//!
//! The supervisor owns the policy side of the job lifecycle: when a worker
//! is spawned or killed and what happens around a transition, while [`Job`]
//! enforces the transitions themselves atomically against the worker
//! handle. Each spawned worker gets two background tasks, a diagnostic
//! reader that turns yt-dlp's stderr into progress events and an exit
//! waiter that owns the `Child` and races completion against cancellation.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::jobs::progress;
use crate::jobs::{ExitDisposition, Job, JobEvent, JobRegistry, JobState};
use crate::utils::process;

/// Supervisor settings, derived from the server configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path or name of the yt-dlp binary.
    pub binary_path: String,
    /// How long finished artifacts stay available before being purged.
    pub retention: Duration,
}

impl From<&ServerConfig> for SupervisorConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            binary_path: config.ytdlp_path.clone(),
            retention: config.retention,
        }
    }
}

/// Drives job state transitions and supervises worker subprocesses.
pub struct Supervisor {
    config: SupervisorConfig,
    registry: Arc<JobRegistry>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, registry: Arc<JobRegistry>) -> Self {
        Self { config, registry }
    }

    /// Start the initial worker for a freshly created job.
    pub async fn start(&self, job: &Arc<Job>) -> Result<()> {
        self.spawn_worker(job, JobState::Created)
    }

    /// Pause a job by taking and killing its worker. The transition and the
    /// handle removal happen together, so the exit waiter sees the pause and
    /// treats the resulting exit as expected. Pausing a job with no live
    /// worker is a no-op; partial artifact data on disk is kept for resume.
    pub async fn pause(&self, job: &Arc<Job>) -> Result<()> {
        if job.pause_worker() {
            info!(job_id = %job.id, "pausing download");
        } else {
            debug!(job_id = %job.id, "pause requested with no live worker, ignoring");
        }
        Ok(())
    }

    /// Resume a paused job by respawning a worker with the original argument
    /// list. yt-dlp continues from the partial file on disk.
    pub async fn resume(&self, job: &Arc<Job>) -> Result<()> {
        info!(job_id = %job.id, "resuming download");
        self.spawn_worker(job, JobState::Paused)
    }

    /// Stop a job for good: kill any worker, delete the partial artifact and
    /// drop the job from the registry. Rejected once the job is terminal.
    pub async fn stop(&self, job: &Arc<Job>) -> Result<()> {
        job.stop_worker()?;
        info!(job_id = %job.id, "stopping download");

        if let Err(e) = tokio::fs::remove_file(&job.output_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(job_id = %job.id, path = %job.output_path.display(), error = %e, "failed to remove artifact");
        }
        self.registry.remove(&job.id);
        Ok(())
    }

    /// Spawn a worker subprocess for the job and wire up its supervision
    /// tasks. The job enters `downloading` with a registered worker handle
    /// before the subprocess exists, so concurrent control commands always
    /// observe a consistent state/worker pair; a failed spawn rolls the job
    /// to `failed`.
    fn spawn_worker(&self, job: &Arc<Job>, from: JobState) -> Result<()> {
        let cancel = CancellationToken::new();
        let generation = job.begin_worker(cancel.clone(), from)?;

        let mut child = match process::command(&self.config.binary_path)
            .args(&job.worker_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to spawn {}: {e}", self.config.binary_path);
                job.abort_spawn(generation, message.clone());
                return Err(Error::Spawn(message));
            }
        };

        info!(job_id = %job.id, pid = ?child.id(), generation, "worker spawned");

        if let Some(stderr) = child.stderr.take() {
            let reader_job = job.clone();
            tokio::spawn(async move {
                read_diagnostics(reader_job, stderr).await;
            });
        }

        let waiter_job = job.clone();
        let registry = self.registry.clone();
        let retention = self.config.retention;
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = cancel.cancelled() => {
                    // Deliberate kill for pause, stop or a fatal line. The
                    // transition already happened, nothing to classify.
                    if let Err(e) = child.kill().await {
                        warn!(job_id = %waiter_job.id, error = %e, "failed to kill worker");
                    }
                    let _ = child.wait().await;
                    debug!(job_id = %waiter_job.id, generation, "worker killed on request");
                    return;
                }
            };

            match waiter_job.settle_exit(generation, status) {
                ExitDisposition::Finished => {
                    let elapsed_secs = (Utc::now() - waiter_job.created_at).num_seconds();
                    info!(job_id = %waiter_job.id, elapsed_secs, "download finished");
                    schedule_purge(registry, waiter_job, retention);
                }
                ExitDisposition::Failed => {
                    warn!(job_id = %waiter_job.id, "worker exited with failure");
                }
                ExitDisposition::Stale => {
                    debug!(job_id = %waiter_job.id, generation, "stale worker exit, ignoring");
                }
            }
        });

        Ok(())
    }
}

/// Read the worker's diagnostic stream line by line, publishing progress
/// events and flagging fatal lines. A fatal line marks the job failed and
/// kills the worker; yt-dlp usually exits on its own after printing one,
/// but a process that lingers must not survive its own failure.
async fn read_diagnostics(job: Arc<Job>, stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(parsed) = progress::parse_line(&line) else {
            continue;
        };
        if let Some(fields) = parsed.progress
            && job.state() == JobState::Downloading
        {
            job.publish(JobEvent::progress(fields));
        }
        if let Some(fatal) = parsed.fatal
            && job.fail_fatal(fatal.clone())
        {
            warn!(job_id = %job.id, line = %fatal, "worker reported a fatal error");
        }
    }
}

/// Keep a finished artifact around for the retention window, then delete it
/// and drop the job.
fn schedule_purge(registry: Arc<JobRegistry>, job: Arc<Job>, retention: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(retention).await;
        if let Err(e) = tokio::fs::remove_file(&job.output_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(job_id = %job.id, path = %job.output_path.display(), error = %e, "failed to purge artifact");
        }
        registry.remove(&job.id);
        debug!(job_id = %job.id, "retention window elapsed, job purged");
    });
}
