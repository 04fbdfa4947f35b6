//! Download job model and lifecycle components.

pub mod events;
pub mod progress;
pub mod registry;
pub mod supervisor;

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub use events::{JobEvent, ProgressUpdate, StatusUpdate};
pub use registry::JobRegistry;
pub use supervisor::{Supervisor, SupervisorConfig};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::extractor::{self, MediaInfo, OutputKind};
use crate::utils::filename::sanitize_title;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Downloading,
    Paused,
    Finished,
    Failed,
    Stopped,
}

impl JobState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable parameters of a transfer request.
#[derive(Debug, Clone)]
pub struct JobParams {
    /// Source media URL.
    pub url: String,
    /// Requested encoding id; `None` means best available.
    pub format: Option<String>,
    /// Requested output kind.
    pub kind: OutputKind,
}

/// Handle to the currently live worker subprocess.
///
/// The waiter task owns the actual `Child`; cancelling the token requests
/// termination. The generation ties an exit event back to the spawn that
/// produced it so stale exits are recognizable.
struct Worker {
    cancel: CancellationToken,
    generation: u64,
}

/// The mutable half of a job, under a single lock so every transition is
/// observed together with the worker handle it concerns. Invariant: a
/// terminal state never has a live worker.
struct Lifecycle {
    state: JobState,
    worker: Option<Worker>,
}

/// How a worker exit was classified.
pub(crate) enum ExitDisposition {
    Finished,
    Failed,
    /// The exit belongs to a superseded spawn or the state already moved on.
    Stale,
}

/// One requested transfer, owned by the registry.
///
/// Everything except the lifecycle is fixed at creation: the argument list
/// and output path are computed once and reused verbatim on every respawn,
/// so pause/resume never re-derives anything.
pub struct Job {
    pub id: String,
    pub params: JobParams,
    /// Exact yt-dlp argument list used for every (re)spawn.
    pub worker_args: Vec<String>,
    /// Artifact location, namespaced by job id to avoid collisions.
    pub output_path: PathBuf,
    /// User-facing filename presented on completion.
    pub final_name: String,
    /// Cached metadata; control operations never re-invoke the extractor.
    pub metadata: MediaInfo,
    /// Creation time, reported in completion logs.
    pub created_at: DateTime<Utc>,
    lifecycle: Mutex<Lifecycle>,
    spawn_seq: AtomicU64,
    events: broadcast::Sender<JobEvent>,
}

impl Job {
    /// Create a job record from precomputed fields. No subprocess is spawned.
    pub fn new(
        params: JobParams,
        metadata: MediaInfo,
        output_path: PathBuf,
        final_name: String,
        worker_args: Vec<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(events::EVENT_CHANNEL_CAPACITY);
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            params,
            worker_args,
            output_path,
            final_name,
            metadata,
            created_at: Utc::now(),
            lifecycle: Mutex::new(Lifecycle {
                state: JobState::Created,
                worker: None,
            }),
            spawn_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Create a job for a download request, deriving the output path, the
    /// user-facing filename and the worker argument list from the request
    /// parameters and cached metadata.
    pub fn for_download(params: JobParams, metadata: MediaInfo, config: &ServerConfig) -> Self {
        let title = sanitize_title(metadata.title.as_deref().unwrap_or("video"));
        let ext = params.kind.extension();

        let quality_suffix = extractor::selected_height(&metadata, params.kind, params.format.as_deref())
            .map(|h| format!(" - {h}p"))
            .unwrap_or_default();
        let final_name = format!("{title}{quality_suffix}.{ext}");

        let mut job = Self::new(params, metadata, PathBuf::new(), final_name, Vec::new());
        job.output_path = config.temp_dir.join(format!("{}_{}.{}", job.id, title, ext));
        job.worker_args = build_worker_args(
            &job.params,
            &job.metadata,
            &job.output_path,
            config.existing_cookies_file().map(|p| p.as_path()),
        );
        job
    }

    pub fn state(&self) -> JobState {
        self.lifecycle.lock().state
    }

    pub fn has_live_worker(&self) -> bool {
        self.lifecycle.lock().worker.is_some()
    }

    /// Attach an observer. Delivery starts with events published after this
    /// call; the caller is expected to send [`Job::snapshot`] first.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// A status event reflecting the current state, sent to new observers.
    pub fn snapshot(&self) -> JobEvent {
        JobEvent::status(self.state())
    }

    pub(crate) fn publish(&self, event: JobEvent) {
        // Err means no observers are attached, which is fine.
        let _ = self.events.send(event);
    }

    /// Atomically register a worker and enter `downloading`, enforcing both
    /// the at-most-one-live-subprocess invariant and the `from` state
    /// precondition. Returns the spawn generation on success. The state is
    /// set here, before the subprocess exists, so a concurrent control
    /// command always sees a consistent state/worker pair.
    pub(crate) fn begin_worker(&self, cancel: CancellationToken, from: JobState) -> Result<u64> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.worker.is_some() {
            return Err(Error::WorkerAlreadyRunning(self.id.clone()));
        }
        if lifecycle.state != from {
            return Err(Error::invalid_transition(
                lifecycle.state.as_str(),
                JobState::Downloading.as_str(),
            ));
        }
        let generation = self.spawn_seq.fetch_add(1, Ordering::SeqCst) + 1;
        lifecycle.worker = Some(Worker { cancel, generation });
        lifecycle.state = JobState::Downloading;
        self.publish(JobEvent::status(JobState::Downloading));
        Ok(generation)
    }

    /// Roll back a registration whose spawn call failed. A no-op when a
    /// control command already took the worker in the meantime.
    pub(crate) fn abort_spawn(&self, generation: u64, error: String) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle
            .worker
            .as_ref()
            .is_some_and(|w| w.generation == generation)
        {
            lifecycle.worker = None;
            lifecycle.state = JobState::Failed;
            self.publish(JobEvent::failed_with_error(error));
        }
    }

    /// Pause by taking the live worker and cancelling it. Returns false (and
    /// changes nothing) when no worker is live.
    pub(crate) fn pause_worker(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.worker.take() {
            Some(worker) => {
                lifecycle.state = JobState::Paused;
                self.publish(JobEvent::status(JobState::Paused));
                worker.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop for good: enter `stopped` and cancel any live worker. Rejected
    /// once the job is terminal.
    pub(crate) fn stop_worker(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.is_terminal() {
            return Err(Error::invalid_transition(
                lifecycle.state.as_str(),
                JobState::Stopped.as_str(),
            ));
        }
        lifecycle.state = JobState::Stopped;
        self.publish(JobEvent::status(JobState::Stopped));
        if let Some(worker) = lifecycle.worker.take() {
            worker.cancel.cancel();
        }
        Ok(())
    }

    /// Mark the job failed on a fatal diagnostic line and reclaim the
    /// worker. yt-dlp usually exits right after printing one, but a hung
    /// process must not outlive the failure. Returns false outside
    /// `downloading`.
    pub(crate) fn fail_fatal(&self, line: String) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != JobState::Downloading {
            return false;
        }
        lifecycle.state = JobState::Failed;
        self.publish(JobEvent::failed_with_error(line));
        if let Some(worker) = lifecycle.worker.take() {
            worker.cancel.cancel();
        }
        true
    }

    /// Classify a worker exit. Clears the worker handle and publishes the
    /// terminal event in the same critical section, so a concurrent control
    /// command can never interleave between the check and the transition.
    pub(crate) fn settle_exit(
        &self,
        generation: u64,
        status: std::io::Result<ExitStatus>,
    ) -> ExitDisposition {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle
            .worker
            .as_ref()
            .is_some_and(|w| w.generation == generation)
        {
            return ExitDisposition::Stale;
        }
        lifecycle.worker = None;
        if lifecycle.state != JobState::Downloading {
            return ExitDisposition::Stale;
        }
        match status {
            Ok(s) if s.success() => {
                lifecycle.state = JobState::Finished;
                self.publish(JobEvent::finished(format!("/api/file/{}", self.id)));
                ExitDisposition::Finished
            }
            Ok(s) => {
                lifecycle.state = JobState::Failed;
                self.publish(JobEvent::failed_with_code(s.code()));
                ExitDisposition::Failed
            }
            Err(e) => {
                lifecycle.state = JobState::Failed;
                self.publish(JobEvent::failed_with_error(e.to_string()));
                ExitDisposition::Failed
            }
        }
    }
}

/// Build the yt-dlp argument list for a job. Stored verbatim on the job so
/// resume respawns with identical arguments and output path.
pub fn build_worker_args(
    params: &JobParams,
    metadata: &MediaInfo,
    output_path: &Path,
    cookies_file: Option<&Path>,
) -> Vec<String> {
    let selector = extractor::select_format(metadata, params.kind, params.format.as_deref());

    let mut args = vec![
        "-f".to_string(),
        selector,
        "-o".to_string(),
        output_path.to_string_lossy().into_owned(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
    ];

    match params.kind {
        OutputKind::Audio => {
            args.push("--extract-audio".to_string());
            args.push("--audio-format".to_string());
            args.push("mp3".to_string());
        }
        OutputKind::Video => {
            args.push("--merge-output-format".to_string());
            args.push("mp4".to_string());
        }
    }

    if let Some(cookies) = cookies_file {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().into_owned());
    }

    args.push("--force-ipv4".to_string());
    args.push(params.url.clone());
    args
}
