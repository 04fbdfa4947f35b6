//! Job event types broadcast to observers.
//!
//! Events are ephemeral: published once to the job's broadcast channel and
//! never stored. The JSON shapes are the wire contract of the event stream.

use serde::Serialize;

use super::JobState;
use crate::jobs::progress::ProgressFields;

/// Capacity of each job's broadcast channel. Slow observers that fall more
/// than this far behind skip ahead to the newest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// An event on a job's channel: either a progress sample or a state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobEvent {
    Progress(ProgressUpdate),
    Status(StatusUpdate),
}

/// Structured progress parsed from the worker's diagnostic output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    pub status: JobState,
}

/// A state-change notification, optionally carrying failure diagnostics or
/// the download URL of a finished artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(rename = "downloadUrl", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl JobEvent {
    /// A plain state-change event.
    pub fn status(status: JobState) -> Self {
        Self::Status(StatusUpdate {
            status,
            error: None,
            code: None,
            download_url: None,
        })
    }

    /// A `finished` event pointing at the artifact endpoint.
    pub fn finished(download_url: String) -> Self {
        Self::Status(StatusUpdate {
            status: JobState::Finished,
            error: None,
            code: None,
            download_url: Some(download_url),
        })
    }

    /// A `failed` event triggered by diagnostic output.
    pub fn failed_with_error(error: String) -> Self {
        Self::Status(StatusUpdate {
            status: JobState::Failed,
            error: Some(error),
            code: None,
            download_url: None,
        })
    }

    /// A `failed` event triggered by a worker exit code.
    pub fn failed_with_code(code: Option<i32>) -> Self {
        Self::Status(StatusUpdate {
            status: JobState::Failed,
            error: None,
            code,
            download_url: None,
        })
    }

    /// A progress event; progress is only ever emitted while downloading.
    pub fn progress(fields: ProgressFields) -> Self {
        Self::Progress(ProgressUpdate {
            percent: fields.percent,
            total: fields.total,
            speed: fields.speed,
            eta: fields.eta,
            status: JobState::Downloading,
        })
    }

    /// Whether this event closes the stream for observers.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Progress(_) => false,
            Self::Status(s) => s.status.is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_wire_shape() {
        let event = JobEvent::progress(ProgressFields {
            percent: Some(42.0),
            total: Some("10.00MiB".to_string()),
            speed: Some("1.20MiB/s".to_string()),
            eta: Some("00:05".to_string()),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "percent": 42.0,
                "total": "10.00MiB",
                "speed": "1.20MiB/s",
                "eta": "00:05",
                "status": "downloading"
            })
        );
    }

    #[test]
    fn test_partial_progress_omits_missing_fields() {
        let event = JobEvent::progress(ProgressFields {
            percent: Some(3.5),
            ..Default::default()
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"percent": 3.5, "status": "downloading"}));
    }

    #[test]
    fn test_finished_event_wire_shape() {
        let event = JobEvent::finished("/api/file/abc".to_string());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "finished", "downloadUrl": "/api/file/abc"})
        );
        assert!(event.is_terminal());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(JobEvent::status(JobState::Stopped).is_terminal());
        assert!(JobEvent::failed_with_code(Some(1)).is_terminal());
        assert!(!JobEvent::status(JobState::Paused).is_terminal());
        assert!(!JobEvent::progress(ProgressFields::default()).is_terminal());
    }
}
