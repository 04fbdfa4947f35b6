//! In-memory job registry.

use std::sync::Arc;

use dashmap::DashMap;

use super::Job;

/// Concurrent map of live jobs keyed by id.
///
/// Jobs stay registered until stopped or purged after the retention window;
/// there is no persistence across restarts.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Arc<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Arc<Job>) {
        self.jobs.insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.remove(id).map(|(_, job)| job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::extractor::{MediaInfo, OutputKind};
    use crate::jobs::JobParams;

    fn sample_job() -> Arc<Job> {
        Arc::new(Job::new(
            JobParams {
                url: "https://example.com/v".to_string(),
                format: None,
                kind: OutputKind::Video,
            },
            MediaInfo::default(),
            PathBuf::from("/tmp/x.mp4"),
            "x.mp4".to_string(),
            vec![],
        ))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = JobRegistry::new();
        assert!(registry.is_empty());

        let job = sample_job();
        let id = job.id.clone();
        registry.insert(job);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id).is_some());
        assert!(registry.get("missing").is_none());

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(registry.is_empty());
    }
}
