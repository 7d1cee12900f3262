use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use serde::Serialize;

use crate::assembler::{BuildReport, CancelToken, PackAssembler, RunPhase};
use crate::errors::{PackError, PackResult};
use crate::logging::MemorySink;
use crate::template::TemplateKind;

pub mod v1;

/// Shared state behind the HTTP handlers.
pub struct AppState {
    pub assembler: Arc<PackAssembler>,
    jobs: Mutex<HashMap<String, Job>>,
}

impl AppState {
    pub fn new(assembler: Arc<PackAssembler>) -> Self {
        Self {
            assembler,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert_job(&self, id: String, job: Job) {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).insert(id, job);
    }

    pub(crate) fn with_job<T>(&self, id: &str, f: impl FnOnce(&Job) -> T) -> PackResult<T> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(id).map(f).ok_or_else(|| PackError::UnknownJob(id.to_string()))
    }
}

/// One background assembly started over HTTP.
pub(crate) struct Job {
    pub log: Arc<MemorySink>,
    pub cancel: CancelToken,
    pub outcome: Arc<Mutex<Option<JobOutcome>>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { report: BuildReport },
    Failed { error: String, error_type: String },
}

impl From<PackResult<BuildReport>> for JobOutcome {
    fn from(result: PackResult<BuildReport>) -> Self {
        match result {
            Ok(report) => JobOutcome::Succeeded { report },
            Err(e) => JobOutcome::Failed {
                error: e.to_string(),
                error_type: e.kind().to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobCreatedResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub phase: Option<RunPhase>,
    pub finished: bool,
    pub outcome: Option<JobOutcome>,
    pub log: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub kind: TemplateKind,
    pub slots: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}
