//! # Space Runner
//!
//! Calls a Space's inference API, either synchronously
//! ([`SpaceRunner::run_space_predict`]) or as a background [`Job`]
//! ([`SpaceRunner::run_space_submit`]) that can be polled and awaited later.
//!
//! Each operation connects afresh through a [`SpaceConnector`]. Failures are
//! logged where they happen and returned as [`RunnerError`]; nothing is
//! retried.
//!
//! Submitted jobs are kept in a registry so callers can refer to them by the
//! id string printed at submission time. A job leaves the registry once its
//! final result has been handed out.

pub mod api_info;
pub mod client;
pub mod gradio;
pub mod job;
pub mod params;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{error, info};

pub use api_info::{ApiInfo, ApiParameter, ApiReturn, EndpointInfo};
pub use client::{SpaceConnector, SpaceSession};
pub use gradio::{GradioConnector, GradioSession};
pub use job::{Job, JobId, JobStatus};
pub use params::{CallArgs, InputValue};

use crate::hub::HubError;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Hub error: {0}")]
    Hub(#[from] HubError),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),
    #[error("Missing argument '{parameter}' for {api_name}")]
    MissingArgument { api_name: String, parameter: String },
    #[error("Unknown argument '{argument}' for {api_name}")]
    UnknownArgument { api_name: String, argument: String },
    #[error("Failed to upload {path}: {reason}")]
    Upload { path: PathBuf, reason: String },
    #[error("Space error: {0}")]
    Remote(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Invalid job handle: {0}")]
    InvalidJobHandle(String),
    #[error("Timed out after {0:?} waiting for job result")]
    Timeout(Duration),
    #[error("Job failed: {0}")]
    JobFailed(String),
}

pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

pub struct SpaceRunner {
    connector: Arc<dyn SpaceConnector>,
    jobs: DashMap<JobId, Job>,
}

impl SpaceRunner {
    pub fn new(connector: Arc<dyn SpaceConnector>) -> Self {
        Self {
            connector,
            jobs: DashMap::new(),
        }
    }

    async fn connect(&self, space_id: &str) -> RunnerResult<Arc<dyn SpaceSession>> {
        self.connector.connect(space_id).await.inspect_err(|e| {
            error!("Error initializing client for Space '{}': {}", space_id, e);
        })
    }

    /// Structured description of every endpoint the Space exposes.
    pub async fn get_space_api_details(&self, space_id: &str) -> RunnerResult<ApiInfo> {
        let session = self.connect(space_id).await?;
        session.api_info().await.inspect_err(|e| {
            error!("Error fetching API details for Space '{}': {}", space_id, e);
        })
    }

    pub async fn run_space_predict(
        &self,
        space_id: &str,
        api_name: &str,
        args: &CallArgs,
    ) -> RunnerResult<Value> {
        let session = self.connect(space_id).await?;
        let call = async {
            let inputs = prepare_inputs(session.as_ref(), api_name, args).await?;
            let event_id = session.queue(api_name, inputs).await?;
            session.follow(api_name, &event_id).await
        };
        call.await.inspect_err(|e| {
            error!(
                "Error during prediction for Space '{}', API '{}': {}",
                space_id, api_name, e
            );
        })
    }

    /// Queues the call on the Space and returns once it is accepted. The
    /// outcome is collected in the background.
    pub async fn run_space_submit(
        &self,
        space_id: &str,
        api_name: &str,
        args: &CallArgs,
    ) -> RunnerResult<Job> {
        let session = self.connect(space_id).await?;
        let queued = async {
            let inputs = prepare_inputs(session.as_ref(), api_name, args).await?;
            session.queue(api_name, inputs).await
        };
        let event_id = queued.await.inspect_err(|e| {
            error!(
                "Error submitting job to Space '{}', API '{}': {}",
                space_id, api_name, e
            );
        })?;

        let endpoint = api_name.to_string();
        let event = event_id.clone();
        let job = Job::spawn(space_id, api_name, &event_id, async move {
            session.follow(&endpoint, &event).await
        });
        info!("Submitted job {} to {} {}", job.id(), space_id, api_name);
        self.jobs.insert(job.id(), job.clone());
        Ok(job)
    }

    /// Looks up a job submitted through this runner.
    pub fn job(&self, handle: &str) -> RunnerResult<Job> {
        handle
            .parse::<JobId>()
            .ok()
            .and_then(|id| self.jobs.get(&id).map(|job| job.clone()))
            .ok_or_else(|| RunnerError::InvalidJobHandle(handle.to_string()))
            .inspect_err(|_| error!("Invalid job handle provided: '{}'", handle))
    }

    pub fn get_job_status(&self, handle: &str) -> RunnerResult<JobStatus> {
        Ok(self.job(handle)?.status())
    }

    pub async fn get_job_result(
        &self,
        handle: &str,
        timeout: Option<Duration>,
    ) -> RunnerResult<Value> {
        let job = self.job(handle)?;
        let result = job.result(timeout).await.inspect_err(|e| match e {
            RunnerError::Timeout(_) => error!("Timeout waiting for job {} result", handle),
            RunnerError::JobFailed(_) => {
                error!("Runtime error getting job {} result: {} (Job may have failed)", handle, e)
            }
            _ => error!("Error getting job {} result: {}", handle, e),
        });
        if job.status().is_finished() {
            self.jobs.remove(&job.id());
        }
        result
    }
}

async fn prepare_inputs(
    session: &dyn SpaceSession,
    api_name: &str,
    args: &CallArgs,
) -> RunnerResult<Vec<InputValue>> {
    if args.keyword.is_empty() {
        return Ok(args.positional.clone());
    }
    let info = session.api_info().await?;
    let endpoint = info
        .endpoint(api_name)
        .ok_or_else(|| RunnerError::UnknownEndpoint(api_name.to_string()))?;
    args.resolve(api_name, endpoint)
}
