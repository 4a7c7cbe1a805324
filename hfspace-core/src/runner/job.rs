use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error};
use uuid::Uuid;

use super::{RunnerError, RunnerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(JobId)
            .map_err(|_| RunnerError::InvalidJobHandle(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone)]
enum JobState {
    Pending,
    Processing,
    Completed(Value),
    Failed(String),
}

impl JobState {
    fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Processing => JobStatus::Processing,
            JobState::Completed(_) => JobStatus::Completed,
            JobState::Failed(_) => JobStatus::Failed,
        }
    }

    fn is_terminal(&self) -> bool {
        self.status().is_finished()
    }
}

/// Handle to a call the Space has queued, followed in the background.
///
/// Cloning is cheap; every clone observes the same call. The handle never
/// owns the call itself: dropping all handles leaves it running to
/// completion within the current runtime.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    space_id: String,
    api_name: String,
    event_id: String,
    state: watch::Receiver<JobState>,
}

impl Job {
    pub(crate) fn spawn<F>(space_id: &str, api_name: &str, event_id: &str, call: F) -> Self
    where
        F: Future<Output = RunnerResult<Value>> + Send + 'static,
    {
        let id = JobId::new();
        let (tx, rx) = watch::channel(JobState::Pending);

        let span_space = space_id.to_string();
        let span_api = api_name.to_string();
        tokio::spawn(async move {
            let _ = tx.send(JobState::Processing);
            debug!("Job {} started for {} {}", id, span_space, span_api);
            let state = match call.await {
                Ok(value) => JobState::Completed(value),
                Err(e) => {
                    error!("Job {} for Space '{}' failed: {}", id, span_space, e);
                    JobState::Failed(e.to_string())
                }
            };
            let _ = tx.send(state);
        });

        Self {
            id,
            space_id: space_id.to_string(),
            api_name: api_name.to_string(),
            event_id: event_id.to_string(),
            state: rx,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    /// Event id the Space queued the call under.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn status(&self) -> JobStatus {
        self.state.borrow().status()
    }

    /// Waits for the call to finish, giving up after `timeout` when one is set.
    pub async fn result(&self, timeout: Option<Duration>) -> RunnerResult<Value> {
        let mut state = self.state.clone();
        let wait = async move {
            let finished = state
                .wait_for(JobState::is_terminal)
                .await
                .map_err(|_| RunnerError::JobFailed("job worker exited early".to_string()))?
                .clone();
            match finished {
                JobState::Completed(value) => Ok(value),
                JobState::Failed(message) => Err(RunnerError::JobFailed(message)),
                JobState::Pending | JobState::Processing => Err(RunnerError::JobFailed(
                    "job worker exited early".to_string(),
                )),
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| RunnerError::Timeout(limit))?,
            None => wait.await,
        }
    }
}
