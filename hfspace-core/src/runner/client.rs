//! The seam between [`SpaceRunner`](super::SpaceRunner) and the remote Space.
//!
//! A [`SpaceConnector`] plays the role of client construction: it resolves a
//! Space id to something callable. The resulting [`SpaceSession`] performs
//! the actual requests. The HTTP implementation lives in
//! [`gradio`](super::gradio).
//!
//! A call is split in two: [`SpaceSession::queue`] returns once the Space has
//! accepted the inputs, [`SpaceSession::follow`] waits for the outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ApiInfo, InputValue, RunnerResult};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpaceConnector: Send + Sync {
    async fn connect(&self, space_id: &str) -> RunnerResult<Arc<dyn SpaceSession>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpaceSession: Send + Sync {
    async fn api_info(&self) -> RunnerResult<ApiInfo>;

    /// Queues `api_name` with fully resolved positional inputs and returns
    /// the event id the Space assigned to the call.
    async fn queue(&self, api_name: &str, inputs: Vec<InputValue>) -> RunnerResult<String>;

    /// Waits for a queued call to finish and returns its output.
    async fn follow(&self, api_name: &str, event_id: &str) -> RunnerResult<Value>;
}
