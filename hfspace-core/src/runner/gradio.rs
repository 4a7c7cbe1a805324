//! Gradio HTTP protocol.
//!
//! A call is a two-step exchange: `POST {prefix}/call/{endpoint}` queues the
//! inputs and answers with an event id, then `GET {prefix}/call/{endpoint}/{id}`
//! streams server-sent events until a `complete` or `error` event arrives.
//! Newer Gradio versions serve everything under an `api_prefix` announced in
//! `/config`.
//!
//! Every request except the result stream is bounded by the configured
//! request timeout. The stream lasts as long as the Space needs.

use std::path::Path;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, StatusCode, multipart};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, trace};

use super::{
    ApiInfo, InputValue, RunnerError, RunnerResult, SpaceConnector, SpaceSession,
    api_info::normalize_api_name,
};
use crate::hub::HubClient;

#[derive(Debug, Default, Deserialize)]
struct SpaceConfig {
    #[serde(default)]
    api_prefix: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueuedCall {
    event_id: String,
}

/// Connects to Spaces through the Hub, or directly when given a URL.
#[derive(Clone)]
pub struct GradioConnector {
    hub: HubClient,
    client: Client,
}

impl GradioConnector {
    pub fn new(hub: HubClient, client: Client) -> Self {
        Self { hub, client }
    }

    async fn resolve_host(&self, space_id: &str) -> RunnerResult<String> {
        if space_id.starts_with("http://") || space_id.starts_with("https://") {
            return Ok(space_id.trim_end_matches('/').to_string());
        }
        Ok(self.hub.space_host(space_id).await?)
    }
}

#[async_trait]
impl SpaceConnector for GradioConnector {
    #[instrument(skip(self))]
    async fn connect(&self, space_id: &str) -> RunnerResult<Arc<dyn SpaceSession>> {
        let host = self.resolve_host(space_id).await?;
        let token = self.hub.token().cloned();
        let request_timeout = self.hub.request_timeout();

        let request = authorize(self.client.get(format!("{}/config", host)), token.as_ref())
            .timeout(request_timeout);
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RunnerError::Connection(format!(
                "Space '{}' answered {} for /config",
                space_id,
                response.status()
            )));
        }
        let config: SpaceConfig = response.json().await.map_err(|e| {
            RunnerError::Connection(format!("Space '{}' sent an invalid config: {}", space_id, e))
        })?;

        let api_prefix = normalize_prefix(config.api_prefix.as_deref().unwrap_or_default());
        debug!(
            "Connected to {} (gradio {}, prefix '{}')",
            host,
            config.version.as_deref().unwrap_or("unknown"),
            api_prefix
        );

        Ok(Arc::new(GradioSession {
            client: self.client.clone(),
            host,
            api_prefix,
            token,
            request_timeout,
        }))
    }
}

pub struct GradioSession {
    client: Client,
    host: String,
    api_prefix: String,
    token: Option<SecretString>,
    request_timeout: Duration,
}

impl GradioSession {
    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.host, self.api_prefix, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.stream(path).timeout(self.request_timeout)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        authorize(self.client.post(self.url(path)), self.token.as_ref())
            .timeout(self.request_timeout)
    }

    /// GET without a deadline, for responses that stay open until the call ends.
    fn stream(&self, path: &str) -> RequestBuilder {
        authorize(self.client.get(self.url(path)), self.token.as_ref())
    }

    async fn upload(&self, path: &Path) -> RunnerResult<Value> {
        let upload_err = |reason: String| RunnerError::Upload {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let form = multipart::Form::new().part(
            "files",
            multipart::Part::bytes(bytes).file_name(file_name.clone()),
        );
        let response = self.post("/upload").multipart(form).send().await?;
        let response = check_status(response, "/upload").await?;
        let paths: Vec<String> = response
            .json()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let server_path = paths
            .into_iter()
            .next()
            .ok_or_else(|| upload_err("server returned no path".to_string()))?;

        Ok(json!({
            "path": server_path,
            "orig_name": file_name,
            "meta": {"_type": "gradio.FileData"},
        }))
    }

    async fn encode_inputs(&self, inputs: Vec<InputValue>) -> RunnerResult<Vec<Value>> {
        let mut data = Vec::with_capacity(inputs.len());
        for input in inputs {
            match input {
                InputValue::Json(value) => data.push(value),
                InputValue::File(path) => data.push(self.upload(&path).await?),
            }
        }
        Ok(data)
    }
}

#[async_trait]
impl SpaceSession for GradioSession {
    #[instrument(skip(self), fields(host = %self.host))]
    async fn api_info(&self) -> RunnerResult<ApiInfo> {
        let response = self
            .get("/info")
            .query(&[("all_endpoints", "true")])
            .send()
            .await?;
        let response = check_status(response, "/info").await?;
        Ok(response.json::<ApiInfo>().await?)
    }

    #[instrument(skip(self, inputs), fields(host = %self.host))]
    async fn queue(&self, api_name: &str, inputs: Vec<InputValue>) -> RunnerResult<String> {
        let endpoint = normalize_api_name(api_name);
        let data = self.encode_inputs(inputs).await?;

        let response = self
            .post(&format!("/call{}", endpoint))
            .json(&json!({ "data": data }))
            .send()
            .await?;
        let queued: QueuedCall = check_status(response, &endpoint).await?.json().await?;
        debug!("Queued {} as event {}", endpoint, queued.event_id);
        Ok(queued.event_id)
    }

    #[instrument(skip(self), fields(host = %self.host))]
    async fn follow(&self, api_name: &str, event_id: &str) -> RunnerResult<Value> {
        let endpoint = normalize_api_name(api_name);
        let response = self
            .stream(&format!("/call{}/{}", endpoint, event_id))
            .send()
            .await?;
        let response = check_status(response, &endpoint).await?;
        read_event_stream(response.bytes_stream()).await
    }
}

fn authorize(request: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token.expose_secret()),
        None => request,
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Passes successful responses through. A 404 names the endpoint that was asked for.
async fn check_status(
    response: reqwest::Response,
    endpoint: &str,
) -> RunnerResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        debug!("{} not found: {}", endpoint, body);
        return Err(RunnerError::UnknownEndpoint(endpoint.to_string()));
    }
    Err(RunnerError::Api { status, body })
}

/// Reads server-sent events until the call's terminal event.
pub(crate) async fn read_event_stream<S, B, E>(stream: S) -> RunnerResult<Value>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<RunnerError> + std::fmt::Display,
{
    let mut events = pin!(stream.eventsource());

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| match e {
            EventStreamError::Transport(e) => e.into(),
            other => RunnerError::Protocol(format!("malformed event stream: {}", other)),
        })?;
        match event.event.as_str() {
            "complete" => {
                let outputs: Value = serde_json::from_str(&event.data).map_err(|e| {
                    RunnerError::Protocol(format!("invalid completion payload: {}", e))
                })?;
                return Ok(unwrap_outputs(outputs));
            }
            "error" => return Err(RunnerError::Remote(error_message(event.data.trim()))),
            other => trace!("Skipping '{}' event", other),
        }
    }

    Err(RunnerError::Protocol(
        "event stream ended before the call completed".to_string(),
    ))
}

fn error_message(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::String(message)) => message,
        Ok(Value::Null) => "the Space reported an error without details".to_string(),
        _ if data.is_empty() => "the Space reported an error without details".to_string(),
        _ => data.to_string(),
    }
}

fn unwrap_outputs(outputs: Value) -> Value {
    match outputs {
        Value::Array(mut values) if values.len() == 1 => values.remove(0),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Instant;
    use tempfile::TempDir;

    fn connector(url: &str) -> GradioConnector {
        connector_with_config(ClientConfig::default().with_hub_url(url))
    }

    fn connector_with_config(config: ClientConfig) -> GradioConnector {
        let client = config.http_client().unwrap();
        GradioConnector::new(HubClient::new(client.clone(), &config, None), client)
    }

    async fn read_chunks(chunks: Vec<&'static str>) -> RunnerResult<Value> {
        read_event_stream(futures::stream::iter(
            chunks.into_iter().map(Ok::<_, reqwest::Error>),
        ))
        .await
    }

    #[tokio::test]
    async fn test_event_stream_complete() {
        let body = "event: heartbeat\ndata: null\n\nevent: generating\ndata: [\"partial\"]\n\nevent: complete\ndata: [\"Bonjour\"]\n\n";
        assert_eq!(read_chunks(vec![body]).await.unwrap(), json!("Bonjour"));

        let body = "event: complete\r\ndata: [1, {\"a\": 2}]\r\n\r\n";
        assert_eq!(read_chunks(vec![body]).await.unwrap(), json!([1, {"a": 2}]));
    }

    #[tokio::test]
    async fn test_event_stream_split_across_chunks() {
        let chunks = vec!["event: gener", "ating\ndata: null\n\nevent: comp", "lete\ndata: [\"ok\"", "]\n\n"];
        assert_eq!(read_chunks(chunks).await.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn test_event_stream_joins_data_lines() {
        let body = "event: complete\ndata: [\"first\",\ndata: \"second\"]\n\n";
        assert_eq!(
            read_chunks(vec![body]).await.unwrap(),
            json!(["first", "second"])
        );
    }

    #[tokio::test]
    async fn test_event_stream_stops_at_terminal_event() {
        let body = "event: complete\ndata: [\"done\"]\n\nevent: error\ndata: \"late\"\n\n";
        assert_eq!(read_chunks(vec![body]).await.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn test_event_stream_error() {
        let err = read_chunks(vec!["event: error\ndata: \"CUDA out of memory\"\n\n"])
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Remote(ref m) if m == "CUDA out of memory"));

        let err = read_chunks(vec!["event: error\ndata: null\n\n"])
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Remote(ref m) if m.contains("without details")));
    }

    #[tokio::test]
    async fn test_event_stream_truncated() {
        let err = read_chunks(vec!["event: heartbeat\ndata: null\n\n"])
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Protocol(_)));
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/gradio_api"), "/gradio_api");
        assert_eq!(normalize_prefix("gradio_api/"), "/gradio_api");
    }

    #[tokio::test]
    async fn test_connect_and_predict_through_hub() {
        let mut server = mockito::Server::new_async().await;
        let host = server.url();

        let _host = server
            .mock("GET", "/api/spaces/org/translator/host")
            .with_status(200)
            .with_body(json!({"subdomain": "org-translator", "host": host}).to_string())
            .create_async()
            .await;
        let _config = server
            .mock("GET", "/config")
            .with_status(200)
            .with_body(r#"{"version": "5.1.0", "api_prefix": "/gradio_api"}"#)
            .create_async()
            .await;
        let call = server
            .mock("POST", "/gradio_api/call/translate")
            .match_body(Matcher::Json(json!({"data": ["Hello", "fr"]})))
            .with_status(200)
            .with_body(r#"{"event_id": "evt-1"}"#)
            .create_async()
            .await;
        let _stream = server
            .mock("GET", "/gradio_api/call/translate/evt-1")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: complete\ndata: [\"Bonjour\"]\n\n")
            .create_async()
            .await;

        let session = connector(&server.url())
            .connect("org/translator")
            .await
            .unwrap();
        let event_id = session
            .queue(
                "/translate",
                vec![InputValue::Json(json!("Hello")), InputValue::Json(json!("fr"))],
            )
            .await
            .unwrap();
        assert_eq!(event_id, "evt-1");
        call.assert_async().await;

        let result = session.follow("translate", &event_id).await.unwrap();
        assert_eq!(result, json!("Bonjour"));
    }

    #[tokio::test]
    async fn test_result_stream_outlasts_request_timeout() {
        let mut server = mockito::Server::new_async().await;
        let _config = server
            .mock("GET", "/config")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _stream = server
            .mock("GET", "/call/slow/e")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_chunked_body(|w| {
                w.write_all(b"event: heartbeat\ndata: null\n\n")?;
                w.flush()?;
                std::thread::sleep(Duration::from_millis(1500));
                w.write_all(b"event: complete\ndata: [\"finally\"]\n\n")
            })
            .create_async()
            .await;

        let mut config = ClientConfig::default();
        config.request_timeout = Duration::from_millis(500);
        let session = connector_with_config(config)
            .connect(&server.url())
            .await
            .unwrap();

        let started = Instant::now();
        let result = session.follow("/slow", "e").await.unwrap();
        assert_eq!(result, json!("finally"));
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_bounded_requests_honor_request_timeout() {
        let mut server = mockito::Server::new_async().await;
        let _config = server
            .mock("GET", "/config")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _info = server
            .mock("GET", "/info")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(1500));
                w.write_all(b"{}")
            })
            .create_async()
            .await;

        let mut config = ClientConfig::default();
        config.request_timeout = Duration::from_millis(300);
        let session = connector_with_config(config)
            .connect(&server.url())
            .await
            .unwrap();

        let err = session.api_info().await.unwrap_err();
        assert!(matches!(err, RunnerError::Http(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_named() {
        let mut server = mockito::Server::new_async().await;
        let _config = server
            .mock("GET", "/config")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _call = server
            .mock("POST", "/call/nope")
            .with_status(404)
            .with_body(r#"{"detail": "Not Found"}"#)
            .create_async()
            .await;

        let session = connector("http://unused.invalid")
            .connect(&server.url())
            .await
            .unwrap();
        let err = session.queue("nope", Vec::new()).await.unwrap_err();
        assert!(matches!(err, RunnerError::UnknownEndpoint(ref e) if e == "/nope"));
    }

    #[tokio::test]
    async fn test_connect_by_url_and_fetch_info() {
        let mut server = mockito::Server::new_async().await;
        let _config = server
            .mock("GET", "/config")
            .with_status(200)
            .with_body(r#"{"version": "4.44.0"}"#)
            .create_async()
            .await;
        let _info = server
            .mock("GET", "/info")
            .match_query(Matcher::UrlEncoded("all_endpoints".into(), "true".into()))
            .with_status(200)
            .with_body(
                json!({
                    "named_endpoints": {"/predict": {"parameters": [], "returns": []}},
                    "unnamed_endpoints": {}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let session = connector("http://unused.invalid")
            .connect(&server.url())
            .await
            .unwrap();
        let info = session.api_info().await.unwrap();
        assert!(info.endpoint("/predict").is_some());
    }

    #[tokio::test]
    async fn test_connect_unknown_space_fails() {
        let mut server = mockito::Server::new_async().await;
        let _host = server
            .mock("GET", "/api/spaces/nobody/nothing/host")
            .with_status(404)
            .with_body(r#"{"error": "Repository not found"}"#)
            .create_async()
            .await;

        let err = connector(&server.url())
            .connect("nobody/nothing")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RunnerError::Hub(_)));
    }

    #[tokio::test]
    async fn test_file_inputs_are_uploaded() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("cat.png");
        std::fs::write(&image, b"not really a png").unwrap();

        let mut server = mockito::Server::new_async().await;
        let _config = server
            .mock("GET", "/config")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/upload")
            .with_status(200)
            .with_body(r#"["/tmp/gradio/abc/cat.png"]"#)
            .create_async()
            .await;
        let call = server
            .mock("POST", "/call/caption")
            .match_body(Matcher::Json(json!({
                "data": [{
                    "path": "/tmp/gradio/abc/cat.png",
                    "orig_name": "cat.png",
                    "meta": {"_type": "gradio.FileData"}
                }]
            })))
            .with_status(200)
            .with_body(r#"{"event_id": "e2"}"#)
            .create_async()
            .await;
        let _stream = server
            .mock("GET", "/call/caption/e2")
            .with_status(200)
            .with_body("event: complete\ndata: [\"a cat\", 0.9]\n\n")
            .create_async()
            .await;

        let session = connector("http://unused.invalid")
            .connect(&server.url())
            .await
            .unwrap();
        let event_id = session
            .queue("caption", vec![InputValue::File(image)])
            .await
            .unwrap();
        let result = session.follow("caption", &event_id).await.unwrap();

        upload.assert_async().await;
        call.assert_async().await;
        assert_eq!(result, json!(["a cat", 0.9]));
    }
}
