// Commands that talk to the Hub or a Space, served by a mock server.

use assert_cmd::Command;
use mockito::Matcher;
use predicates::prelude::*;
use tempfile::TempDir;

fn hfspace_base_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hfspace").unwrap();
    cmd.env_remove("HF_TOKEN")
        .env_remove("HF_ENDPOINT")
        .arg("--credentials-dir")
        .arg(dir.path().join("creds"))
        .arg("--data-dir")
        .arg(dir.path());
    cmd
}

fn hfspace_cmd(dir: &TempDir, hub_url: &str) -> Command {
    let mut cmd = hfspace_base_cmd(dir);
    cmd.arg("--hub-url").arg(hub_url);
    cmd
}

#[tokio::test]
async fn test_search_command() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/spaces")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("search".into(), "image generation".into()),
            Matcher::UrlEncoded("sort".into(), "likes".into()),
            Matcher::UrlEncoded("direction".into(), "-1".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id": "stability/sdxl", "author": "stability", "likes": 900, "sdk": "gradio"},
                {"id": "someone/tiny-diffusion", "likes": 4}
            ]"#,
        )
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    hfspace_cmd(&dir, &server.url())
        .args(["search", "image generation", "--limit", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stability/sdxl"))
        .stdout(predicate::str::contains("someone/tiny-diffusion"));
}

#[tokio::test]
async fn test_search_uses_hub_url_from_config_file() {
    let mut server = mockito::Server::new_async().await;
    let listing = server
        .mock("GET", "/api/spaces")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"id": "configured/space", "likes": 1}]"#)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("client.json");
    std::fs::write(
        &config_path,
        serde_json::json!({"hub_url": server.url()}).to_string(),
    )
    .unwrap();

    hfspace_base_cmd(&dir)
        .arg("--config")
        .arg(&config_path)
        .args(["search", "anything"])
        .assert()
        .success()
        .stdout(predicate::str::contains("configured/space"));
    listing.assert_async().await;
}

#[tokio::test]
async fn test_search_hub_error_exits_nonzero() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/spaces")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    hfspace_cmd(&dir, &server.url())
        .args(["search", "anything"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error: "));
}

async fn mock_space(server: &mut mockito::ServerGuard) -> Vec<mockito::Mock> {
    vec![
        server
            .mock("GET", "/config")
            .with_status(200)
            .with_body(r#"{"version": "5.1.0", "api_prefix": "/gradio_api"}"#)
            .create_async()
            .await,
        server
            .mock("POST", "/gradio_api/call/predict")
            .match_body(Matcher::Json(serde_json::json!({"data": ["Hello"]})))
            .with_status(200)
            .with_body(r#"{"event_id": "evt-42"}"#)
            .create_async()
            .await,
        server
            .mock("GET", "/gradio_api/call/predict/evt-42")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: generating\ndata: null\n\nevent: complete\ndata: [\"Hello back\"]\n\n")
            .create_async()
            .await,
    ]
}

#[tokio::test]
async fn test_run_predict_saves_result() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = mock_space(&mut server).await;
    let space_url = server.url();

    let dir = TempDir::new().unwrap();
    hfspace_cmd(&dir, &server.url())
        .args([
            "run",
            "predict",
            space_url.as_str(),
            "/predict",
            "--params",
            "Hello",
            "--task-desc",
            "greeting",
            "--output-type-for-db",
            "text",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello back"))
        .stderr(predicate::str::contains("Result saved with ID: 1"));

    hfspace_cmd(&dir, &server.url())
        .args(["results", "view", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("greeting"))
        .stdout(predicate::str::contains("Hello back"))
        .stdout(predicate::str::contains("\"arg0\": \"Hello\""));
}

#[tokio::test]
async fn test_run_submit_and_wait() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = mock_space(&mut server).await;
    let space_url = server.url();

    let dir = TempDir::new().unwrap();
    hfspace_cmd(&dir, &server.url())
        .args([
            "run",
            "submit",
            space_url.as_str(),
            "predict",
            "--params",
            "Hello",
            "--wait",
            "--timeout",
            "30",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello back"))
        .stderr(predicate::str::contains("submitted to"));
}

#[tokio::test]
async fn test_run_submit_without_wait_queues_the_call() {
    let mut server = mockito::Server::new_async().await;
    let mocks = mock_space(&mut server).await;
    let space_url = server.url();

    let dir = TempDir::new().unwrap();
    hfspace_cmd(&dir, &server.url())
        .args([
            "run",
            "submit",
            space_url.as_str(),
            "predict",
            "--params",
            "Hello",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("evt-42"))
        .stderr(predicate::str::contains("as event evt-42"));

    // The Space received the inputs before the command exited.
    mocks[1].assert_async().await;
}

#[tokio::test]
async fn test_run_submit_unknown_endpoint_fails() {
    let mut server = mockito::Server::new_async().await;
    let _config = server
        .mock("GET", "/config")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let _call = server
        .mock("POST", "/call/missing")
        .with_status(404)
        .with_body("Not Found")
        .create_async()
        .await;
    let space_url = server.url();

    let dir = TempDir::new().unwrap();
    hfspace_cmd(&dir, &server.url())
        .args(["run", "submit", space_url.as_str(), "missing"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unknown endpoint: /missing"));
}

#[tokio::test]
async fn test_run_info_renders_endpoints() {
    let mut server = mockito::Server::new_async().await;
    let _config = server
        .mock("GET", "/config")
        .with_status(200)
        .with_body(r#"{"version": "4.44.0"}"#)
        .create_async()
        .await;
    let _info = server
        .mock("GET", "/info")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{
                "named_endpoints": {
                    "/predict": {
                        "parameters": [
                            {"label": "Text", "parameter_name": "text", "parameter_has_default": false,
                             "python_type": {"type": "str", "description": ""}, "component": "Textbox"}
                        ],
                        "returns": [
                            {"label": "Output", "python_type": {"type": "str", "description": ""}, "component": "Textbox"}
                        ]
                    }
                },
                "unnamed_endpoints": {}
            }"#,
        )
        .create_async()
        .await;
    let space_url = server.url();

    let dir = TempDir::new().unwrap();
    hfspace_cmd(&dir, &server.url())
        .args(["run", "info", space_url.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Named API endpoints: 1"))
        .stdout(predicate::str::contains("predict(text, api_name=\"/predict\")"));
}

#[tokio::test]
async fn test_run_predict_unreachable_space_fails() {
    let mut server = mockito::Server::new_async().await;
    let _host = server
        .mock("GET", "/api/spaces/nobody/nothing/host")
        .with_status(404)
        .with_body(r#"{"error": "Repository not found"}"#)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    hfspace_cmd(&dir, &server.url())
        .args(["run", "predict", "nobody/nothing", "/predict", "--params", "x"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error: "));
}
