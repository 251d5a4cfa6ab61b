//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock stage clients injected, enabling full pipeline runs through the
//! HTTP API without the real processing services.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use dubbing_core::testing::{MockLipSyncer, MockSynthesizer, MockTranscriber};
use dubbing_core::{
    ArtifactStore, Config, InMemoryJobStore, JobStore, OrchestratorConfig, PipelineOrchestrator,
    ProgressBroadcaster,
};
use dubbing_server::{create_router, AppState};

/// Re-export fixtures for test convenience
pub use dubbing_core::testing::fixtures;

const BOUNDARY: &str = "dubber-test-boundary";

/// Test fixture for E2E testing with mock dependencies.
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.upload("talk.mp4", b"video", Some("false")).await;
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub store: Arc<InMemoryJobStore>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub transcriber: MockTranscriber,
    pub synthesizer: MockSynthesizer,
    pub lipsyncer: MockLipSyncer,
    pub config: Config,
    /// Holds uploads, outputs and scratch space
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub bytes: Bytes,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}

/// One part of a multipart upload.
pub enum Part<'a> {
    File { filename: &'a str, content: &'a [u8] },
    Text { name: &'a str, value: &'a str },
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test fixture, adjusting the config before the server is built.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config {
            storage: fixtures::storage_config(temp_dir.path()),
            orchestrator: OrchestratorConfig {
                max_concurrent_jobs: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        adjust(&mut config);

        // Create mocks
        let transcriber = MockTranscriber::new();
        let synthesizer = MockSynthesizer::new();
        let lipsyncer = MockLipSyncer::new();
        let stages = fixtures::stage_clients(&transcriber, &synthesizer, &lipsyncer);

        let store = Arc::new(InMemoryJobStore::new());
        let job_store: Arc<dyn JobStore> = store.clone();
        let broadcaster = Arc::new(ProgressBroadcaster::new(
            Arc::clone(&job_store),
            config.orchestrator.progress_buffer,
        ));
        let artifacts = ArtifactStore::new(&config.storage);
        artifacts
            .ensure_dirs()
            .await
            .expect("Failed to create storage dirs");

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&job_store),
            stages.clone(),
            Arc::clone(&broadcaster),
            artifacts.clone(),
            None,
        ));
        orchestrator.start().await;

        let state = Arc::new(AppState::new(
            config.clone(),
            job_store,
            Arc::clone(&orchestrator),
            broadcaster,
            artifacts,
            stages,
        ));

        Self {
            router: create_router(state),
            store,
            orchestrator,
            transcriber,
            synthesizer,
            lipsyncer,
            config,
            temp_dir,
        }
    }

    /// Serve the router on an ephemeral port (for WebSocket tests).
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        addr
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Request::builder().method("GET").uri(path), Body::empty())
            .await
    }

    /// Send a GET request with one extra header.
    pub async fn get_with_header(&self, path: &str, name: &str, value: &str) -> TestResponse {
        self.send(
            Request::builder().method("GET").uri(path).header(name, value),
            Body::empty(),
        )
        .await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(Request::builder().method("DELETE").uri(path), Body::empty())
            .await
    }

    /// Upload a video through `POST /api/upload`.
    pub async fn upload(&self, filename: &str, content: &[u8], use_hd: Option<&str>) -> TestResponse {
        let mut parts = vec![Part::File { filename, content }];
        if let Some(value) = use_hd {
            parts.push(Part::Text {
                name: "use_hd",
                value,
            });
        }
        self.post_multipart("/api/upload", &parts).await
    }

    /// Send a multipart POST.
    pub async fn post_multipart(&self, path: &str, parts: &[Part<'_>]) -> TestResponse {
        let builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        self.send(builder, Body::from(multipart_body(parts))).await
    }

    /// Upload and return the new job id.
    pub async fn create_job(&self, filename: &str, use_hd: bool) -> String {
        let flag = if use_hd { "true" } else { "false" };
        let response = self
            .upload(filename, b"fake video bytes", Some(flag))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.body["job_id"]
            .as_str()
            .expect("job_id missing")
            .to_string()
    }

    /// Poll `GET /api/jobs/{id}` until the job is completed or failed.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Value {
        let path = format!("/api/jobs/{}", job_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let response = self.get(&path).await;
            let status = response.body["status"].as_str().unwrap_or_default();
            if status == "completed" || status == "failed" {
                return response.body;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} did not finish: {}",
                job_id,
                response.body
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn send(&self, builder: axum::http::request::Builder, body: Body) -> TestResponse {
        let request = builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            bytes,
        }
    }
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { filename, content } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                         Content-Type: video/mp4\r\n\r\n",
                        filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            $response.text()
        );
    };
}
