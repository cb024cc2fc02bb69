use std::sync::Arc;
use std::time::Duration;

use effectgen::{
    ChannelObserver, MediaFile, Phase, Pipeline, PipelineConfig, PipelineError, PipelineEvent,
};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> PipelineConfig {
    PipelineConfig {
        api_base_url: server.uri(),
        content_base_url: "https://contents.example.com".into(),
        user_id: "u1".into(),
        poll_interval_ms: 10,
        max_poll_attempts: 10,
        ..PipelineConfig::default()
    }
}

fn photo() -> MediaFile {
    MediaFile::new("face.png", "image/png", b"\x89PNG".to_vec())
}

fn drain(rx: &mut UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

async fn mount_upload(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/get-emd-upload-url"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}/bucket/put?sig=s", server.uri())))
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/bucket/put"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/video-gen"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": "j1" })))
        .expect(1)
        .mount(server)
        .await;
}

/// Mounts `statuses` so each is served once, in order; the last one repeats.
async fn mount_statuses(server: &MockServer, statuses: Vec<serde_json::Value>) {
    let last = statuses.len().saturating_sub(1);
    for (i, body) in statuses.into_iter().enumerate() {
        let mock = Mock::given(method("GET"))
            .and(path("/video-gen/u1/j1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .with_priority(i as u8 + 1);
        let mock = if i < last { mock.up_to_n_times(1) } else { mock };
        mock.mount(server).await;
    }
}

#[tokio::test]
async fn full_run_reaches_complete() {
    let server = MockServer::start().await;
    mount_upload(&server).await;
    mount_submit(&server).await;
    mount_statuses(
        &server,
        vec![
            json!({ "status": "queued" }),
            json!({ "status": "processing" }),
            json!({ "status": "completed", "result": [{ "mediaUrl": "https://x/y.mp4" }] }),
        ],
    )
    .await;

    let (obs, mut rx) = ChannelObserver::new();
    let mut pipeline = Pipeline::new(config(&server), Arc::new(obs)).unwrap();

    let url = pipeline.run(&photo()).await.unwrap();

    assert_eq!(url, "https://x/y.mp4");
    let state = pipeline.state();
    assert_eq!(state.phase, Phase::Complete);
    assert_eq!(state.job_id.as_deref(), Some("j1"));
    assert_eq!(state.result_url.as_deref(), Some("https://x/y.mp4"));
    assert!(state
        .uploaded_url
        .as_deref()
        .unwrap()
        .starts_with("https://contents.example.com/"));

    let events = drain(&mut rx);
    let phases: Vec<Phase> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::PhaseChanged { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            Phase::Uploading,
            Phase::Ready,
            Phase::Submitting,
            Phase::Polling,
            Phase::Complete
        ]
    );
    let progress = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Progress { .. }))
        .count();
    assert_eq!(progress, 2);
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::Result {
            url: "https://x/y.mp4".into()
        })
    );
}

#[tokio::test]
async fn failed_job_moves_to_error() {
    let server = MockServer::start().await;
    mount_upload(&server).await;
    mount_submit(&server).await;
    mount_statuses(
        &server,
        vec![json!({ "status": "failed", "error": "no face detected" })],
    )
    .await;

    let (obs, mut rx) = ChannelObserver::new();
    let mut pipeline = Pipeline::new(config(&server), Arc::new(obs)).unwrap();

    let err = pipeline.run(&photo()).await.unwrap_err();

    assert!(matches!(err, PipelineError::JobFailed(_)));
    assert_eq!(pipeline.state().phase, Phase::Error);
    assert!(pipeline.state().result_url.is_none());
    assert!(pipeline.state().uploaded_url.is_some());
    assert!(drain(&mut rx).contains(&PipelineEvent::Error {
        message: "no face detected".into()
    }));
}

#[tokio::test]
async fn completed_without_media_url() {
    let server = MockServer::start().await;
    mount_upload(&server).await;
    mount_submit(&server).await;
    mount_statuses(&server, vec![json!({ "status": "completed", "result": {} })]).await;

    let mut pipeline =
        Pipeline::new(config(&server), Arc::new(effectgen::NoopObserver)).unwrap();

    let err = pipeline.run(&photo()).await.unwrap_err();
    assert!(matches!(err, PipelineError::MissingMediaUrl));
    assert_eq!(pipeline.state().phase, Phase::Error);
}

#[tokio::test]
async fn cancel_while_polling() {
    let server = Arc::new(MockServer::start().await);
    mount_upload(&server).await;
    mount_submit(&server).await;
    mount_statuses(&server, vec![json!({ "status": "queued" })]).await;

    let cfg = PipelineConfig {
        poll_interval_ms: 60_000,
        ..config(&server)
    };
    let mut pipeline = Pipeline::new(cfg, Arc::new(effectgen::NoopObserver)).unwrap();
    let cancel = pipeline.cancel_handle();
    let watcher = Arc::clone(&server);
    tokio::spawn(async move {
        // Cancel once the first status query has landed, i.e. during the poll delay.
        loop {
            let polled = watcher
                .received_requests()
                .await
                .unwrap_or_default()
                .iter()
                .any(|r| r.url.path().ends_with("/status"));
            if polled {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = pipeline.run(&photo()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    let status_queries = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/status"))
        .count();
    assert_eq!(status_queries, 1);
}

#[tokio::test]
async fn upload_failure_leaves_no_uploaded_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-emd-upload-url"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut pipeline =
        Pipeline::new(config(&server), Arc::new(effectgen::NoopObserver)).unwrap();

    let err = pipeline.run(&photo()).await.unwrap_err();
    assert!(matches!(err, PipelineError::SignedUrlFailure(_)));
    assert_eq!(pipeline.state().phase, Phase::Error);
    assert!(pipeline.state().uploaded_url.is_none());
}

#[tokio::test]
async fn download_after_run_saves_result() {
    let server = MockServer::start().await;
    mount_upload(&server).await;
    mount_submit(&server).await;
    let result_url = format!("{}/media/y.mp4", server.uri());
    mount_statuses(
        &server,
        vec![json!({ "status": "completed", "result": { "video": result_url } })],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/download-proxy"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(b"video".to_vec()),
        )
        .mount(&server)
        .await;

    let mut pipeline =
        Pipeline::new(config(&server), Arc::new(effectgen::NoopObserver)).unwrap();
    pipeline.run(&photo()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let report = pipeline.download(dir.path()).await.unwrap();

    assert_eq!(report.strategy, "proxy");
    assert!(report.file_name.starts_with("halloween_effect_"));
    assert!(report.file_name.ends_with(".mp4"));
    assert_eq!(pipeline.state().phase, Phase::Complete);
}
