//! Integration tests: full session lifecycles against an in-process
//! service, plus one run over a real WebSocket on localhost.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use futures::{SinkExt, StreamExt};
use liveness_core::render::{
    RESULT_VERIFIED, STATUS_BAD_MESSAGE, STATUS_CONNECTION_ERROR, STATUS_CONNECTION_LOST,
    STATUS_CONNECTION_TIMEOUT, STATUS_MOVE_NOW, STATUS_NO_FACE, STATUS_POSITION_FACE, SinkEvent,
};
use liveness_core::{
    CaptureConstraints, CaptureSource, CaptureStream, DotState, Highlight, LivenessError,
    MemoryConnector, RawFrame, RecordingSink, RemotePeer, SessionConfig, SessionController,
    SessionHooks, SessionOutcome, Severity, TestPatternSource, WsConnector,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

// ── Helpers ──────────────────────────────────────────────────────

/// How the fake camera behaves on acquire.
#[derive(Clone, Copy)]
enum CameraMode {
    Works,
    Refuses,
    Hangs,
}

/// Test-pattern camera that counts acquisitions and releases.
struct CountingCamera {
    mode: CameraMode,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl CountingCamera {
    fn new(mode: CameraMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            acquired: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for CountingCamera {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, LivenessError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            CameraMode::Works => {}
            CameraMode::Refuses => return Err(LivenessError::Camera("Permission denied".into())),
            CameraMode::Hangs => std::future::pending::<()>().await,
        }
        let inner = TestPatternSource::new().acquire(constraints).await?;
        Ok(Box::new(CountingStream {
            inner,
            released: self.released.clone(),
        }))
    }
}

struct CountingStream {
    inner: Box<dyn CaptureStream>,
    released: Arc<AtomicUsize>,
}

impl CaptureStream for CountingStream {
    fn snapshot(&mut self) -> Result<RawFrame, LivenessError> {
        self.inner.snapshot()
    }

    fn release(&mut self) {
        if !self.inner.is_released() {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.release();
    }

    fn is_released(&self) -> bool {
        self.inner.is_released()
    }
}

#[derive(Default)]
struct HookLog {
    successes: AtomicUsize,
    failures: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl HookLog {
    fn hooks(self: &Arc<Self>) -> SessionHooks {
        let ok = self.clone();
        let fail = self.clone();
        SessionHooks::new()
            .on_success(move || {
                ok.successes.fetch_add(1, Ordering::SeqCst);
            })
            .on_fail(move |reason, message| {
                fail.failures
                    .lock()
                    .unwrap()
                    .push((reason.map(String::from), message.map(String::from)));
            })
    }

    fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    fn failures(&self) -> Vec<(Option<String>, Option<String>)> {
        self.failures.lock().unwrap().clone()
    }
}

struct Rig {
    controller: SessionController,
    sink: Arc<RecordingSink>,
    camera: Arc<CountingCamera>,
    peers: UnboundedReceiver<RemotePeer>,
    hooks: Arc<HookLog>,
}

fn small_config() -> SessionConfig {
    SessionConfig {
        address: "memory://liveness".into(),
        constraints: CaptureConstraints {
            width: 32,
            height: 24,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn rig_with(config: SessionConfig, mode: CameraMode) -> Rig {
    let (connector, peers) = MemoryConnector::new();
    let sink = Arc::new(RecordingSink::new());
    let camera = CountingCamera::new(mode);
    let hooks = Arc::new(HookLog::default());
    let controller = SessionController::new(
        config,
        camera.clone(),
        Arc::new(connector),
        sink.clone(),
    )
    .unwrap()
    .with_hooks(hooks.hooks());
    Rig {
        controller,
        sink,
        camera,
        peers,
        hooks,
    }
}

fn rig() -> Rig {
    rig_with(small_config(), CameraMode::Works)
}

/// Let the session task catch up on everything already queued.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Accept the session channel, report it open and send `start`.
async fn connect_and_start(rig: &mut Rig) -> RemotePeer {
    let mut peer = rig.peers.recv().await.unwrap();
    peer.ready().await.unwrap();
    peer.send_text(r#"{"type":"start","success":0}"#).await.unwrap();
    assert!(peer.next_frame().await.is_some(), "start sends at once");
    peer
}

// ── Protocol scenarios ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_shows_positioning_and_sends_immediately() {
    let mut rig = rig();
    let _handle = rig.controller.start().unwrap();
    assert!(!rig.sink.snapshot().start_visible);

    let mut peer = rig.peers.recv().await.unwrap();
    peer.ready().await.unwrap();
    let sent_at = Instant::now();
    peer.send_text(r#"{"type":"start","success":0}"#).await.unwrap();
    let frame = peer.next_frame().await.unwrap();
    assert_eq!(Instant::now(), sent_at, "no delay before the first frame");

    let jpeg = BASE64.decode(&frame.frame).unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    let snap = rig.sink.snapshot();
    assert_eq!(snap.instruction, "Look at the camera");
    assert_eq!(snap.status, STATUS_POSITION_FACE);
    assert_eq!(
        snap.dots,
        vec![DotState::Current, DotState::Neutral, DotState::Neutral]
    );
}

#[tokio::test(start_paused = true)]
async fn waiting_highlights_and_paces_the_next_frame() {
    let mut rig = rig();
    let _handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;

    let sent_at = Instant::now();
    peer.send_text(
        r#"{"type":"waiting","instruction":"LEFT","state":"WAITING_ACTION","wrong_direction":false}"#,
    )
    .await
    .unwrap();
    settle().await;

    let snap = rig.sink.snapshot();
    assert_eq!(snap.instruction, "Turn head LEFT");
    assert_eq!(snap.highlight, Highlight::Active);
    assert_eq!(snap.status, "Move your head as shown");
    assert_eq!(snap.severity, Severity::Normal);

    assert!(peer.next_frame().await.is_some());
    assert!(sent_at.elapsed() >= Duration::from_millis(150));
}

#[tokio::test(start_paused = true)]
async fn wrong_direction_is_an_error_status() {
    let mut rig = rig();
    let _handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;

    peer.send_text(
        r#"{"type":"waiting","instruction":"RIGHT","state":"WAITING_ACTION","wrong_direction":"LEFT"}"#,
    )
    .await
    .unwrap();
    settle().await;

    let snap = rig.sink.snapshot();
    assert_eq!(snap.status, "Wrong direction! Turn head RIGHT");
    assert_eq!(snap.severity, Severity::Error);
    assert!(peer.next_frame().await.is_some(), "loop keeps going");
}

#[tokio::test(start_paused = true)]
async fn challenge_advances_the_dots() {
    let mut rig = rig();
    let _handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;

    peer.send_text(r#"{"type":"challenge","instruction":"UP","success":1}"#)
        .await
        .unwrap();
    settle().await;

    let snap = rig.sink.snapshot();
    assert_eq!(snap.instruction, "Look UP");
    assert_eq!(snap.status, STATUS_MOVE_NOW);
    assert_eq!(snap.highlight, Highlight::Active);
    assert_eq!(
        snap.dots,
        vec![DotState::Done, DotState::Current, DotState::Neutral]
    );
}

#[tokio::test(start_paused = true)]
async fn complete_verifies_and_tears_down_once() {
    let mut rig = rig();
    let handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;

    for passed in 1..=2 {
        peer.send_text(format!(r#"{{"type":"success","success":{passed}}}"#))
            .await
            .unwrap();
        assert!(peer.next_frame().await.is_some());
    }
    peer.send_text(r#"{"type":"complete","success":3}"#)
        .await
        .unwrap();

    assert_eq!(handle.outcome().await, SessionOutcome::Verified);
    assert!(!rig.controller.is_live());

    assert_eq!(peer.next_frame().await, None, "no frame after the verdict");
    assert!(peer.closed_by_client());
    assert_eq!(rig.camera.released(), 1);
    assert_eq!(rig.hooks.successes(), 1);
    assert!(rig.hooks.failures().is_empty());

    let snap = rig.sink.snapshot();
    assert_eq!(snap.terminal, Some((true, RESULT_VERIFIED.to_string())));
    assert_eq!(snap.dots, vec![DotState::Done; 3]);
    assert_eq!(rig.sink.terminal_count(), 1);

    rig.controller.stop().await;
    assert_eq!(rig.hooks.successes(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_reports_reason_and_message_once() {
    let mut rig = rig();
    let handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;

    peer.send_text(r#"{"type":"failed","reason":"timeout","message":"Session expired"}"#)
        .await
        .unwrap();

    assert_eq!(
        handle.outcome().await,
        SessionOutcome::Failed {
            reason: Some("timeout".into()),
            message: Some("Session expired".into()),
        }
    );
    assert_eq!(
        rig.hooks.failures(),
        vec![(Some("timeout".into()), Some("Session expired".into()))]
    );
    assert_eq!(rig.hooks.successes(), 0);

    let snap = rig.sink.snapshot();
    assert_eq!(snap.terminal, Some((false, "Session expired".to_string())));
    assert!(snap.start_visible);
    assert_eq!(rig.camera.released(), 1);
    assert_eq!(peer.next_frame().await, None);
}

// ── Loop discipline ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn no_frames_before_start() {
    let mut rig = rig();
    let _handle = rig.controller.start().unwrap();
    let mut peer = rig.peers.recv().await.unwrap();
    peer.ready().await.unwrap();

    peer.send_text(r#"{"type":"no_face"}"#).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(peer.drain_frames(), 0);
    assert_eq!(rig.sink.snapshot().status, STATUS_NO_FACE);

    peer.send_text(r#"{"type":"start"}"#).await.unwrap();
    assert!(peer.next_frame().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn back_to_back_replies_schedule_one_frame() {
    let mut rig = rig();
    let _handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;

    peer.send_text(r#"{"type":"challenge","instruction":"LEFT"}"#)
        .await
        .unwrap();
    peer.send_text(r#"{"type":"waiting","instruction":"LEFT","state":"WAITING_ACTION"}"#)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(peer.drain_frames(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_reply_keeps_the_loop_alive() {
    let mut rig = rig();
    let handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;

    peer.send_text("definitely not json").await.unwrap();
    settle().await;
    let snap = rig.sink.snapshot();
    assert_eq!(snap.status, STATUS_BAD_MESSAGE);
    assert_eq!(snap.severity, Severity::Error);

    assert!(peer.next_frame().await.is_some());
    peer.send_text(r#"{"type":"complete"}"#).await.unwrap();
    assert_eq!(handle.outcome().await, SessionOutcome::Verified);
}

#[tokio::test(start_paused = true)]
async fn service_error_message_keeps_the_loop_alive() {
    let mut rig = rig();
    let _handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;

    peer.send_text(r#"{"type":"error","message":"Decode failed"}"#)
        .await
        .unwrap();
    settle().await;
    assert_eq!(rig.sink.snapshot().status, "Decode failed");
    assert!(peer.next_frame().await.is_some());
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn start_while_live_is_rejected() {
    let mut rig = rig();
    let _handle = rig.controller.start().unwrap();
    assert!(rig.controller.is_live());
    assert!(matches!(
        rig.controller.start(),
        Err(LivenessError::SessionActive)
    ));
}

#[tokio::test(start_paused = true)]
async fn stop_tears_down_and_is_idempotent() {
    let mut rig = rig();
    let handle = rig.controller.start().unwrap();
    let mut peer = connect_and_start(&mut rig).await;
    peer.send_text(r#"{"type":"challenge","instruction":"DOWN"}"#)
        .await
        .unwrap();
    settle().await;

    rig.controller.stop().await;
    assert_eq!(handle.outcome().await, SessionOutcome::Cancelled);
    assert_eq!(rig.camera.released(), 1);

    // The scheduled frame never goes out.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(peer.next_frame().await, None);
    assert!(peer.closed_by_client());

    let snap = rig.sink.snapshot();
    assert!(snap.start_visible);
    assert!(snap.status.is_empty());
    assert!(snap.dots.iter().all(|d| *d == DotState::Neutral));
    assert_eq!(rig.hooks.successes(), 0);
    assert!(rig.hooks.failures().is_empty());

    rig.controller.stop().await;
    assert_eq!(rig.camera.released(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_starts_a_fresh_session() {
    let mut rig = rig();
    let first = rig.controller.start().unwrap();
    let _stale = connect_and_start(&mut rig).await;

    let second = rig.controller.retry().await.unwrap();
    assert_eq!(first.outcome().await, SessionOutcome::Cancelled);

    let mut peer = connect_and_start(&mut rig).await;
    peer.send_text(r#"{"type":"complete"}"#).await.unwrap();
    assert_eq!(second.outcome().await, SessionOutcome::Verified);

    assert_eq!(rig.camera.acquired(), 2);
    assert_eq!(rig.camera.released(), 2);
    assert_eq!(rig.hooks.successes(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_camera_prompt_opens_nothing() {
    let mut rig = rig_with(small_config(), CameraMode::Hangs);
    let handle = rig.controller.start().unwrap();
    settle().await;
    assert_eq!(rig.camera.acquired(), 1);

    rig.controller.stop().await;
    assert_eq!(handle.outcome().await, SessionOutcome::Cancelled);
    assert!(rig.peers.try_recv().is_err(), "no channel was opened");
}

#[tokio::test(start_paused = true)]
async fn refused_camera_surfaces_an_error() {
    let mut rig = rig_with(small_config(), CameraMode::Refuses);
    let handle = rig.controller.start().unwrap();

    assert_eq!(
        handle.outcome().await,
        SessionOutcome::CameraUnavailable {
            detail: "Permission denied".into()
        }
    );
    let snap = rig.sink.snapshot();
    assert_eq!(snap.status, "Camera error: Permission denied");
    assert_eq!(snap.severity, Severity::Error);
    assert!(snap.start_visible);
    assert!(rig.peers.try_recv().is_err());
    assert_eq!(rig.hooks.successes() + rig.hooks.failures().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_service_releases_the_camera() {
    let mut rig = rig();
    rig.peers.close();

    let handle = rig.controller.start().unwrap();
    assert!(matches!(
        handle.outcome().await,
        SessionOutcome::ConnectionLost { .. }
    ));
    assert_eq!(rig.camera.released(), 1);
    assert_eq!(rig.sink.snapshot().status, STATUS_CONNECTION_ERROR);
}

// ── Connection loss ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn service_close_without_verdict_is_connection_lost() {
    let mut rig = rig();
    let handle = rig.controller.start().unwrap();
    let peer = connect_and_start(&mut rig).await;

    peer.close("1001 going away").await.unwrap();
    assert_eq!(
        handle.outcome().await,
        SessionOutcome::ConnectionLost {
            detail: "1001 going away".into()
        }
    );

    let snap = rig.sink.snapshot();
    assert_eq!(snap.status, STATUS_CONNECTION_LOST);
    assert_eq!(snap.terminal, None);
    assert!(snap.start_visible);
    assert_eq!(rig.camera.released(), 1);
    assert_eq!(rig.hooks.successes() + rig.hooks.failures().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_connection_lost() {
    let mut rig = rig();
    let handle = rig.controller.start().unwrap();
    let peer = connect_and_start(&mut rig).await;

    peer.fail("connection reset").await.unwrap();
    assert!(matches!(
        handle.outcome().await,
        SessionOutcome::ConnectionLost { .. }
    ));
    assert_eq!(rig.sink.snapshot().status, STATUS_CONNECTION_ERROR);
}

#[tokio::test(start_paused = true)]
async fn silent_service_times_out() {
    let config = SessionConfig {
        idle_timeout: Some(Duration::from_secs(2)),
        ..small_config()
    };
    let mut rig = rig_with(config, CameraMode::Works);
    let handle = rig.controller.start().unwrap();
    let _peer = connect_and_start(&mut rig).await;
    let quiet_since = Instant::now();

    assert!(matches!(
        handle.outcome().await,
        SessionOutcome::ConnectionLost { .. }
    ));
    assert!(quiet_since.elapsed() >= Duration::from_secs(2));
    assert_eq!(rig.sink.snapshot().status, STATUS_CONNECTION_TIMEOUT);
    assert_eq!(rig.camera.released(), 1);
}

// ── WebSocket ────────────────────────────────────────────────────

#[tokio::test]
async fn verifies_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let replies = [
            r#"{"type":"challenge","instruction":"LEFT","state":"WAITING_ACTION","success":0,"total":2}"#,
            r#"{"type":"success","success":1,"total":2}"#,
            r#"{"type":"complete","success":2,"total":2}"#,
        ];

        ws.send(Message::Text(r#"{"type":"start","success":0}"#.into()))
            .await
            .unwrap();
        let mut frames = 0;
        for reply in replies {
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("expected a frame");
            };
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            let jpeg = BASE64.decode(value["frame"].as_str().unwrap()).unwrap();
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
            frames += 1;
            ws.send(Message::Text(reply.into())).await.unwrap();
        }

        // The client closes after the verdict.
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
            assert!(!msg.is_text(), "frame after verdict");
        }
        frames
    });

    let sink = Arc::new(RecordingSink::new());
    let config = SessionConfig {
        address: format!("ws://{addr}/ws"),
        frame_interval: Duration::from_millis(20),
        ..small_config()
    };
    let mut controller = SessionController::new(
        config,
        Arc::new(TestPatternSource::new()),
        Arc::new(WsConnector::new()),
        sink.clone(),
    )
    .unwrap();

    let handle = controller.start().unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), handle.outcome())
        .await
        .expect("session timed out");
    assert_eq!(outcome, SessionOutcome::Verified);

    let frames = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server timed out")
        .unwrap();
    assert_eq!(frames, 3);

    let snap = sink.snapshot();
    assert_eq!(snap.dots, vec![DotState::Done; 2]);
    assert_eq!(snap.terminal, Some((true, RESULT_VERIFIED.to_string())));
}

#[tokio::test]
async fn garbled_binary_reply_keeps_the_session_alive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(r#"{"type":"start","success":0}"#.into()))
            .await
            .unwrap();

        let replies = [
            Message::Binary(vec![0xff, 0xfe, 0xfd]),
            Message::Text(r#"{"type":"complete","success":3,"total":3}"#.into()),
        ];
        let mut frames = 0;
        for reply in replies {
            let Some(Ok(Message::Text(_))) = ws.next().await else {
                panic!("expected a frame");
            };
            frames += 1;
            ws.send(reply).await.unwrap();
        }
        frames
    });

    let sink = Arc::new(RecordingSink::new());
    let config = SessionConfig {
        address: format!("ws://{addr}/ws"),
        frame_interval: Duration::from_millis(20),
        ..small_config()
    };
    let mut controller = SessionController::new(
        config,
        Arc::new(TestPatternSource::new()),
        Arc::new(WsConnector::new()),
        sink.clone(),
    )
    .unwrap();

    let handle = controller.start().unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), handle.outcome())
        .await
        .expect("session stalled on the garbled reply");
    assert_eq!(outcome, SessionOutcome::Verified);

    let frames = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server timed out")
        .unwrap();
    assert_eq!(frames, 2);
    assert!(sink.events().iter().any(|e| matches!(
        e,
        SinkEvent::Status(text, Severity::Error) if text == STATUS_BAD_MESSAGE
    )));
}
