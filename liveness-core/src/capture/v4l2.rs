//! Video4Linux camera source.
//!
//! A dedicated capture thread owns the device and its mmap stream,
//! dequeues buffers continuously and keeps the newest converted frame.
//! Snapshots copy that frame, so the session loop never blocks on the
//! driver. Acquisition resolves once the first frame has arrived.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream as _;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use crate::capture::convert::{jpeg_to_rgb, yuyv_to_rgb};
use crate::capture::types::{CaptureConstraints, Facing, RawFrame};
use crate::capture::{CaptureSource, CaptureStream};
use crate::error::LivenessError;

/// Default device node.
pub const DEFAULT_DEVICE: &str = "/dev/video0";

const BUFFER_COUNT: u32 = 4;

/// Upper bound on one dequeue, which also bounds `release`.
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Formats tried in order of preference.
const PREFERRED: [&[u8; 4]; 2] = [b"YUYV", b"MJPG"];

/// Capture source backed by a V4L2 device node.
#[derive(Debug, Clone)]
pub struct V4lSource {
    path: PathBuf,
}

impl Default for V4lSource {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

impl V4lSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CaptureSource for V4lSource {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, LivenessError> {
        if !constraints.is_valid() {
            return Err(LivenessError::Camera(format!(
                "unsupported capture size {}x{}",
                constraints.width, constraints.height
            )));
        }
        if constraints.facing != Facing::User {
            debug!(facing = ?constraints.facing, "facing is not selectable on v4l devices");
        }

        let shared = Arc::new(Shared::default());
        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = {
            let path = self.path.clone();
            let constraints = *constraints;
            let shared = shared.clone();
            thread::Builder::new()
                .name("v4l-capture".into())
                .spawn(move || capture_loop(&path, &constraints, &shared, ready_tx))?
        };

        match ready_rx.await {
            Ok(Ok(format)) => {
                info!(
                    device = %self.path.display(),
                    width = format.width,
                    height = format.height,
                    fourcc = %format.fourcc,
                    "camera acquired"
                );
                Ok(Box::new(V4lStream {
                    shared,
                    worker: Some(worker),
                    released: false,
                }))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LivenessError::Camera(format!(
                "{}: capture thread exited",
                self.path.display()
            ))),
        }
    }
}

// ── Capture thread ───────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    stop: AtomicBool,
}

#[derive(Default)]
struct Slot {
    latest: Option<RawFrame>,
    failure: Option<String>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }
}

type Ready = oneshot::Sender<Result<Format, LivenessError>>;

fn capture_loop(path: &Path, constraints: &CaptureConstraints, shared: &Shared, ready: Ready) {
    let (device, format) = match open_device(path, constraints) {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(camera_error(path, &e)));
            return;
        }
    };
    stream.set_timeout(FRAME_TIMEOUT);

    let mut ready = Some((ready, format.clone()));
    while !shared.stop.load(Ordering::Acquire) {
        let frame = stream
            .next()
            .map_err(|e| camera_error(path, &e))
            .and_then(|(buf, meta)| {
                let used = match meta.bytesused as usize {
                    0 => buf.len(),
                    n => n.min(buf.len()),
                };
                decode(&buf[..used], &format)
            });

        match frame {
            Ok(frame) => {
                shared.lock().latest = Some(frame);
                if let Some((tx, format)) = ready.take() {
                    // Acquisition was abandoned.
                    if tx.send(Ok(format)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                match ready.take() {
                    Some((tx, _)) => {
                        let _ = tx.send(Err(e));
                    }
                    None => {
                        warn!("camera capture stopped: {e}");
                        shared.lock().failure = Some(e.to_string());
                    }
                }
                return;
            }
        }
    }
    debug!(device = %path.display(), "capture thread stopped");
}

fn open_device(
    path: &Path,
    constraints: &CaptureConstraints,
) -> Result<(Device, Format), LivenessError> {
    let device = Device::with_path(path).map_err(|e| camera_error(path, &e))?;

    let mut actual = None;
    for fourcc in PREFERRED {
        let requested = Format::new(constraints.width, constraints.height, FourCC::new(fourcc));
        let format = device
            .set_format(&requested)
            .map_err(|e| camera_error(path, &e))?;
        if format.fourcc == requested.fourcc {
            actual = Some(format);
            break;
        }
    }
    let format = actual.ok_or_else(|| {
        LivenessError::Camera(format!("{}: no YUYV or MJPG capture format", path.display()))
    })?;

    if (format.width, format.height) != (constraints.width, constraints.height) {
        warn!(
            "Requested {}x{}, got {}x{}",
            constraints.width, constraints.height, format.width, format.height
        );
    }
    Ok((device, format))
}

fn decode(buf: &[u8], format: &Format) -> Result<RawFrame, LivenessError> {
    match &format.fourcc.repr {
        b"YUYV" => yuyv_to_rgb(buf, format.width, format.height, format.stride),
        b"MJPG" => jpeg_to_rgb(buf),
        other => Err(LivenessError::Camera(format!(
            "unsupported pixel format {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn camera_error(path: &Path, err: &io::Error) -> LivenessError {
    let detail = match err.kind() {
        io::ErrorKind::NotFound => "no such device".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        _ => err.to_string(),
    };
    LivenessError::Camera(format!("{}: {detail}", path.display()))
}

// ── Stream ───────────────────────────────────────────────────────

struct V4lStream {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    released: bool,
}

impl CaptureStream for V4lStream {
    fn snapshot(&mut self) -> Result<RawFrame, LivenessError> {
        if self.released {
            return Err(LivenessError::StreamReleased);
        }
        let slot = self.shared.lock();
        if let Some(failure) = &slot.failure {
            return Err(LivenessError::Camera(failure.clone()));
        }
        slot.latest
            .clone()
            .ok_or_else(|| LivenessError::Camera("no frame captured yet".into()))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.shared.stop.store(true, Ordering::Release);
        // The device closes when the thread drops it.
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("capture thread panicked");
            }
        }
        debug!("camera released");
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for V4lStream {
    fn drop(&mut self) {
        self.release();
    }
}
