//! Badge scanning.
//!
//! The camera and the symbology decoder are adapters: [`CameraDevice`] hands
//! out a [`FrameSource`] per scan session, and a [`BarcodeDecoder`] looks at
//! one frame at a time. [`Scanner::start`] runs the capture loop in a task and
//! returns the [`ScanHandle`] that owns it.

mod wedge;

pub use wedge::{shared_lines, stdin_lines, SharedLines, SymbologyDecoder, WedgeCamera};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ScannerConfig;
use crate::error::{Error, Result};

/// One captured image (or, for keyboard-wedge devices, one input line)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Take the device for one scan session
    async fn acquire(&self) -> Result<Box<dyn FrameSource>>;
}

#[async_trait]
pub trait FrameSource: Send {
    /// `Ok(None)` when the feed has ended
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Give the device back. Called exactly once per acquisition.
    fn release(&mut self);
}

pub trait BarcodeDecoder: Send + Sync {
    /// `None` is a failed attempt on this frame, not an error
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Holds an acquired camera and releases it exactly once, on whichever exit
/// path comes first
struct CameraLease {
    source: Option<Box<dyn FrameSource>>,
}

impl CameraLease {
    fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.source.as_mut() {
            Some(source) => source.next_frame().await,
            None => Err(Error::Camera("camera already released".to_string())),
        }
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            tracing::debug!("Camera released");
        }
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Decoded(String),
    Cancelled,
    /// The device stopped delivering frames
    Ended,
}

pub struct Scanner {
    device: Arc<dyn CameraDevice>,
    decoder: Arc<dyn BarcodeDecoder>,
    frame_interval: Option<Duration>,
}

impl Scanner {
    pub fn new(
        device: Arc<dyn CameraDevice>,
        decoder: Arc<dyn BarcodeDecoder>,
        config: &ScannerConfig,
    ) -> Self {
        // fps 0 disables throttling
        let frame_interval = (config.fps > 0).then(|| Duration::from_secs(1) / config.fps);
        Self {
            device,
            decoder,
            frame_interval,
        }
    }

    /// Spawn the capture loop. Must be called within a tokio runtime.
    pub fn start(&self) -> ScanHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(capture_loop(
            self.device.clone(),
            self.decoder.clone(),
            self.frame_interval,
            cancel.clone(),
        ));

        ScanHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// The one live scan session. Dropping it cancels the loop.
pub struct ScanHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<ScanOutcome>>>,
}

impl ScanHandle {
    /// Wait for the loop to finish. Yields the outcome once.
    ///
    /// The task stays owned by the handle until it completes, so dropping
    /// this future early leaves `close()` able to join it.
    pub async fn outcome(&mut self) -> Result<ScanOutcome> {
        let task = self
            .task
            .as_mut()
            .ok_or(Error::InvalidState("the scan has already finished"))?;
        let outcome = join(task).await;
        self.task = None;
        outcome
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Cancel and wait for the loop, so the camera is released on return
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(mut task) = self.task.take() {
            if let Err(e) = join(&mut task).await {
                tracing::debug!("Scan ended with error while closing: {}", e);
            }
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn join(task: &mut JoinHandle<Result<ScanOutcome>>) -> Result<ScanOutcome> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(ScanOutcome::Cancelled),
        Err(e) => Err(Error::Camera(format!("scan task failed: {}", e))),
    }
}

async fn capture_loop(
    device: Arc<dyn CameraDevice>,
    decoder: Arc<dyn BarcodeDecoder>,
    frame_interval: Option<Duration>,
    cancel: CancellationToken,
) -> Result<ScanOutcome> {
    let source = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(ScanOutcome::Cancelled),
        source = device.acquire() => source?,
    };
    let mut lease = CameraLease::new(source);
    tracing::debug!("Camera acquired, scanning");

    let mut throttle: Option<Interval> = frame_interval.map(|period| {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick
    });
    let mut attempts: u64 = 0;

    let outcome = loop {
        if let Some(tick) = throttle.as_mut() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(ScanOutcome::Cancelled),
                _ = tick.tick() => {}
            }
        }

        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(ScanOutcome::Cancelled),
            frame = lease.next_frame() => frame,
        };

        match frame {
            Ok(Some(frame)) => {
                attempts += 1;
                match decoder.decode(&frame) {
                    Some(code) => {
                        tracing::info!(attempts, "Barcode decoded");
                        break Ok(ScanOutcome::Decoded(code));
                    }
                    None => tracing::trace!(attempts, "No barcode in frame"),
                }
            }
            Ok(None) => {
                tracing::debug!(attempts, "Camera feed ended");
                break Ok(ScanOutcome::Ended);
            }
            Err(e) => {
                tracing::warn!("Camera read failed: {}", e);
                break Err(e);
            }
        }
    };

    lease.release();
    outcome
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted camera for tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Plays back a fixed list of frames. When the script runs out the feed
    /// either ends or stalls forever.
    pub struct FakeCamera {
        script: Mutex<VecDeque<Frame>>,
        stall_when_empty: bool,
        fail_acquire: bool,
        acquired: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    impl FakeCamera {
        pub fn new(frames: &[&str]) -> Self {
            Self {
                script: Mutex::new(frames.iter().map(|f| Frame::new(f.as_bytes())).collect()),
                stall_when_empty: false,
                fail_acquire: false,
                acquired: AtomicUsize::new(0),
                released: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn stalling(frames: &[&str]) -> Self {
            Self {
                stall_when_empty: true,
                ..Self::new(frames)
            }
        }

        pub fn broken() -> Self {
            Self {
                fail_acquire: true,
                ..Self::new(&[])
            }
        }

        pub fn acquired(&self) -> usize {
            self.acquired.load(Ordering::SeqCst)
        }

        pub fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    struct FakeSource {
        frames: VecDeque<Frame>,
        stall_when_empty: bool,
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CameraDevice for FakeCamera {
        async fn acquire(&self) -> Result<Box<dyn FrameSource>> {
            if self.fail_acquire {
                return Err(Error::Camera("no camera attached".to_string()));
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSource {
                frames: std::mem::take(&mut *self.script.lock()),
                stall_when_empty: self.stall_when_empty,
                released: self.released.clone(),
            }))
        }
    }

    #[async_trait]
    impl FrameSource for FakeSource {
        async fn next_frame(&mut self) -> Result<Option<Frame>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None if self.stall_when_empty => std::future::pending().await,
                None => Ok(None),
            }
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Accepts any frame that starts with "EMP"
    pub struct PrefixDecoder;

    impl BarcodeDecoder for PrefixDecoder {
        fn decode(&self, frame: &Frame) -> Option<String> {
            frame
                .as_text()
                .filter(|text| text.starts_with("EMP"))
                .map(str::to_string)
        }
    }

    pub fn scanner(camera: Arc<FakeCamera>) -> Scanner {
        let config = ScannerConfig {
            fps: 1000,
            ..ScannerConfig::default()
        };
        Scanner::new(camera, Arc::new(PrefixDecoder), &config)
    }
}
