use std::sync::Arc;
use std::thread;

use motion_cam_common::frame::EncodedFrame;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::buffer::SharedFrameBuffer;
use crate::detector::{MotionDetector, PipelineStatus};
use crate::encoder::FrameEncoder;
use crate::source::FrameSource;

/// Why the capture loop left the Running state. Stopped is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source is exhausted or the device disconnected.
    EndOfStream,
    /// Process shutdown was requested.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Running,
    Stopped(StopReason),
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames_read: u64,
    pub frames_skipped: u64,
    pub frames_published: u64,
    pub encode_failures: u64,
    pub motion_frames: u64,
    pub stop: StopReason,
}

/// The pipeline object: owns the source, the detector and the encoder, and
/// publishes into a buffer shared with the viewers.
pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    detector: MotionDetector,
    encoder: FrameEncoder,
    buffer: Arc<SharedFrameBuffer>,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: MotionDetector,
        encoder: FrameEncoder,
        buffer: Arc<SharedFrameBuffer>,
    ) -> Self {
        Self {
            source,
            detector,
            encoder,
            buffer,
        }
    }

    /// Run the loop on a dedicated thread.
    pub fn spawn(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<thread::JoinHandle<CaptureSummary>> {
        thread::Builder::new()
            .name("motion-capture".into())
            .spawn(move || self.run(&shutdown))
    }

    /// Pull, analyze, encode and publish frames until the source ends or
    /// `shutdown` turns true. The source is dropped (and the device released)
    /// before this returns.
    pub fn run(mut self, shutdown: &watch::Receiver<bool>) -> CaptureSummary {
        info!(source = self.source.name(), "capture loop started");

        let mut state = CaptureState::Running;
        let mut last_status = PipelineStatus::Ready;
        let mut summary = CaptureSummary {
            frames_read: 0,
            frames_skipped: 0,
            frames_published: 0,
            encode_failures: 0,
            motion_frames: 0,
            stop: StopReason::EndOfStream,
        };

        while state == CaptureState::Running {
            if *shutdown.borrow() {
                state = CaptureState::Stopped(StopReason::Shutdown);
                continue;
            }

            let Some(frame) = self.source.next_frame() else {
                state = CaptureState::Stopped(StopReason::EndOfStream);
                continue;
            };
            summary.frames_read += 1;

            if frame.is_empty() {
                debug!(seq = frame.seq, "empty frame, skipping");
                summary.frames_skipped += 1;
                continue;
            }

            let analysis = self.detector.analyze(frame);
            if analysis.status == PipelineStatus::MotionDetected {
                summary.motion_frames += 1;
            }
            if analysis.status != last_status {
                info!(
                    seq = analysis.frame.seq,
                    regions = analysis.regions.len(),
                    "{}→{}",
                    last_status.label(),
                    analysis.status.label()
                );
                last_status = analysis.status;
            }

            match self.encoder.encode(&analysis.frame.image) {
                Ok(payload) => {
                    self.buffer.publish(EncodedFrame::new(
                        payload,
                        analysis.frame.seq,
                        analysis.frame.captured_at_ms,
                    ));
                    summary.frames_published += 1;
                }
                Err(e) => {
                    warn!(seq = analysis.frame.seq, error = %e, "failed to encode frame, keeping previous");
                    summary.encode_failures += 1;
                }
            }
        }

        if let CaptureState::Stopped(reason) = state {
            summary.stop = reason;
        }
        match summary.stop {
            StopReason::EndOfStream => info!(
                source = self.source.name(),
                frames_read = summary.frames_read,
                frames_published = summary.frames_published,
                "capture source closed; viewers keep the last frame"
            ),
            StopReason::Shutdown => info!(
                frames_read = summary.frames_read,
                frames_published = summary.frames_published,
                "capture loop stopped for shutdown"
            ),
        }
        summary
    }
}
