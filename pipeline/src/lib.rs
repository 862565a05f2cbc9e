//! Capture → detect → encode → publish.
//!
//! One [`CaptureLoop`](capture::CaptureLoop) per process pulls frames from a
//! [`FrameSource`](source::FrameSource), runs them through the
//! [`MotionDetector`](detector::MotionDetector) and [`FrameEncoder`](encoder::FrameEncoder),
//! and overwrites the single slot in a [`SharedFrameBuffer`](buffer::SharedFrameBuffer)
//! that any number of viewers read from at their own pace.

pub mod buffer;
pub mod capture;
pub mod detector;
pub mod encoder;
pub mod frame;
pub mod source;
