use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use motion_cam_pipeline::buffer::SharedFrameBuffer;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

const PART_CONTENT_TYPE: &[u8] = b"Content-Type: image/jpeg\r\n\r\n";
const PART_END: &[u8] = b"\r\n\r\n";

/// `Content-Type` header value for a multipart-replace stream using `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}

/// One multipart part: `--{boundary}\r\nContent-Type: image/jpeg\r\n\r\n{jpeg}\r\n\r\n`.
pub fn encode_part(boundary: &str, jpeg: &[u8]) -> Bytes {
    let mut part =
        BytesMut::with_capacity(2 + boundary.len() + 2 + PART_CONTENT_TYPE.len() + jpeg.len() + PART_END.len());
    part.put_slice(b"--");
    part.put_slice(boundary.as_bytes());
    part.put_slice(b"\r\n");
    part.put_slice(PART_CONTENT_TYPE);
    part.put_slice(jpeg);
    part.put_slice(PART_END);
    part.freeze()
}

/// Tracks one live viewer. Dropping it (the viewer hung up, a write failed or
/// the server is shutting down) decrements the shared count.
struct ViewerGuard {
    viewers: Arc<AtomicUsize>,
    parts_sent: u64,
}

impl ViewerGuard {
    fn register(viewers: Arc<AtomicUsize>) -> Self {
        let now = viewers.fetch_add(1, Ordering::Relaxed) + 1;
        info!(viewers = now, "viewer connected");
        Self {
            viewers,
            parts_sent: 0,
        }
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        let now = self.viewers.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        info!(viewers = now, parts_sent = self.parts_sent, "viewer disconnected");
    }
}

struct Delivery {
    buffer: Arc<SharedFrameBuffer>,
    boundary: String,
    ticker: Interval,
    shutdown: watch::Receiver<bool>,
    guard: ViewerGuard,
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// The body of a `/video` response: every `interval`, the current contents of
/// `buffer` as one multipart part. Ticks that find the buffer empty emit
/// nothing.
///
/// The stream ends when `shutdown` flips to true. When the viewer disconnects
/// hyper drops the stream, which ends delivery for that viewer only.
pub fn frame_stream(
    buffer: Arc<SharedFrameBuffer>,
    boundary: String,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
    viewers: Arc<AtomicUsize>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let delivery = Delivery {
        buffer,
        boundary,
        ticker,
        shutdown,
        guard: ViewerGuard::register(viewers),
    };

    futures_util::stream::unfold(delivery, |mut delivery| async move {
        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut delivery.shutdown) => {
                    debug!("ending viewer stream for shutdown");
                    return None;
                }
                _ = delivery.ticker.tick() => {}
            }

            // The lock is held only inside snapshot(); the write happens after.
            let jpeg = delivery.buffer.snapshot();
            if jpeg.is_empty() {
                continue;
            }
            delivery.guard.parts_sent += 1;
            let part = encode_part(&delivery.boundary, &jpeg);
            return Some((Ok(part), delivery));
        }
    })
}
