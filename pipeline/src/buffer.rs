use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use motion_cam_common::frame::EncodedFrame;

/// Single-slot hand-off between the capture loop and the viewers.
///
/// Holds only the most recent [`EncodedFrame`]. Writers replace the slot,
/// readers clone a reference-counted handle to it; the lock is held for the
/// pointer swap or clone and nothing else.
#[derive(Debug, Default)]
pub struct SharedFrameBuffer {
    slot: RwLock<Option<EncodedFrame>>,
}

impl SharedFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame.
    pub fn publish(&self, frame: EncodedFrame) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(frame);
    }

    /// Payload of the current frame, or an empty buffer before the first publish.
    pub fn snapshot(&self) -> Bytes {
        self.latest().map(|frame| frame.payload).unwrap_or_default()
    }

    /// The current frame with its metadata.
    pub fn latest(&self) -> Option<EncodedFrame> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sequence number of the current frame.
    pub fn latest_seq(&self) -> Option<u64> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|frame| frame.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn frame(seq: u64, payload: Vec<u8>) -> EncodedFrame {
        EncodedFrame::new(Bytes::from(payload), seq, 0)
    }

    #[test]
    fn snapshot_before_publish_is_empty() {
        let buffer = SharedFrameBuffer::new();
        assert!(buffer.snapshot().is_empty());
        assert!(buffer.latest().is_none());
        assert_eq!(buffer.latest_seq(), None);
    }

    #[test]
    fn publish_overwrites_previous_frame() {
        let buffer = SharedFrameBuffer::new();
        buffer.publish(frame(1, vec![1, 1]));
        buffer.publish(frame(2, vec![2, 2, 2]));
        assert_eq!(&buffer.snapshot()[..], &[2, 2, 2]);
        assert_eq!(buffer.latest_seq(), Some(2));
        // Repeated reads keep returning the same frame.
        assert_eq!(&buffer.snapshot()[..], &[2, 2, 2]);
    }

    /// Payload for `marker`: `marker` repeated a marker-dependent number of times,
    /// so a reader can verify both length and content.
    fn payload_for(marker: u8) -> Vec<u8> {
        vec![marker; 1024 + marker as usize * 37]
    }

    #[test]
    fn concurrent_readers_never_see_torn_frames() {
        let buffer = Arc::new(SharedFrameBuffer::new());
        let done = Arc::new(AtomicBool::new(false));

        std::thread::scope(|scope| {
            for writer in 0..25u8 {
                let buffer = Arc::clone(&buffer);
                scope.spawn(move || {
                    for round in 0..200u64 {
                        let marker = writer.wrapping_mul(7).wrapping_add(round as u8) | 1;
                        buffer.publish(frame(round, payload_for(marker)));
                    }
                });
            }
            for _ in 0..25 {
                let buffer = Arc::clone(&buffer);
                let done = Arc::clone(&done);
                scope.spawn(move || {
                    let mut reads = 0u32;
                    while !done.load(Ordering::Relaxed) || reads < 200 {
                        let snapshot = buffer.snapshot();
                        if !snapshot.is_empty() {
                            let marker = snapshot[0];
                            assert_eq!(snapshot.len(), payload_for(marker).len());
                            assert!(snapshot.iter().all(|&b| b == marker));
                        }
                        reads += 1;
                        if reads > 1_000_000 {
                            break;
                        }
                    }
                });
            }
            // Writers finish on their own; let readers drain a little longer.
            std::thread::sleep(std::time::Duration::from_millis(50));
            done.store(true, Ordering::Relaxed);
        });

        assert!(!buffer.snapshot().is_empty());
    }
}
