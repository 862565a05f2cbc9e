use bytes::Bytes;

/// A compressed, transport-ready image together with its capture metadata.
///
/// The payload is reference counted, so cloning an `EncodedFrame` never copies
/// the JPEG bytes.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub payload: Bytes,
    /// Position of the source frame in the capture stream.
    pub seq: u64,
    pub captured_at_ms: i64,
}

impl EncodedFrame {
    pub fn new(payload: Bytes, seq: u64, captured_at_ms: i64) -> Self {
        Self {
            payload,
            seq,
            captured_at_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Milliseconds elapsed between capture and `now_ms`, saturating at zero.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.captured_at_ms).max(0)
    }

    /// Age relative to the wall clock.
    pub fn age_now_ms(&self) -> i64 {
        self.age_ms(chrono::Utc::now().timestamp_millis())
    }
}
