use bytes::Bytes;

/// Block flag: the payload was gathered across a continuity break or a transport error.
pub const BLOCK_FLAG_CORRUPTED: u32 = 0x0001;
/// Block flag: decode but do not present (Opus start trim swallowed the whole frame).
pub const BLOCK_FLAG_PREROLL: u32 = 0x0002;

/// One finished access unit handed to the elementary stream sink.
///
/// Timestamps are in microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Access unit payload
    pub data: Bytes,
    /// Presentation timestamp, microseconds
    pub pts: Option<i64>,
    /// Decoding timestamp, microseconds
    pub dts: Option<i64>,
    /// Duration in microseconds, 0 when unknown
    pub length: i64,
    /// Decoded sample count, when the framing declares it
    pub nb_samples: u32,
    /// `BLOCK_FLAG_*` bits
    pub flags: u32,
}

impl Block {
    /// Untimed block around `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            length: 0,
            nb_samples: 0,
            flags: 0,
        }
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    /// Sets the decoding timestamp.
    pub fn with_dts(mut self, dts: Option<i64>) -> Self {
        self.dts = dts;
        self
    }

    /// Sets the duration.
    pub fn with_length(mut self, length: i64) -> Self {
        self.length = length;
        self
    }

    /// Adds flag bits.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// True when the given flag bits are all set.
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// The payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
