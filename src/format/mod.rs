use crate::error::{DemuxError, Result};
use bytes::{Bytes, BytesMut};

/// Generic [`ByteSource`] over any `AsyncRead + AsyncSeek`.
pub mod source;
pub mod ts;

/// Reception quality reported by tuner-backed sources, both in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalInfo {
    /// Signal quality
    pub quality: f64,
    /// Signal strength
    pub strength: f64,
}

/// Title and seekpoint the source is positioned in (disc-like sources).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TitleInfo {
    /// Current title index
    pub title: usize,
    /// Current seekpoint (chapter) index
    pub seekpoint: usize,
}

/// Seekable byte stream feeding a demuxer.
///
/// Short reads and peeks signal end of stream; they are not errors.
#[async_trait::async_trait]
pub trait ByteSource: Send {
    /// Returns up to `len` bytes without consuming them.
    async fn peek(&mut self, len: usize) -> Result<Bytes>;

    /// Consumes and returns up to `len` bytes.
    async fn read(&mut self, len: usize) -> Result<BytesMut>;

    /// Moves the read position to an absolute offset.
    async fn seek(&mut self, pos: u64) -> Result<()>;

    /// Current read position.
    fn tell(&self) -> u64;

    /// Total size, when known.
    fn size(&self) -> Option<u64>;

    /// Whether seeking is cheap enough for PCR probing.
    fn can_fast_seek(&self) -> bool {
        false
    }

    /// Requests or cancels delivery of one PID (hardware/network filtering).
    fn set_pid_filter(&mut self, _pid: u16, _selected: bool) -> Result<()> {
        Err(DemuxError::Unsupported("pid filtering".into()))
    }

    /// Starts or stops recording of the raw stream.
    fn set_record_state(&mut self, _recording: bool) -> Result<()> {
        Err(DemuxError::Unsupported("recording".into()))
    }

    /// Reception quality, `None` for sources without a tuner.
    fn signal(&self) -> Option<SignalInfo> {
        None
    }

    /// Current title and seekpoint, `None` for sources without titles.
    fn title_info(&self) -> Option<TitleInfo> {
        None
    }
}

pub use self::source::StreamSource;
pub use self::ts::TsDemuxer;
