use super::ByteSource;
use crate::error::Result;
use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

const READ_CHUNK: usize = 64 * 1024;

/// [`ByteSource`] over any tokio reader that can seek (files, `std::io::Cursor`).
///
/// Keeps a look-ahead buffer so peeks do not move the reader.
pub struct StreamSource<R> {
    reader: R,
    buffer: BytesMut,
    /// Offset of `buffer[0]` in the stream
    position: u64,
    size: Option<u64>,
    fast_seek: bool,
    eof: bool,
}

impl<R: AsyncRead + AsyncSeek + Unpin + Send> StreamSource<R> {
    /// Wraps `reader`, measuring its size and rewinding to the start.
    pub async fn open(mut reader: R) -> Result<Self> {
        let size = reader.seek(SeekFrom::End(0)).await?;
        reader.seek(SeekFrom::Start(0)).await?;

        Ok(Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            position: 0,
            size: Some(size),
            fast_seek: true,
            eof: false,
        })
    }

    /// Overrides the fast-seek capability (e.g. for slow network files).
    pub fn with_fast_seek(mut self, fast_seek: bool) -> Self {
        self.fast_seek = fast_seek;
        self
    }

    /// Gives the reader back.
    pub fn into_inner(self) -> R {
        self.reader
    }

    async fn fill(&mut self, len: usize) -> Result<()> {
        while self.buffer.len() < len && !self.eof {
            self.buffer.reserve(READ_CHUNK.max(len - self.buffer.len()));
            if self.reader.read_buf(&mut self.buffer).await? == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + AsyncSeek + Unpin + Send> ByteSource for StreamSource<R> {
    async fn peek(&mut self, len: usize) -> Result<Bytes> {
        self.fill(len).await?;
        let n = len.min(self.buffer.len());
        Ok(Bytes::copy_from_slice(&self.buffer[..n]))
    }

    async fn read(&mut self, len: usize) -> Result<BytesMut> {
        self.fill(len).await?;
        let n = len.min(self.buffer.len());
        self.position += n as u64;
        Ok(self.buffer.split_to(n))
    }

    async fn seek(&mut self, pos: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(pos)).await?;
        self.buffer.clear();
        self.position = pos;
        self.eof = false;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn can_fast_seek(&self) -> bool {
        self.fast_seek
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_peek_read_seek() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut source = StreamSource::open(Cursor::new(data)).await.unwrap();
        assert_eq!(source.size(), Some(256));

        let peeked = source.peek(4).await.unwrap();
        assert_eq!(&peeked[..], &[0, 1, 2, 3]);
        assert_eq!(source.tell(), 0);

        let read = source.read(10).await.unwrap();
        assert_eq!(read.len(), 10);
        assert_eq!(source.tell(), 10);
        assert_eq!(source.peek(1).await.unwrap()[0], 10);

        source.seek(250).await.unwrap();
        let tail = source.read(100).await.unwrap();
        assert_eq!(&tail[..], &[250, 251, 252, 253, 254, 255]);
        assert_eq!(source.tell(), 256);
        assert!(source.read(1).await.unwrap().is_empty());
    }

    #[test]
    fn test_capabilities() {
        let mut source = tokio_test::block_on(StreamSource::open(Cursor::new(vec![0u8; 16]))).unwrap();
        assert!(source.can_fast_seek());
        assert!(source.set_pid_filter(0x100, true).is_err());
        assert!(source.set_record_state(true).is_err());
        assert!(!source.with_fast_seek(false).can_fast_seek());
    }
}
