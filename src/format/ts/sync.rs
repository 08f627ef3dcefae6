//! Packet size detection and sync recovery.

use super::types::*;
use crate::error::{DemuxError, Result};
use crate::format::ByteSource;
use bytes::BytesMut;
use log::{debug, warn};

/// Tag at the start of Topfield PVR recordings.
const TOPFIELD_TAG: &[u8; 4] = b"TFrc";

/// Packet geometry of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFormat {
    /// Bytes between two sync bytes
    pub packet_size: usize,
    /// Container prefix before each sync byte (4 for 192-byte M2TS-like framing)
    pub header_size: usize,
}

impl PacketFormat {
    /// Plain 188-byte packets.
    pub const fn standard() -> Self {
        Self {
            packet_size: TS_PACKET_SIZE,
            header_size: 0,
        }
    }

    /// Size of one packet once the container prefix is stripped.
    pub fn payload_size(&self) -> usize {
        self.packet_size - self.header_size
    }
}

impl Default for PacketFormat {
    fn default() -> Self {
        Self::standard()
    }
}

fn stride_matches(data: &[u8], offset: usize, stride: usize) -> bool {
    (1..=3).all(|k| data.get(offset + k * stride) == Some(&TS_SYNC_BYTE))
}

/// Finds the packet size by looking for four sync bytes at a constant stride.
///
/// Without a match, `force` falls back to 188 bytes; otherwise the stream is
/// rejected with [`DemuxError::NoSync`].
pub async fn detect_packet_format<S>(source: &mut S, force: bool) -> Result<PacketFormat>
where
    S: ByteSource + ?Sized,
{
    let head = source.peek(TS_PACKET_SIZE_MAX).await?;
    if head.len() < TS_PACKET_SIZE_MAX {
        if force {
            warn!("stream too short to detect packet size, assuming 188");
            return Ok(PacketFormat::standard());
        }
        return Err(DemuxError::NoSync);
    }

    if &head[..4] == TOPFIELD_TAG {
        debug!("Topfield recording detected");
        return Ok(PacketFormat::standard());
    }

    for offset in 0..TS_PACKET_SIZE_MAX {
        if head[offset] != TS_SYNC_BYTE {
            continue;
        }

        let window = source.peek(TS_PACKET_SIZE_MAX * 3 + offset + 1).await?;
        if window.len() < TS_PACKET_SIZE_MAX * 3 + offset + 1 {
            break;
        }

        if stride_matches(&window, offset, TS_PACKET_SIZE) {
            return Ok(PacketFormat::standard());
        }
        if stride_matches(&window, offset, TS_PACKET_SIZE_192) {
            return Ok(PacketFormat {
                packet_size: TS_PACKET_SIZE_192,
                header_size: if offset == 4 { 4 } else { 0 },
            });
        }
        if stride_matches(&window, offset, TS_PACKET_SIZE_204) {
            return Ok(PacketFormat {
                packet_size: TS_PACKET_SIZE_204,
                header_size: 0,
            });
        }
    }

    if force {
        warn!("this does not look like a TS stream, continuing with 188-byte packets");
        Ok(PacketFormat::standard())
    } else {
        debug!("TS module discarded (lost sync)");
        Err(DemuxError::NoSync)
    }
}

/// Reads one packet, container prefix stripped, resynchronizing on a bad sync byte.
///
/// `Ok(None)` means end of stream.
pub async fn read_packet<S>(source: &mut S, format: PacketFormat) -> Result<Option<BytesMut>>
where
    S: ByteSource + ?Sized,
{
    let size = format.packet_size;
    let header = format.header_size;

    loop {
        let mut packet = source.read(size).await?;
        if packet.len() < size {
            return Ok(None);
        }
        let _ = packet.split_to(header);

        if packet[0] == TS_SYNC_BYTE {
            return Ok(Some(packet));
        }

        warn!("lost synchro");
        loop {
            let window = source.peek(size * 10).await?;
            if window.len() < size + 1 {
                debug!("eof while resynchronizing");
                return Ok(None);
            }

            let limit = window.len() - size;
            let found = (0..limit).find(|&skip| {
                window.get(skip + header) == Some(&TS_SYNC_BYTE)
                    && window.get(skip + header + size) == Some(&TS_SYNC_BYTE)
            });

            let skip = found.unwrap_or(limit);
            debug!("skipping {} bytes of garbage", skip);
            if skip > 0 {
                source.read(skip).await?;
            }
            if found.is_some() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::StreamSource;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn stream(packet_size: usize, prefix: usize, count: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..count {
            let mut packet = vec![i as u8; packet_size];
            packet[prefix] = TS_SYNC_BYTE;
            data.extend_from_slice(&packet);
        }
        data
    }

    async fn detect(data: Vec<u8>, force: bool) -> Result<PacketFormat> {
        let mut source = StreamSource::open(Cursor::new(data)).await?;
        detect_packet_format(&mut source, force).await
    }

    #[tokio::test]
    async fn test_detect_sizes() {
        assert_eq!(detect(stream(188, 0, 8), false).await.unwrap(), PacketFormat::standard());
        assert_eq!(
            detect(stream(192, 4, 8), false).await.unwrap(),
            PacketFormat {
                packet_size: 192,
                header_size: 4
            }
        );
        assert_eq!(
            detect(stream(204, 0, 8), false).await.unwrap(),
            PacketFormat {
                packet_size: 204,
                header_size: 0
            }
        );
    }

    #[tokio::test]
    async fn test_detect_noise() {
        let noise: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 0x40) as u8).collect();
        assert!(matches!(detect(noise.clone(), false).await, Err(DemuxError::NoSync)));
        assert_eq!(detect(noise, true).await.unwrap(), PacketFormat::standard());
    }

    #[tokio::test]
    async fn test_resync_after_garbage() {
        let mut data = stream(188, 0, 2);
        data.extend_from_slice(&[0x00; 37]);
        data.extend_from_slice(&stream(188, 0, 3));

        let mut source = StreamSource::open(Cursor::new(data)).await.unwrap();
        let format = PacketFormat::standard();
        let mut count = 0;
        while let Some(packet) = read_packet(&mut source, format).await.unwrap() {
            assert_eq!(packet[0], TS_SYNC_BYTE);
            assert_eq!(packet.len(), 188);
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_prefix_is_stripped() {
        let data = stream(192, 4, 3);
        let mut source = StreamSource::open(Cursor::new(data)).await.unwrap();
        let format = PacketFormat {
            packet_size: 192,
            header_size: 4,
        };
        let packet = read_packet(&mut source, format).await.unwrap().unwrap();
        assert_eq!(packet.len(), 188);
        assert_eq!(packet[0], TS_SYNC_BYTE);
    }
}
