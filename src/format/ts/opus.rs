//! Opus in MPEG-TS: access unit framing and `OpusHead` construction from the
//! extension descriptor.

use crate::av::{Block, BLOCK_FLAG_PREROLL};
use crate::error::{DemuxError, Result};
use crate::utils::BitReader;
use bytes::{BufMut, Bytes, BytesMut};
use log::error;

const OPUS_RATE: u32 = 48_000;

/// Samples at 48 kHz carried by one Opus packet, from its TOC byte.
pub fn frame_duration(packet: &[u8]) -> u32 {
    let Some(&toc) = packet.first() else {
        return 0;
    };
    let frames = match toc & 0x03 {
        0 => 1,
        1 | 2 => 2,
        _ => match packet.get(1) {
            Some(count) => (count & 0x3F) as u32,
            None => return 0,
        },
    };
    let per_frame = if toc & 0x80 != 0 {
        120 << ((toc >> 3) & 0x03)
    } else if toc & 0x60 == 0x60 {
        if toc & 0x08 != 0 {
            960
        } else {
            480
        }
    } else {
        match (toc >> 3) & 0x03 {
            3 => 2880,
            size => 480 << size,
        }
    };
    frames * per_frame
}

fn read_trim(buf: &mut &[u8]) -> Option<i32> {
    if buf.len() < 2 {
        return None;
    }
    let value = u16::from_be_bytes([buf[0], buf[1]]);
    *buf = &buf[2..];
    if value & (3 << 13) != 0 {
        None
    } else {
        Some(value as i32)
    }
}

/// Splits one PES payload into its Opus access units.
///
/// Each unit inherits the timestamps of `block`; trim values become sample
/// count and `length` (end trim, in samples).
pub fn split_access_units(block: &Block) -> Vec<Block> {
    let mut out = Vec::new();
    let data = &block.data;
    let mut buf: &[u8] = data;

    while buf.len() > 3 && ((buf[0] as u16) << 3 | (buf[1] as u16) >> 5) == 0x3ff {
        let start_trim_flag = (buf[1] >> 4) & 1 != 0;
        let end_trim_flag = (buf[1] >> 3) & 1 != 0;
        let control_extension_flag = (buf[1] >> 2) & 1 != 0;
        buf = &buf[2..];

        let mut au_size = 0usize;
        while let Some((&c, rest)) = buf.split_first() {
            buf = rest;
            au_size += c as usize;
            if c != 0xff {
                break;
            }
        }

        // an unreadable trim field means no trimming
        let mut start_trim = 0;
        let mut end_trim = 0;
        if start_trim_flag {
            start_trim = read_trim(&mut buf).unwrap_or_else(|| {
                error!("Invalid start trimming flag");
                0
            });
        }
        if end_trim_flag {
            end_trim = read_trim(&mut buf).unwrap_or_else(|| {
                error!("Invalid end trimming flag");
                0
            });
        }
        if control_extension_flag && !buf.is_empty() {
            let length = buf[0] as usize;
            buf = &buf[1..];
            if length > buf.len() {
                error!("Invalid control extension length {} > {}", length, buf.len());
                break;
            }
            buf = &buf[length..];
        }

        if au_size == 0 || au_size > buf.len() {
            error!("Invalid Opus AU size {} (PES {})", au_size, buf.len());
            break;
        }

        let offset = data.len() - buf.len();
        let mut au = block.clone();
        au.data = data.slice(offset..offset + au_size);
        au.nb_samples = frame_duration(&buf[..au_size]);
        au.length = if end_trim > 0 && end_trim <= au.nb_samples as i32 {
            end_trim as i64
        } else {
            0
        };
        if start_trim > 0 && (start_trim as i64) < au.nb_samples as i64 - au.length {
            if let Some(remaining) = au.nb_samples.checked_sub(start_trim as u32) {
                au.nb_samples = remaining;
                if au.nb_samples == 0 {
                    au.flags |= BLOCK_FLAG_PREROLL;
                }
            }
        }
        out.push(au);

        buf = &buf[au_size..];
    }

    out
}

/// Channel layout from an Opus extension descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusConfig {
    /// Output channel count
    pub channels: u8,
    /// OpusHead channel mapping family
    pub mapping_family: u8,
    /// Coupled (stereo) stream count
    pub coupled: u8,
    /// Total stream count
    pub streams: u8,
    /// Channel to stream mapping
    pub stream_map: [u8; 8],
}

fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        32 - (n - 1).leading_zeros()
    }
}

impl OpusConfig {
    /// Decodes the extension descriptor body (`p[0]` is the extension tag,
    /// `p[1]` the channel configuration code).
    pub fn from_descriptor(p: &[u8]) -> Result<Self> {
        let ccc = *p
            .get(1)
            .ok_or_else(|| DemuxError::Parser("Opus descriptor too short".into()))?;
        let mut stream_map = [0, 1, 2, 3, 4, 5, 6, 7];
        let channels;
        let mapping;
        let coupled;

        if ccc <= 8 {
            if ccc == 0 {
                mapping = 255;
                channels = 2;
            } else {
                channels = ccc;
                mapping = (channels > 2) as u8;
            }
            const COUPLED: [u8; 8] = [0, 1, 1, 2, 2, 2, 3, 3];
            const MAPS: [&[u8]; 6] = [
                &[2, 1],
                &[1, 2, 3],
                &[4, 1, 2, 3],
                &[4, 1, 2, 3, 5],
                &[4, 1, 2, 3, 5, 6],
                &[6, 1, 2, 3, 4, 5, 7],
            ];
            coupled = COUPLED[channels as usize - 1];
            if channels > 2 {
                let map = MAPS[channels as usize - 3];
                stream_map[1..channels as usize].copy_from_slice(map);
            }
        } else if ccc == 0x81 {
            if p.len() < 4 {
                return Err(DemuxError::Parser("explicit Opus configuration too short".into()));
            }
            channels = p[2];
            mapping = p[3];
            let mut csc = 0u32;
            if mapping != 0 {
                let mut bits = BitReader::new(&p[4..]);
                let mut stream_count = 1u32;
                if channels != 0 {
                    stream_count = bits.read_bits(ceil_log2(channels as u32))? + 1;
                    csc = bits.read_bits(ceil_log2(stream_count + 1))?;
                }
                let channel_bits = ceil_log2(stream_count + csc + 1);
                let silence = ((1u32 << (stream_count + csc + 1)) - 1) as u8;
                for slot in stream_map.iter_mut().take(channels.min(8) as usize) {
                    let m = bits.read_bits(channel_bits)? as u8;
                    *slot = if m == silence { 0xff } else { m };
                }
            }
            coupled = csc as u8;
        } else if (0x80..=0x88).contains(&ccc) {
            if ccc == 0x80 {
                mapping = 255;
                channels = 2;
            } else {
                channels = ccc - 0x80;
                mapping = 1;
            }
            coupled = 0;
        } else {
            error!("Opus channel configuration 0x{:02x} is reserved", ccc);
            return Err(DemuxError::Unsupported(format!("Opus channel configuration 0x{:02x}", ccc)));
        }

        if channels == 0 {
            return Err(DemuxError::Unsupported(format!(
                "Opus channel configuration 0x{:02x}",
                ccc
            )));
        }

        Ok(Self {
            channels,
            mapping_family: mapping,
            coupled,
            streams: channels.saturating_sub(coupled),
            stream_map,
        })
    }

    /// Decoding sample rate (always 48 kHz).
    pub fn rate(&self) -> u32 {
        OPUS_RATE
    }

    /// `OpusHead` identification header (RFC 7845 section 5.1).
    pub fn opus_head(&self) -> Bytes {
        let mut head = BytesMut::with_capacity(19 + 2 + self.channels as usize);
        head.put_slice(b"OpusHead");
        head.put_u8(1);
        head.put_u8(self.channels);
        head.put_u16_le(0);
        head.put_u32_le(OPUS_RATE);
        head.put_i16_le(0);
        head.put_u8(self.mapping_family);
        if self.mapping_family != 0 {
            head.put_u8(self.streams);
            head.put_u8(self.coupled);
            head.put_slice(&self.stream_map[..(self.channels as usize).min(8)]);
        }
        head.freeze()
    }
}
