//! PES header decoding.

use super::psi::iod::EsDescriptor;
use crate::av::{codecs, Fourcc};
use crate::error::{DemuxError, Result};

/// Largest header prefix examined (MPEG-1 stuffing plus two timestamps).
const PES_HEADER_PEEK: usize = 34;
/// MPEG-1 stuffing stops being plausible here.
const MPEG1_STUFFING_LIMIT: usize = 23;

/// Timing and payload offset of one PES packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PesHeader {
    /// PES stream_id
    pub stream_id: u8,
    /// Bytes before the elementary payload, codec tagging included
    pub skip: usize,
    /// 90 kHz ticks
    pub pts: Option<i64>,
    /// 90 kHz ticks; equals `pts` when the stream omits it
    pub dts: Option<i64>,
    /// Display duration (MPEG-4 timed text), 90 kHz ticks
    pub length: i64,
    /// Declared access unit size (MPEG-4 timed text)
    pub unit_size: Option<usize>,
}

/// Decodes a 33-bit timestamp from its 5-byte marker-bit layout.
pub fn decode_timestamp(p: &[u8]) -> i64 {
    (((p[0] & 0x0e) as i64) << 29)
        | ((p[1] as i64) << 22)
        | (((p[2] & 0xfe) as i64) << 14)
        | ((p[3] as i64) << 7)
        | ((p[4] as i64) >> 1)
}

fn has_start_code(data: &[u8]) -> bool {
    data.len() >= 4 && data[..3] == [0x00, 0x00, 0x01]
}

fn byte(data: &[u8], index: usize) -> Result<u8> {
    data.get(index)
        .copied()
        .ok_or_else(|| DemuxError::Parser("truncated PES header".into()))
}

fn timestamp_at(data: &[u8], index: usize) -> Result<i64> {
    data.get(index..index + 5)
        .map(decode_timestamp)
        .ok_or_else(|| DemuxError::Parser("truncated PES timestamp".into()))
}

impl PesHeader {
    /// Parses the header of a complete PES unit carried with `codec`.
    pub fn parse(data: &[u8], codec: Fourcc, mpeg4desc: Option<&EsDescriptor>) -> Result<Self> {
        if !has_start_code(data) {
            return Err(DemuxError::Parser("missing PES start code".into()));
        }
        let header = &data[..data.len().min(PES_HEADER_PEEK)];
        let mut pes = PesHeader {
            stream_id: header[3],
            ..Default::default()
        };

        match pes.stream_id {
            // program stream map, padding, private 2, ECM, EMM, directory, DSM-CC, type E
            0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xFF | 0xF2 | 0xF8 => pes.skip = 6,
            _ if byte(header, 6)? & 0xC0 == 0x80 => {
                pes.skip = byte(header, 8)? as usize + 9;
                let flags = byte(header, 7)?;
                if flags & 0x80 != 0 {
                    pes.pts = Some(timestamp_at(header, 9)?);
                    if flags & 0x40 != 0 {
                        pes.dts = Some(timestamp_at(header, 14)?);
                    }
                }
            }
            _ => {
                let mut skip = 6;
                while skip < MPEG1_STUFFING_LIMIT && byte(header, skip)? == 0xff {
                    skip += 1;
                }
                if skip == MPEG1_STUFFING_LIMIT {
                    return Err(DemuxError::Parser("too much MPEG-1 stuffing".into()));
                }
                if byte(header, skip)? & 0xC0 == 0x40 {
                    skip += 2;
                }
                let flags = byte(header, skip)?;
                if flags & 0x20 != 0 {
                    pes.pts = Some(timestamp_at(header, skip)?);
                    if flags & 0x10 != 0 {
                        pes.dts = Some(timestamp_at(header, skip + 5)?);
                        skip += 10;
                    } else {
                        skip += 5;
                    }
                } else {
                    skip += 1;
                }
                pes.skip = skip;
            }
        }

        if codec == codecs::A52B || codec == codecs::DTSB {
            pes.skip += 4;
        } else if codec == codecs::LPCB || codec == codecs::SPUB || codec == codecs::SDDB {
            pes.skip += 1;
        } else if codec == codecs::SUBT {
            if let Some(desc) = mpeg4desc {
                let extra = &desc.decoder.extra;
                if extra.len() > 2 && extra[0] == 0x10 && extra[1] & 0x10 != 0 {
                    if let Some(v) = data.get(pes.skip..pes.skip + 2) {
                        pes.length = u16::from_be_bytes([v[0], v[1]]) as i64;
                    }
                    pes.skip += 2;
                }
                if let Some(v) = data.get(pes.skip..pes.skip + 2) {
                    pes.unit_size = Some(u16::from_be_bytes([v[0], v[1]]) as usize);
                }
                pes.skip += 2;
            }
        }

        if pes.pts.is_some() && pes.dts.is_none() {
            pes.dts = pes.pts;
        }

        Ok(pes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    pub(crate) fn encode_timestamp(prefix: u8, ts: i64) -> [u8; 5] {
        [
            (prefix << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 1,
            (ts >> 22) as u8,
            (((ts >> 15) as u8) << 1) | 1,
            (ts >> 7) as u8,
            ((ts as u8) << 1) | 1,
        ]
    }

    /// MPEG-2 PES header with a PTS (and optionally a DTS) followed by `payload`.
    pub(crate) fn mpeg2_pes(stream_id: u8, pts: i64, dts: Option<i64>, payload: &[u8]) -> Vec<u8> {
        let mut pes = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00, 0x80];
        match dts {
            Some(dts) => {
                pes.extend_from_slice(&[0xC0, 10]);
                pes.extend_from_slice(&encode_timestamp(0x3, pts));
                pes.extend_from_slice(&encode_timestamp(0x1, dts));
            }
            None => {
                pes.extend_from_slice(&[0x80, 5]);
                pes.extend_from_slice(&encode_timestamp(0x2, pts));
            }
        }
        pes.extend_from_slice(payload);
        pes
    }

    #[test]
    fn test_pts_only_sets_dts() {
        let pes = mpeg2_pes(0xE0, 900_000, None, &[0xAA; 8]);
        let header = PesHeader::parse(&pes, codecs::H264, None).unwrap();
        assert_eq!(header.skip, 14);
        assert_eq!(header.pts, Some(900_000));
        assert_eq!(header.dts, Some(900_000));
    }

    #[test]
    fn test_pts_and_dts() {
        let pes = mpeg2_pes(0xE0, 0x1_0000_0001, Some(0x0_FFFF_FFF0), &[0; 4]);
        let header = PesHeader::parse(&pes, codecs::MPGV, None).unwrap();
        assert_eq!(header.skip, 19);
        assert_eq!(header.pts, Some(0x1_0000_0001));
        assert_eq!(header.dts, Some(0x0_FFFF_FFF0));
    }

    #[test]
    fn test_fixed_skip_stream_ids() {
        let pes = [0x00, 0x00, 0x01, 0xBF, 0x00, 0x04, 1, 2, 3, 4];
        let header = PesHeader::parse(&pes, codecs::MPGA, None).unwrap();
        assert_eq!(header.skip, 6);
        assert_eq!(header.pts, None);
    }

    #[test]
    fn test_mpeg1_headers() {
        let mut pes = vec![0x00, 0x00, 0x01, 0xC0, 0x00, 0x00, 0xFF, 0xFF, 0x40, 0x00];
        pes.extend_from_slice(&encode_timestamp(0x2, 1234));
        pes.extend_from_slice(&[9, 9]);
        let header = PesHeader::parse(&pes, codecs::MPGA, None).unwrap();
        assert_eq!(header.skip, 15);
        assert_eq!(header.pts, Some(1234));

        let mut stuffed = vec![0x00, 0x00, 0x01, 0xC0, 0x00, 0x00];
        stuffed.extend_from_slice(&[0xFF; 20]);
        assert!(PesHeader::parse(&stuffed, codecs::MPGA, None).is_err());

        let plain = [0x00, 0x00, 0x01, 0xC0, 0x00, 0x00, 0x0F, 7];
        assert_eq!(PesHeader::parse(&plain, codecs::MPGA, None).unwrap().skip, 7);
    }

    #[test]
    fn test_codec_skips() {
        let pes = mpeg2_pes(0xBD, 0, None, &[0; 8]);
        assert_eq!(PesHeader::parse(&pes, codecs::A52B, None).unwrap().skip, 18);
        assert_eq!(PesHeader::parse(&pes, codecs::SPUB, None).unwrap().skip, 15);
        assert!(PesHeader::parse(&[0, 0, 2, 0xE0], codecs::H264, None).is_err());
    }

    #[quickcheck]
    fn prop_timestamp_round_trip(ts: u64) -> bool {
        let ts = (ts & 0x1_FFFF_FFFF) as i64;
        decode_timestamp(&encode_timestamp(0x2, ts)) == ts
    }
}
