use super::types::*;
use crate::error::{DemuxError, Result};

/// Fixed 4-byte transport packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    /// transport_error_indicator
    pub transport_error: bool,
    /// payload_unit_start_indicator
    pub payload_unit_start: bool,
    /// transport_priority
    pub transport_priority: bool,
    /// 13-bit packet identifier
    pub pid: u16,
    /// transport_scrambling_control, 0 when clear
    pub scrambling_control: u8,
    /// Adaptation field present
    pub adaptation_field_exists: bool,
    /// Payload present
    pub contains_payload: bool,
    /// 4-bit continuity counter
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Parses the header of a packet starting at its sync byte.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < TS_HEADER_SIZE {
            return Err(DemuxError::InvalidData("TS packet too short".into()));
        }
        if data[0] != TS_SYNC_BYTE {
            return Err(DemuxError::InvalidData("invalid sync byte".into()));
        }

        Ok(TsHeader {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            transport_priority: data[1] & 0x20 != 0,
            pid: pid_of(data),
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: data[3] & 0x20 != 0,
            contains_payload: data[3] & 0x10 != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Scrambled payload (top scrambling-control bit).
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control & 0x02 != 0
    }
}

/// `((byte1 & 0x1F) << 8) | byte2`
pub fn pid_of(packet: &[u8]) -> u16 {
    (((packet[1] & 0x1F) as u16) << 8) | packet[2] as u16
}

/// Offset of the payload: 4 without adaptation field, `5 + length` otherwise.
///
/// May exceed the packet size on corrupt input.
pub fn payload_offset(packet: &[u8]) -> usize {
    if packet[3] & 0x20 != 0 {
        5 + packet[4] as usize
    } else {
        TS_HEADER_SIZE
    }
}

/// 33-bit PCR base, when the adaptation field carries one.
pub fn extract_pcr(packet: &[u8]) -> Option<i64> {
    if packet.len() < 11 || packet[3] & 0x20 == 0 || packet[5] & 0x10 == 0 || packet[4] < 7 {
        return None;
    }
    Some(
        ((packet[6] as i64) << 25)
            | ((packet[7] as i64) << 17)
            | ((packet[8] as i64) << 9)
            | ((packet[9] as i64) << 1)
            | ((packet[10] as i64) >> 7),
    )
}

/// Decoded adaptation field flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationField {
    /// adaptation_field_length
    pub length: usize,
    /// discontinuity_indicator
    pub discontinuity: bool,
    /// random_access_indicator
    pub random_access: bool,
    /// elementary_stream_priority_indicator
    pub es_priority: bool,
    /// PCR base in 90 kHz ticks
    pub pcr: Option<i64>,
    /// 9-bit 27 MHz extension of the PCR
    pub pcr_extension: Option<u16>,
    /// Splice countdown, when signalled
    pub splice_countdown: Option<i8>,
}

impl AdaptationField {
    /// Parses the adaptation field of a packet, `None` when absent or empty.
    pub fn parse(packet: &[u8]) -> Result<Option<Self>> {
        if packet.len() < 5 || packet[3] & 0x20 == 0 {
            return Ok(None);
        }
        let length = packet[4] as usize;
        if length == 0 {
            return Ok(None);
        }
        if packet.len() < 5 + length {
            return Err(DemuxError::InvalidData("adaptation field too short".into()));
        }

        let flags = packet[5];
        let mut field = AdaptationField {
            length,
            discontinuity: flags & 0x80 != 0,
            random_access: flags & 0x40 != 0,
            es_priority: flags & 0x20 != 0,
            ..Default::default()
        };

        let mut pos = 6;
        if flags & 0x10 != 0 {
            if length < 7 {
                return Err(DemuxError::InvalidData("PCR data too short".into()));
            }
            field.pcr = extract_pcr(packet);
            field.pcr_extension =
                Some((((packet[10] & 0x01) as u16) << 8) | packet[11] as u16);
            pos += 6;
        }
        if flags & 0x08 != 0 {
            // OPCR
            pos += 6;
        }
        // a truncated splice countdown leaves the other fields usable
        if flags & 0x04 != 0 && pos < 5 + length {
            field.splice_countdown = Some(packet[pos] as i8);
        }

        Ok(Some(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pcr_packet(pcr: i64) -> Vec<u8> {
        let mut p = vec![0xFF; TS_PACKET_SIZE];
        p[0] = 0x47;
        p[1] = 0x01;
        p[2] = 0x00;
        p[3] = 0x20;
        p[4] = 183;
        p[5] = 0x10 | 0x80;
        p[6] = (pcr >> 25) as u8;
        p[7] = (pcr >> 17) as u8;
        p[8] = (pcr >> 9) as u8;
        p[9] = (pcr >> 1) as u8;
        p[10] = (((pcr & 1) << 7) as u8) | 0x7E;
        p[11] = 0x2A;
        p
    }

    #[test]
    fn test_parse_header() {
        let data = [0x47, 0x41, 0x01, 0xB7];
        let header = TsHeader::parse(&data).unwrap();
        assert!(header.payload_unit_start);
        assert!(!header.transport_error);
        assert_eq!(header.pid, 0x101);
        assert_eq!(header.scrambling_control, 2);
        assert!(header.is_scrambled());
        assert!(header.adaptation_field_exists);
        assert!(header.contains_payload);
        assert_eq!(header.continuity_counter, 7);

        assert!(TsHeader::parse(&[0x46, 0, 0, 0]).is_err());
        assert!(TsHeader::parse(&[0x47, 0]).is_err());
    }

    #[test]
    fn test_pcr_and_adaptation() {
        let pcr = 0x1_2345_6789;
        let packet = pcr_packet(pcr);
        assert_eq!(extract_pcr(&packet), Some(pcr));
        assert_eq!(payload_offset(&packet), 188);

        let field = AdaptationField::parse(&packet).unwrap().unwrap();
        assert_eq!(field.pcr, Some(pcr));
        assert_eq!(field.pcr_extension, Some(0x2A));
        assert!(field.discontinuity);

        let mut plain = packet.clone();
        plain[3] = 0x10;
        assert_eq!(extract_pcr(&plain), None);
        assert_eq!(payload_offset(&plain), 4);
        assert_eq!(AdaptationField::parse(&plain).unwrap(), None);
    }

    #[test]
    fn test_truncated_splice_countdown() {
        let mut packet = vec![0xFF; TS_PACKET_SIZE];
        packet[..6].copy_from_slice(&[0x47, 0x01, 0x00, 0x30, 1, 0x80 | 0x04]);
        let field = AdaptationField::parse(&packet).unwrap().unwrap();
        assert!(field.discontinuity);
        assert_eq!(field.splice_countdown, None);

        packet[4] = 2;
        packet[6] = 0xFE;
        let field = AdaptationField::parse(&packet).unwrap().unwrap();
        assert_eq!(field.splice_countdown, Some(-2));
    }
}
