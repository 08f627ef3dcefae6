//! Per-PID reassembly of PES packets and private sections, and their delivery.

use super::opus::split_access_units;
use super::parser::{payload_offset, AdaptationField, TsHeader};
use super::pes::PesHeader;
use super::pid::{DataType, CC_UNSET};
use super::types::*;
use super::TsDemuxer;
use crate::av::{codecs, Block, EsId, EsOut, BLOCK_FLAG_CORRUPTED};
use crate::format::ByteSource;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, warn};

/// Teletext without PTS is presented this long after the last PCR (µs).
const TELETEXT_PCR_DELAY: i64 = 40_000;

/// Outcome of the continuity counter check for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// Counter advanced by one on a packet carrying payload
    InOrder,
    /// First packet seen on the PID
    First,
    /// Same counter again (duplicate or adaptation-only packet)
    Repeated,
    /// Jump announced by the discontinuity indicator
    Signalled,
    /// Unexpected jump
    Broken {
        /// Counter that should have arrived
        expected: u8,
    },
}

/// Classifies `cc` against the last counter seen on the PID.
///
/// The counter only advances on packets with payload, so an adaptation-only
/// packet bumping it is a break. Whatever the outcome, the PID adopts `cc`
/// as its new counter.
pub fn check_continuity(last: u8, cc: u8, has_payload: bool, signalled: bool) -> Continuity {
    let diff = cc.wrapping_sub(last) & 0x0F;
    if has_payload && diff == 1 {
        Continuity::InOrder
    } else if last == CC_UNSET {
        Continuity::First
    } else if diff == 0 {
        Continuity::Repeated
    } else if signalled {
        Continuity::Signalled
    } else {
        Continuity::Broken {
            expected: (last + 1) & 0x0F,
        }
    }
}

/// Presentation time of an SCTE-27 subtitle section, in 90 kHz ticks.
///
/// The section carries a 32-bit truncated display time; it is unfolded
/// against `date`, the program's last PCR. Immediate or segmented messages
/// keep `date`.
pub fn scte27_presentation_time(section: &[u8], date: i64) -> i64 {
    if section.len() <= 9 || section[0] != TABLE_ID_SCTE27 {
        return date;
    }

    let (index, offset) = if section[3] & 0x40 != 0 {
        ((((section[7] & 0x0F) as u16) << 8) | section[8] as u16, 9)
    } else {
        (0, 4)
    };
    if index != 0 || section.len() <= offset + 8 || section[offset + 3] & 0x40 != 0 {
        return date;
    }

    let display_in = u32::from_be_bytes([
        section[offset + 4],
        section[offset + 5],
        section[offset + 6],
        section[offset + 7],
    ]) as i64;
    if display_in < date {
        display_in + (1 << 32)
    } else {
        display_in
    }
}

fn expected_size(data_type: DataType, payload: &[u8]) -> usize {
    match data_type {
        DataType::Pes if payload.len() > 6 => {
            match u16::from_be_bytes([payload[4], payload[5]]) as usize {
                0 => 0,
                len => len + 6,
            }
        }
        DataType::TableSection if payload.len() > 3 && payload[0] != 0xFF => {
            3 + ((((payload[1] & 0x0F) as usize) << 8) | payload[2] as usize)
        }
        _ => 0,
    }
}

fn with_nul(data: &[u8], limit: Option<usize>) -> Bytes {
    let len = match limit {
        Some(limit) if limit > 0 => data.len().min(limit),
        _ => data.len(),
    };
    let mut buf = BytesMut::with_capacity(len + 1);
    buf.put_slice(&data[..len]);
    buf.put_u8(0);
    buf.freeze()
}

impl<S: ByteSource, O: EsOut> TsDemuxer<S, O> {
    /// Feeds one packet of an elementary stream PID.
    ///
    /// Returns true when a unit was completed and handed to the sink.
    pub(crate) fn gather(&mut self, mut packet: BytesMut) -> bool {
        // Reed-Solomon parity of 204-byte packets is ignored
        packet.truncate(TS_PACKET_SIZE);
        let header = match TsHeader::parse(&packet) {
            Ok(header) => header,
            Err(e) => {
                debug!("{}", e);
                return false;
            }
        };
        let pid = header.pid;
        let unit_start = header.payload_unit_start;
        let scrambled = header.is_scrambled();
        let cc = header.continuity_counter;

        if header.transport_error {
            debug!("transport_error_indicator set (pid={})", pid);
            if let Some(es) = self.pids.get_mut(pid).stream_mut() {
                if es.is_gathering() {
                    es.corrupted = true;
                }
            }
        }

        self.csa.decrypt(&mut packet);

        let skip = payload_offset(&packet);
        let adaptation = match AdaptationField::parse(&packet) {
            Ok(field) => field,
            Err(e) => {
                debug!("{} (pid={})", e, pid);
                None
            }
        };
        let discontinuity = adaptation.as_ref().is_some_and(|af| af.discontinuity);

        let slot = self.pids.get_mut(pid);
        let Some(es) = slot.stream() else {
            return false;
        };
        if discontinuity && es.is_gathering() {
            warn!("discontinuity indicator (pid={}) ", pid);
        }
        match check_continuity(slot.cc, cc, header.contains_payload, discontinuity) {
            Continuity::First => warn!("first packet for pid={} cc=0x{:x}", pid, cc),
            Continuity::Broken { expected } => {
                warn!(
                    "discontinuity received 0x{:x} instead of 0x{:x} (pid={})",
                    cc, expected, pid
                );
                if let Some(es) = slot.stream_mut() {
                    if es.is_gathering() && es.data_type != DataType::TableSection {
                        es.corrupted = true;
                    }
                }
            }
            _ => {}
        }
        slot.cc = cc;

        self.handle_pcr(pid, adaptation.and_then(|af| af.pcr));

        let slot = self.pids.get_mut(pid);
        let Some(primary) = slot.stream().and_then(|es| es.primary.id) else {
            return false;
        };
        if skip >= TS_PACKET_SIZE {
            return false;
        }

        if slot.scrambled != scrambled {
            warn!(
                "scrambled state changed on pid {} ({}->{})",
                pid, slot.scrambled as u8, scrambled as u8
            );
            slot.scrambled = scrambled;
            let extra: Vec<EsId> = slot
                .stream()
                .map(|es| es.extra.iter().filter_map(|o| o.id).collect())
                .unwrap_or_default();
            for id in extra {
                self.out.set_scrambled(id, scrambled);
            }
            self.out.set_scrambled(primary, scrambled);
        }

        let mut payload = &packet[skip..];
        let mut delivered = false;

        if unit_start {
            let previous = {
                let Some(es) = self.pids.get_mut(pid).stream_mut() else {
                    return false;
                };
                if es.data_type == DataType::TableSection && !payload.is_empty() {
                    let pointer = (payload[0] as usize).min(payload.len() - 1);
                    es.append(&payload[1..1 + pointer]);
                    payload = &payload[1 + pointer..];
                }
                es.take()
            };
            if let Some((data, corrupted)) = previous {
                self.parse_unit(pid, data, corrupted);
                delivered = true;
            }

            let completed = {
                let Some(es) = self.pids.get_mut(pid).stream_mut() else {
                    return delivered;
                };
                es.begin(payload, expected_size(es.data_type, payload));
                if es.is_complete() {
                    es.take()
                } else {
                    None
                }
            };
            if let Some((data, corrupted)) = completed {
                self.parse_unit(pid, data, corrupted);
                delivered = true;
            }
        } else {
            let completed = {
                let Some(es) = self.pids.get_mut(pid).stream_mut() else {
                    return false;
                };
                // joined mid-unit: nothing to append to
                if !es.append(payload) {
                    return false;
                }
                if es.is_complete() {
                    es.take()
                } else {
                    None
                }
            };
            if let Some((data, corrupted)) = completed {
                self.parse_unit(pid, data, corrupted);
                delivered = true;
            }
        }

        delivered
    }

    fn parse_unit(&mut self, pid: u16, data: BytesMut, corrupted: bool) {
        let Some(es) = self.pids.get(pid).stream() else {
            return;
        };
        match es.data_type {
            DataType::Pes => self.parse_pes(pid, data.freeze(), corrupted),
            DataType::TableSection => self.parse_table_section(pid, data.freeze(), corrupted),
        }
    }

    /// Last PCR of the program that declared `pid`.
    fn owner_pcr(&self, pid: u16) -> Option<i64> {
        let slot = self.pids.get(pid);
        let owner = slot.owner?;
        self.programs
            .on_pmt(owner)
            .filter(|p| p.number == slot.owner_number)
            .find_map(|p| p.pcr_value)
    }

    fn parse_pes(&mut self, pid: u16, data: Bytes, corrupted: bool) {
        let slot = self.pids.get(pid);
        let Some(es) = slot.stream() else {
            return;
        };
        if slot.scrambled {
            return;
        }

        let codec = es.primary.format.codec;
        let header = match PesHeader::parse(&data, codec, es.mpeg4desc.as_ref()) {
            Ok(header) => header,
            Err(e) => {
                warn!("{} (pid: {})", e, pid);
                return;
            }
        };
        if header.skip >= data.len() {
            warn!("empty pes");
            return;
        }

        let Some(primary) = es.primary.id else {
            return;
        };
        let extra: Vec<EsId> = es.extra.iter().filter_map(|o| o.id).collect();
        let group = slot.owner_number;

        let payload = data.slice(header.skip..);
        let mut block = Block::new(payload)
            .with_pts(header.pts.map(ticks_to_us))
            .with_dts(header.dts.map(ticks_to_us))
            .with_length(ticks_to_us(header.length));

        let blocks = if codec == codecs::SUBT {
            block.data = with_nul(&block.data, header.unit_size);
            vec![block]
        } else if codec == codecs::TELETEXT {
            if block.pts.is_none() {
                // EN 300 472 annex A: missing PTS, present 40ms after the PCR
                block.pts = self
                    .owner_pcr(pid)
                    .map(|pcr| ticks_to_us(pcr) + TELETEXT_PCR_DELAY);
            }
            vec![block]
        } else if codec == codecs::ARIB_A || codec == codecs::ARIB_C {
            if block.pts.is_none() {
                block.data = with_nul(&block.data, header.unit_size);
            }
            vec![block]
        } else if codec == codecs::OPUS {
            split_access_units(&block)
        } else {
            vec![block]
        };

        for mut block in blocks {
            if corrupted {
                block = block.with_flags(BLOCK_FLAG_CORRUPTED);
            }
            for &id in &extra {
                self.out.send(id, block.clone());
            }
            if !self.config.trust_pcr {
                if let Some(pts) = block.pts {
                    self.out.set_group_pcr(group, pts);
                }
            }
            self.out.send(primary, block);
        }
    }

    fn parse_table_section(&mut self, pid: u16, data: Bytes, corrupted: bool) {
        let Some(es) = self.pids.get(pid).stream() else {
            return;
        };
        let Some(primary) = es.primary.id else {
            return;
        };
        let codec = es.primary.format.codec;

        let mut block = Block::new(data);
        if let Some(mut date) = self.owner_pcr(pid) {
            if codec == codecs::SCTE27 {
                date = scte27_presentation_time(&block.data, date);
            }
            let ts = Some(ticks_to_us(date));
            block = block.with_pts(ts).with_dts(ts);
        }
        if corrupted {
            block = block.with_flags(BLOCK_FLAG_CORRUPTED);
        }
        self.out.send(primary, block);
    }
}
