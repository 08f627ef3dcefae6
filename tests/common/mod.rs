#![allow(dead_code)]

use std::io::Cursor;
use tsdemux::av::{Block, Epg, EsFormat, EsId, EsOut, Metadata};
use tsdemux::format::StreamSource;
use tsdemux::utils::Crc32Mpeg2;

pub const PACKET_SIZE: usize = 188;

/// Builds one 188-byte packet, padding with adaptation-field stuffing.
///
/// `adaptation` is the adaptation field body starting at the flags byte.
pub fn ts_packet(pid: u16, unit_start: bool, cc: u8, adaptation: &[u8], payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= 184);
    debug_assert!(pid < 0x2000, "pid {:#x} exceeds 13 bits", pid);
    let mut p = Vec::with_capacity(PACKET_SIZE);
    p.push(0x47);
    p.push((if unit_start { 0x40 } else { 0 }) | ((pid >> 8) as u8 & 0x1F));
    p.push(pid as u8);

    let space = 184 - payload.len();
    let has_adaptation = space > 0;
    let control = match (has_adaptation, payload.is_empty()) {
        (true, true) => 0x20,
        (true, false) => 0x30,
        (false, _) => 0x10,
    };
    p.push(control | (cc & 0x0F));

    if has_adaptation {
        let length = space - 1;
        p.push(length as u8);
        if length > 0 {
            let mut body = if adaptation.is_empty() {
                vec![0x00]
            } else {
                adaptation.to_vec()
            };
            body.resize(length, 0xFF);
            p.extend_from_slice(&body);
        }
    }
    p.extend_from_slice(payload);
    assert_eq!(p.len(), PACKET_SIZE);
    p
}

pub fn null_packet() -> Vec<u8> {
    ts_packet(0x1FFF, false, 0, &[], &[0xFF; 184])
}

/// Adaptation-only packet carrying `pcr` (90 kHz base).
pub fn pcr_packet(pid: u16, cc: u8, pcr: i64) -> Vec<u8> {
    let base = pcr & 0x1_FFFF_FFFF;
    let adaptation = [
        0x10,
        (base >> 25) as u8,
        (base >> 17) as u8,
        (base >> 9) as u8,
        (base >> 1) as u8,
        ((base & 1) << 7) as u8 | 0x7E,
        0x00,
    ];
    ts_packet(pid, false, cc, &adaptation, &[])
}

/// Long-form section (`current_next` set, single section) with its CRC.
pub fn section(table_id: u8, extension: u16, version: u8, body: &[u8]) -> Vec<u8> {
    let length = 5 + body.len() + 4;
    let mut s = vec![
        table_id,
        0xB0 | ((length >> 8) as u8 & 0x0F),
        length as u8,
        (extension >> 8) as u8,
        extension as u8,
        0xC1 | ((version & 0x1F) << 1),
        0x00,
        0x00,
    ];
    s.extend_from_slice(body);
    let crc = Crc32Mpeg2::new().calculate(&s);
    s.extend_from_slice(&crc.to_be_bytes());
    s
}

/// Single-packet PSI carriage with a zero pointer field.
pub fn psi_packet(pid: u16, cc: u8, section: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x00];
    payload.extend_from_slice(section);
    payload.resize(184, 0xFF);
    ts_packet(pid, true, cc, &[], &payload)
}

/// PAT listing `(program_number, pmt_pid)` pairs.
pub fn pat(version: u8, programs: &[(u16, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    for &(number, pid) in programs {
        debug_assert!(pid < 0x2000, "pmt pid {:#x} exceeds 13 bits", pid);
        body.extend_from_slice(&number.to_be_bytes());
        body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
    }
    section(0x00, 1, version, &body)
}

/// PMT listing `(stream_type, pid)` pairs without descriptors.
pub fn pmt(program: u16, version: u8, pcr_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
    debug_assert!(pcr_pid < 0x2000);
    let mut body = Vec::new();
    body.extend_from_slice(&(0xE000 | pcr_pid).to_be_bytes());
    body.extend_from_slice(&[0xF0, 0x00]);
    for &(stream_type, pid) in streams {
        debug_assert!(pid < 0x2000, "es pid {:#x} exceeds 13 bits", pid);
        body.push(stream_type);
        body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
        body.extend_from_slice(&[0xF0, 0x00]);
    }
    section(0x02, program, version, &body)
}

/// SDT with one service carrying a service descriptor.
pub fn sdt(network_id: u16, service_id: u16, provider: &[u8], name: &[u8]) -> Vec<u8> {
    let mut descriptor = vec![0x48, 0, 0x01, provider.len() as u8];
    descriptor.extend_from_slice(provider);
    descriptor.push(name.len() as u8);
    descriptor.extend_from_slice(name);
    descriptor[1] = (descriptor.len() - 2) as u8;

    let mut body = network_id.to_be_bytes().to_vec();
    body.push(0xFF);
    body.extend_from_slice(&service_id.to_be_bytes());
    body.push(0xFC);
    // running status 4, free CA off
    body.extend_from_slice(&(0x8000 | descriptor.len() as u16).to_be_bytes());
    body.extend_from_slice(&descriptor);
    section(0x42, 1, 0, &body)
}

/// Descriptor with `tag` around `body`.
pub fn descriptor(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut d = vec![tag, body.len() as u8];
    d.extend_from_slice(body);
    d
}

pub fn short_event(language: &[u8; 3], name: &[u8], text: &[u8]) -> Vec<u8> {
    let mut body = language.to_vec();
    body.push(name.len() as u8);
    body.extend_from_slice(name);
    body.push(text.len() as u8);
    body.extend_from_slice(text);
    descriptor(0x4D, &body)
}

/// Extended event descriptor without items.
pub fn extended_event(number: u8, last: u8, language: &[u8; 3], text: &[u8]) -> Vec<u8> {
    let mut body = vec![(number << 4) | (last & 0x0F)];
    body.extend_from_slice(language);
    body.push(0);
    body.push(text.len() as u8);
    body.extend_from_slice(text);
    descriptor(0x4E, &body)
}

pub fn parental_rating(country: &[u8; 3], rating: u8) -> Vec<u8> {
    let mut body = country.to_vec();
    body.push(rating);
    descriptor(0x55, &body)
}

/// One EIT event: MJD + BCD start, BCD duration, running status.
pub fn eit_event(id: u16, start: [u8; 5], duration: [u8; 3], running: u8, descriptors: &[Vec<u8>]) -> Vec<u8> {
    let loop_bytes: Vec<u8> = descriptors.concat();
    let mut e = id.to_be_bytes().to_vec();
    e.extend_from_slice(&start);
    e.extend_from_slice(&duration);
    e.extend_from_slice(&(((running as u16) << 13) | loop_bytes.len() as u16).to_be_bytes());
    e.extend_from_slice(&loop_bytes);
    e
}

/// EIT present/following section for `service_id`.
pub fn eit_pf(service_id: u16, version: u8, events: &[Vec<u8>]) -> Vec<u8> {
    let mut body = vec![0x00, 0x01, 0x00, 0x01, 0x00, 0x4E];
    for event in events {
        body.extend_from_slice(event);
    }
    section(0x4E, service_id, version, &body)
}

/// TDT carrying an MJD + BCD UTC time (short section, no CRC).
pub fn tdt(utc: [u8; 5]) -> Vec<u8> {
    let mut s = vec![0x70, 0x70, 0x05];
    s.extend_from_slice(&utc);
    s
}

fn encode_pts(pts: i64) -> [u8; 5] {
    [
        0x21 | ((pts >> 29) & 0x0E) as u8,
        (pts >> 22) as u8,
        ((pts >> 14) & 0xFE) as u8 | 1,
        (pts >> 7) as u8,
        ((pts << 1) & 0xFE) as u8 | 1,
    ]
}

/// PES packet with an explicit length and an optional PTS.
pub fn pes(stream_id: u8, pts: Option<i64>, payload: &[u8]) -> Vec<u8> {
    let header: Vec<u8> = match pts {
        Some(pts) => {
            let mut h = vec![0x80, 0x80, 0x05];
            h.extend_from_slice(&encode_pts(pts));
            h
        }
        None => vec![0x80, 0x00, 0x00],
    };
    let mut p = vec![0x00, 0x00, 0x01, stream_id];
    p.extend_from_slice(&((header.len() + payload.len()) as u16).to_be_bytes());
    p.extend_from_slice(&header);
    p.extend_from_slice(payload);
    p
}

/// Splits a PES into packets, continuity counters starting at `cc`.
pub fn pes_packets(pid: u16, cc: u8, pes: &[u8]) -> Vec<Vec<u8>> {
    pes.chunks(184)
        .enumerate()
        .map(|(i, chunk)| ts_packet(pid, i == 0, cc.wrapping_add(i as u8), &[], chunk))
        .collect()
}

pub fn concat(packets: impl IntoIterator<Item = Vec<u8>>) -> Vec<u8> {
    packets.into_iter().flatten().collect()
}

pub async fn source(data: Vec<u8>) -> StreamSource<Cursor<Vec<u8>>> {
    StreamSource::open(Cursor::new(data)).await.unwrap()
}

/// Sink recording every call.
#[derive(Debug, Default)]
pub struct Recorder {
    next: u64,
    pub added: Vec<(EsId, EsFormat)>,
    pub removed: Vec<EsId>,
    pub blocks: Vec<(EsId, Block)>,
    pub pcrs: Vec<(i32, i64)>,
    pub meta: Vec<(i32, Metadata)>,
    pub epg: Vec<(i32, Epg)>,
    pub deleted_groups: Vec<i32>,
}

impl Recorder {
    pub fn id_of(&self, pid: u16) -> Option<EsId> {
        self.added
            .iter()
            .rev()
            .find(|(_, f)| f.id == Some(pid))
            .map(|(id, _)| *id)
    }

    pub fn blocks_for(&self, id: EsId) -> Vec<&Block> {
        self.blocks
            .iter()
            .filter(|(i, _)| *i == id)
            .map(|(_, b)| b)
            .collect()
    }
}

impl EsOut for Recorder {
    fn add(&mut self, format: &EsFormat) -> Option<EsId> {
        self.next += 1;
        let id = EsId(self.next);
        self.added.push((id, format.clone()));
        Some(id)
    }

    fn remove(&mut self, id: EsId) {
        self.removed.push(id);
    }

    fn send(&mut self, id: EsId, block: Block) {
        self.blocks.push((id, block));
    }

    fn set_group_pcr(&mut self, group: i32, pcr: i64) {
        self.pcrs.push((group, pcr));
    }

    fn set_group_meta(&mut self, group: i32, meta: &Metadata) {
        self.meta.push((group, meta.clone()));
    }

    fn set_group_epg(&mut self, group: i32, epg: &Epg) {
        self.epg.push((group, epg.clone()));
    }

    fn del_group(&mut self, group: i32) {
        self.deleted_groups.push(group);
    }
}
