//! PSI/SI section reassembly from transport packets and table completion tracking.

use super::parser::payload_offset;
use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::Crc32Mpeg2;
use bytes::{Bytes, BytesMut};
use log::{trace, warn};
use std::collections::HashMap;

/// Largest private section (ISO/IEC 13818-1 2.4.4.11).
const MAX_SECTION_SIZE: usize = 4096;

/// Rebuilds complete sections from the packets of one PSI PID.
#[derive(Debug)]
pub struct SectionAssembler {
    buffer: BytesMut,
    active: bool,
    last_cc: Option<u8>,
    crc: Crc32Mpeg2,
}

impl SectionAssembler {
    /// Creates an idle assembler waiting for a unit start.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            active: false,
            last_cc: None,
            crc: Crc32Mpeg2::new(),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.active = false;
    }

    /// Feeds one 188-byte packet; returns the sections it completed, CRC checked.
    pub fn push(&mut self, packet: &[u8]) -> Vec<Bytes> {
        let mut sections = Vec::new();
        if packet.len() < TS_HEADER_SIZE {
            return sections;
        }
        if packet[1] & 0x80 != 0 {
            trace!("transport error on PSI packet");
            self.reset();
            return sections;
        }
        if packet[3] & 0x10 == 0 {
            return sections;
        }

        let cc = packet[3] & 0x0F;
        if let Some(last) = self.last_cc {
            if cc == last {
                return sections;
            }
            if cc != (last + 1) & 0x0F {
                trace!("PSI continuity break {} -> {}", last, cc);
                self.reset();
            }
        }
        self.last_cc = Some(cc);

        let offset = payload_offset(packet);
        if offset >= packet.len() {
            return sections;
        }
        let payload = &packet[offset..];

        if packet[1] & 0x40 != 0 {
            let pointer = payload[0] as usize;
            let rest = &payload[1..];
            if pointer > rest.len() {
                warn!("invalid pointer field {}", pointer);
                self.reset();
                return sections;
            }
            if self.active {
                self.buffer.extend_from_slice(&rest[..pointer]);
                self.drain(&mut sections);
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&rest[pointer..]);
            self.active = true;
            self.drain(&mut sections);
        } else if self.active {
            self.buffer.extend_from_slice(payload);
            self.drain(&mut sections);
        }

        sections
    }

    fn drain(&mut self, sections: &mut Vec<Bytes>) {
        while self.active && self.buffer.len() >= 3 {
            if self.buffer[0] == 0xFF {
                self.reset();
                break;
            }
            let length = 3 + ((((self.buffer[1] & 0x0F) as usize) << 8) | self.buffer[2] as usize);
            if length > MAX_SECTION_SIZE {
                warn!("oversized section ({} bytes)", length);
                self.reset();
                break;
            }
            if self.buffer.len() < length {
                break;
            }

            let section = self.buffer.split_to(length).freeze();
            let has_crc = section[1] & 0x80 != 0 || section[0] == TABLE_ID_TOT;
            if has_crc && !self.crc.verify_section(&section) {
                warn!("bad CRC on section table_id 0x{:02x}", section[0]);
                continue;
            }
            sections.push(section);
        }
    }
}

impl Default for SectionAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed section header with its table-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Table id
    pub table_id: u8,
    /// Section syntax indicator (long form)
    pub syntax: bool,
    /// table_id_extension (transport stream id, program number, service id)
    pub extension: u16,
    /// Version number, 0..=31
    pub version: u8,
    /// Table is applicable now rather than next
    pub current_next: bool,
    /// Section number
    pub number: u8,
    /// Last section number of the table
    pub last_number: u8,
    /// Bytes after the header, CRC excluded
    pub payload: Bytes,
}

impl Section {
    /// Parses one raw section. CRC checking is the assembler's job.
    pub fn parse(raw: Bytes) -> Result<Self> {
        if raw.len() < 3 {
            return Err(DemuxError::Parser("section too short".into()));
        }
        let table_id = raw[0];
        let syntax = raw[1] & 0x80 != 0;

        if !syntax {
            let end = if table_id == TABLE_ID_TOT {
                raw.len().saturating_sub(4).max(3)
            } else {
                raw.len()
            };
            return Ok(Self {
                table_id,
                syntax,
                extension: 0,
                version: 0,
                current_next: true,
                number: 0,
                last_number: 0,
                payload: raw.slice(3..end),
            });
        }

        if raw.len() < 12 {
            return Err(DemuxError::Parser("long section too short".into()));
        }
        Ok(Self {
            table_id,
            syntax,
            extension: u16::from_be_bytes([raw[3], raw[4]]),
            version: (raw[5] >> 1) & 0x1F,
            current_next: raw[5] & 0x01 != 0,
            number: raw[6],
            last_number: raw[7],
            payload: raw.slice(8..raw.len() - 4),
        })
    }
}

/// A complete table: every section 0..=last of one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table id shared by all sections
    pub table_id: u8,
    /// table_id_extension shared by all sections
    pub extension: u16,
    /// Version shared by all sections
    pub version: u8,
    /// current_next_indicator of the table
    pub current_next: bool,
    /// Sections ordered by section number
    pub sections: Vec<Section>,
}

impl Table {
    fn single(section: Section) -> Self {
        Self {
            table_id: section.table_id,
            extension: section.extension,
            version: section.version,
            current_next: section.current_next,
            sections: vec![section],
        }
    }

    /// Section payloads in section-number order.
    pub fn payloads(&self) -> impl Iterator<Item = &Bytes> {
        self.sections.iter().map(|s| &s.payload)
    }
}

impl From<Section> for Table {
    fn from(section: Section) -> Self {
        Table::single(section)
    }
}

#[derive(Debug)]
struct PendingTable {
    version: u8,
    sections: Vec<Option<Section>>,
}

/// How completed sections are grouped into tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectMode {
    /// Wait for every section of a version (PAT, PMT, SDT)
    WholeTable,
    /// Deliver each new section on its own (segmented EIT)
    PerSection,
}

/// Groups sections per `(table_id, extension)` and reports each new version once.
#[derive(Debug)]
pub struct TableCollector {
    mode: CollectMode,
    pending: HashMap<(u8, u16), PendingTable>,
    delivered: HashMap<(u8, u16), (u8, Vec<u8>)>,
}

impl TableCollector {
    /// Creates an empty collector.
    pub fn new(mode: CollectMode) -> Self {
        Self {
            mode,
            pending: HashMap::new(),
            delivered: HashMap::new(),
        }
    }

    /// Adds a section and returns the table it completes, if any.
    pub fn push(&mut self, section: Section) -> Option<Table> {
        if !section.syntax {
            return Some(Table::single(section));
        }
        if section.number > section.last_number {
            return None;
        }
        let key = (section.table_id, section.extension);

        match self.mode {
            CollectMode::PerSection => {
                let entry = self
                    .delivered
                    .entry(key)
                    .or_insert_with(|| (section.version, Vec::new()));
                if entry.0 != section.version {
                    *entry = (section.version, Vec::new());
                }
                if entry.1.contains(&section.number) {
                    return None;
                }
                if section.current_next {
                    entry.1.push(section.number);
                }
                Some(Table::single(section))
            }
            CollectMode::WholeTable => {
                let total = section.last_number as usize + 1;
                let pending = self.pending.entry(key).or_insert_with(|| PendingTable {
                    version: section.version,
                    sections: vec![None; total],
                });
                if pending.version != section.version || pending.sections.len() != total {
                    *pending = PendingTable {
                        version: section.version,
                        sections: vec![None; total],
                    };
                }
                let version = section.version;
                let current_next = section.current_next;
                let number = section.number as usize;
                pending.sections[number] = Some(section);
                if pending.sections.iter().any(Option::is_none) {
                    return None;
                }

                let sections: Vec<Section> = self
                    .pending
                    .remove(&key)?
                    .sections
                    .into_iter()
                    .flatten()
                    .collect();
                if current_next {
                    if matches!(self.delivered.get(&key), Some((v, _)) if *v == version) {
                        return None;
                    }
                    self.delivered.insert(key, (version, Vec::new()));
                }
                Some(Table {
                    table_id: key.0,
                    extension: key.1,
                    version,
                    current_next,
                    sections,
                })
            }
        }
    }
}
