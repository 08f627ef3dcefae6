//! Program Map Table and user-supplied PMTs.

use super::es_setup::{fill_format, EsSetup, ResolvedStream};
use super::iod::Iod;
use super::PsiContext;
use crate::av::{EsFormat, EsOut};
use crate::config::{AribMode, UserPmt, UserStream};
use crate::error::Result;
use crate::format::ts::descriptor::{self as desc, parse_descriptors, Descriptor};
use crate::format::ts::pid::{ElementaryStream, EsOutput, PidRole};
use crate::format::ts::program::Program;
use crate::format::ts::section::Table;
use crate::format::ts::types::*;
use crate::format::ts::TsDemuxer;
use crate::format::ByteSource;
use log::{debug, warn};

/// Program number of a user PMT declared without one.
pub const USER_PMT_NUMBER: i32 = 0;

/// One elementary stream entry of a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    /// ISO/IEC 13818-1 stream type
    pub stream_type: u8,
    /// Elementary stream PID
    pub pid: u16,
    /// ES info descriptors
    pub descriptors: Vec<Descriptor>,
}

/// Decoded PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt {
    /// Program number
    pub program_number: u16,
    /// Version number
    pub version: u8,
    /// current_next_indicator
    pub current_next: bool,
    /// PCR PID, 0x1FFF when the program has none
    pub pcr_pid: u16,
    /// Program info descriptors
    pub descriptors: Vec<Descriptor>,
    /// Elementary streams in table order
    pub streams: Vec<PmtStream>,
}

impl Pmt {
    /// Returns `None` when the first section is too short for the fixed header.
    pub fn parse(table: &Table) -> Option<Self> {
        let mut pcr_pid = None;
        let mut descriptors = Vec::new();
        let mut streams = Vec::new();

        for payload in table.payloads() {
            if payload.len() < 4 {
                continue;
            }
            pcr_pid.get_or_insert(u16::from_be_bytes([payload[0] & 0x1F, payload[1]]));
            let info_len = (u16::from_be_bytes([payload[2] & 0x0F, payload[3]]) as usize).min(payload.len() - 4);
            descriptors.extend(parse_descriptors(&payload[4..4 + info_len]));

            let mut p = &payload[4 + info_len..];
            while p.len() >= 5 {
                let es_len = (u16::from_be_bytes([p[3] & 0x0F, p[4]]) as usize).min(p.len() - 5);
                streams.push(PmtStream {
                    stream_type: p[0],
                    pid: u16::from_be_bytes([p[1] & 0x1F, p[2]]),
                    descriptors: parse_descriptors(&p[5..5 + es_len]),
                });
                p = &p[5 + es_len..];
            }
        }

        Some(Self {
            program_number: table.extension,
            version: table.version,
            current_next: table.current_next,
            pcr_pid: pcr_pid?,
            descriptors,
            streams,
        })
    }
}

/// Human readable name of an ISO/IEC 13818-1 stream type.
pub fn stream_type_description(stream_type: u8) -> &'static str {
    match stream_type {
        0x00 => "ISO/IEC Reserved",
        0x01 => "ISO/IEC 11172 Video",
        0x02 => "ISO/IEC 13818-2 Video or ISO/IEC 11172-2 constrained parameter video stream",
        0x03 => "ISO/IEC 11172 Audio",
        0x04 => "ISO/IEC 13818-3 Audio",
        0x05 => "ISO/IEC 13818-1 private_sections",
        0x06 => "ISO/IEC 13818-1 PES packets containing private data",
        0x07 => "ISO/IEC 13522 MHEG",
        0x08 => "ISO/IEC 13818-1 Annex A DSM CC",
        0x09 => "ITU-T Rec. H.222.1",
        0x0A => "ISO/IEC 13818-6 type A",
        0x0B => "ISO/IEC 13818-6 type B",
        0x0C => "ISO/IEC 13818-6 type C",
        0x0D => "ISO/IEC 13818-6 type D",
        0x0E => "ISO/IEC 13818-1 auxiliary",
        0x0F..=0x7F => "ISO/IEC 13818-1 Reserved",
        _ => "User Private",
    }
}

/// ARIB broadcasts carry the ARIB CA system plus the 0xF6 and 0xC1 descriptors.
fn is_arib_program(descriptors: &[Descriptor]) -> bool {
    let ca = descriptors
        .iter()
        .filter(|d| d.tag == DESC_CA)
        .any(|d| desc::ca_system_id(d) == Some(0x05));
    ca && desc::find(descriptors, 0xF6).is_some() && desc::find(descriptors, 0xC1).is_some()
}

/// Whether an existing stream can stay in place instead of being re-added.
fn is_reusable(old: &ElementaryStream, new: &ResolvedStream) -> bool {
    let format = &old.primary.format;
    format.codec == new.primary.codec
        && format.extra == new.primary.extra
        && old.extra.len() == new.extra.len()
        && format.language == new.primary.language
}

impl<S: ByteSource, O: EsOut> TsDemuxer<S, O> {
    pub(crate) fn handle_pmt(&mut self, table: &Table) {
        let Some(pmt) = Pmt::parse(table) else {
            warn!("truncated PMT dropped");
            return;
        };
        debug!("PMT received");

        let number = pmt.program_number as i32;
        let Some(program) = self
            .programs
            .find(number)
            .filter(|p| p.number != USER_PMT_NUMBER)
        else {
            warn!("unreferenced program (broken stream)");
            return;
        };
        if program.version.is_some() && (!pmt.current_next || program.version == Some(pmt.version)) {
            return;
        }
        let pmt_pid = program.pmt_pid;

        let mut clean: Vec<u16> = self
            .pids
            .iter()
            .filter(|p| p.stream().is_some() && p.owner == Some(pmt_pid) && p.owner_number == number)
            .map(|p| p.pid)
            .collect();

        debug!(
            "new PMT program number={} version={} pid_pcr={}",
            pmt.program_number, pmt.version, pmt.pcr_pid
        );
        if let Some(program) = self.programs.find_mut(number) {
            program.iod = None;
            program.pcr_pid = Some(pmt.pcr_pid);
            program.version = Some(pmt.version);
        }

        self.validate_dvb_meta(pmt.pcr_pid);
        let selected = self.selection.is_selected(number);
        if selected {
            self.set_pid_filter(pmt.pcr_pid, true).ok();
        }

        if self.arib == AribMode::Auto && is_arib_program(&pmt.descriptors) {
            debug!("ARIB broadcast detected");
            self.arib = AribMode::Enabled;
        }

        let mut hdmv = false;
        let mut iod = None;
        for d in &pmt.descriptors {
            match d.tag {
                DESC_IOD => {
                    debug!(" * PMT descriptor : IOD (0x1d)");
                    iod = Some(Iod::parse(&d.data));
                }
                DESC_CA => debug!(
                    " * PMT descriptor : CA (0x9) SysID 0x{:x}",
                    desc::ca_system_id(d).unwrap_or_default()
                ),
                DESC_REGISTRATION if d.data.len() != 4 => {
                    warn!(" * PMT invalid Registration Descriptor")
                }
                DESC_REGISTRATION => {
                    debug!(" * PMT descriptor : registration {}", String::from_utf8_lossy(&d.data));
                    if &d.data[..] == b"HDMV" || &d.data[..] == b"HDPR" {
                        hdmv = true;
                    }
                }
                0x0f => debug!(" * PMT descriptor : Private Data (0x0f)"),
                0xC1 => debug!(" * PMT descriptor : Digital copy control (0xC1)"),
                0x88 => debug!(" * descriptor : EACEM Simulcast HD"),
                other => debug!(" * PMT descriptor : unknown (0x{:x})", other),
            }
        }

        for es in &pmt.streams {
            let old = clean.iter().position(|&p| p == es.pid);
            self.validate_dvb_meta(es.pid);

            if old.is_none() && self.pids.get(es.pid).is_valid() {
                warn!(" * PMT error: pid={} already defined", es.pid);
                continue;
            }

            debug!(
                "  * pid={} type=0x{:x} {}",
                es.pid,
                es.stream_type,
                stream_type_description(es.stream_type)
            );
            for d in &es.descriptors {
                debug!("    - descriptor tag 0x{:x}", d.tag);
            }

            let setup = EsSetup {
                pid: es.pid,
                program_number: pmt.program_number,
                pcr_pid: Some(pmt.pcr_pid),
                hdmv,
                arib: self.arib == AribMode::Enabled,
                split_es: self.config.split_es,
                iod: iod.as_ref(),
            };
            let mut resolved = setup.resolve(es.stream_type, &es.descriptors);
            resolved.primary.group = number;
            for extra in &mut resolved.extra {
                extra.group = number;
            }

            let reuse = resolved.primary.is_known()
                && old.is_some()
                && self
                    .pids
                    .get(es.pid)
                    .stream()
                    .is_some_and(|stream| is_reusable(stream, &resolved));

            if reuse {
                debug!("   => pid {} keeps es fcc={}", es.pid, resolved.primary.codec);
            } else {
                let stream = self.create_stream(es.pid, resolved);
                if old.is_some() {
                    self.clean_pid(es.pid);
                }
                let slot = self.pids.get_mut(es.pid);
                slot.init(PidRole::Stream(Box::new(stream)), Some(pmt_pid));
                slot.owner_number = number;
            }
            if let Some(index) = old {
                clean.remove(index);
            }

            if let Some(ca) = desc::find(&es.descriptors, DESC_CA).and_then(desc::ca_system_id) {
                debug!("   * PMT descriptor : CA (0x9) SysID 0x{:x}", ca);
            }

            let has_output = self
                .pids
                .get(es.pid)
                .stream()
                .is_some_and(|s| s.primary.id.is_some());
            if selected && has_output {
                self.set_pid_filter(es.pid, true).ok();
            }
        }

        if let Some(program) = self.programs.find_mut(number) {
            program.iod = iod;
        }

        for pid in clean {
            if selected {
                self.set_pid_filter(pid, false).ok();
            }
            self.clean_pid(pid);
        }
    }

    /// Builds the stream for a resolved PMT entry and declares its outputs.
    fn create_stream(&mut self, pid: u16, resolved: ResolvedStream) -> ElementaryStream {
        let ResolvedStream {
            mut primary,
            extra,
            data_type,
            mpeg4desc,
        } = resolved;

        if !primary.is_known() {
            debug!("   => pid {} content is *unknown*", pid);
        } else {
            debug!("   => pid {} has now es fcc={}", pid, primary.codec);
            if self.config.es_id_pid {
                primary.id = Some(pid);
            }
        }

        let known = primary.is_known();
        let mut stream = ElementaryStream::new(primary);
        stream.data_type = data_type;
        stream.mpeg4desc = mpeg4desc;
        stream.extra = extra.into_iter().map(EsOutput::new).collect();

        if known {
            stream.primary.id = self.out.add(&stream.primary.format);
            self.pmt_es += stream.primary.id.is_some() as usize;
            for extra in &mut stream.extra {
                extra.id = self.out.add(&extra.format);
                self.pmt_es += extra.id.is_some() as usize;
            }
        }
        stream
    }

    /// Installs a PMT given through options instead of the stream.
    pub(crate) fn apply_user_pmt(&mut self, definition: &str) -> Result<()> {
        let user = UserPmt::parse(definition)?;
        let number = if user.program != 0 { user.program } else { USER_PMT_NUMBER };
        debug!("user pmt specified (pid={},number={})", user.pmt_pid, user.program);

        self.pids
            .get_mut(user.pmt_pid)
            .init(PidRole::Psi(Box::new(PsiContext::pmt())), None);
        let mut program = Program::new(number, user.pmt_pid);

        for entry in &user.entries {
            if entry.stream == UserStream::Pcr {
                program.pcr_pid = Some(entry.pid);
                continue;
            }
            if self.pids.get(entry.pid).is_valid() {
                continue;
            }
            if program.pcr_pid.is_none() {
                program.pcr_pid = Some(entry.pid);
            }

            let mut format = match &entry.stream {
                UserStream::Typed {
                    category,
                    codec: Some(codec),
                } => EsFormat::new(*category, *codec),
                UserStream::StreamType(stream_type) => fill_format(*stream_type),
                _ => EsFormat::default(),
            };
            format.group = user.program;
            if self.config.es_id_pid {
                format.id = Some(entry.pid);
            }

            let mut stream = ElementaryStream::new(format);
            if stream.primary.format.is_known() {
                debug!("  * es pid={} fcc={}", entry.pid, stream.primary.format.codec);
                stream.primary.id = self.out.add(&stream.primary.format);
                self.pmt_es += stream.primary.id.is_some() as usize;
            }
            self.pids
                .get_mut(entry.pid)
                .init(PidRole::Stream(Box::new(stream)), Some(user.pmt_pid));
        }

        self.user_pmt = true;
        self.programs.add(program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::codecs;
    use crate::format::ts::section::tests::long_section;
    use crate::format::ts::section::Section;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn table(body: &[u8]) -> Table {
        Table::from(Section::parse(Bytes::from(long_section(TABLE_ID_PMT, 1, 2, 0, 0, body))).unwrap())
    }

    #[test]
    fn test_parse_pmt() {
        let body = [
            0xE1, 0x01, 0xF0, 0x06, 0x05, 0x04, b'H', b'D', b'M', b'V', // pcr + registration
            0x1B, 0xE1, 0x01, 0xF0, 0x00, // h264
            0x06, 0xE1, 0x02, 0xF0, 0x03, 0x6A, 0x01, 0x00, // ac3
        ];
        let pmt = Pmt::parse(&table(&body)).unwrap();
        assert_eq!(pmt.program_number, 1);
        assert_eq!(pmt.version, 2);
        assert_eq!(pmt.pcr_pid, 0x101);
        assert_eq!(pmt.descriptors.len(), 1);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[1].pid, 0x102);
        assert_eq!(pmt.streams[1].descriptors[0].tag, DESC_AC3);
    }

    #[test]
    fn test_truncated_es_info() {
        let body = [0xE1, 0x01, 0xF0, 0x00, 0x02, 0xE1, 0x05, 0xF0, 0x40, 0x05];
        let pmt = Pmt::parse(&table(&body)).unwrap();
        assert_eq!(pmt.streams.len(), 1);
        assert!(pmt.streams[0].descriptors.is_empty());
    }

    #[test]
    fn test_arib_detection() {
        let d = |tag: u8, data: &[u8]| Descriptor {
            tag,
            data: Bytes::copy_from_slice(data),
        };
        let arib = [d(DESC_CA, &[0x00, 0x05, 0xE0, 0x10]), d(0xF6, &[]), d(0xC1, &[0])];
        assert!(is_arib_program(&arib));
        assert!(!is_arib_program(&arib[..2]));
    }

    #[test]
    fn test_reuse_rules() {
        let format = EsFormat::new(crate::av::EsCategory::Audio, codecs::A52).with_language("eng");
        let old = ElementaryStream::new(format.clone());
        let mut new = ResolvedStream {
            primary: format,
            extra: vec![],
            data_type: Default::default(),
            mpeg4desc: None,
        };
        assert!(is_reusable(&old, &new));
        new.primary.language = Some("fra".into());
        assert!(!is_reusable(&old, &new));
    }

    #[test]
    fn test_stream_type_names() {
        assert_eq!(stream_type_description(0x1B), "ISO/IEC 13818-1 Reserved");
        assert_eq!(stream_type_description(0x81), "User Private");
    }
}
