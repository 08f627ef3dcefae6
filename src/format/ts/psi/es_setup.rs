//! Elementary stream resolution: PMT stream type plus descriptors to an output format.

use super::iod::{EsDescriptor, Iod};
use crate::av::{
    codecs, EsCategory, EsFormat, Fourcc, SubtitleInfo, PRIORITY_NOT_DEFAULTABLE,
    PRIORITY_SELECTABLE_MIN,
};
use crate::format::ts::descriptor::{self as desc, Descriptor};
use crate::format::ts::opus::OpusConfig;
use crate::format::ts::pid::DataType;
use crate::format::ts::types::*;
use bytes::Bytes;
use log::{debug, error, info, warn};

const TELETEXT_TYPES: [&str; 6] = [
    "",
    "Teletext",
    "Teletext subtitles",
    "Teletext: additional information",
    "Teletext: program schedule",
    "Teletext subtitles: hearing impaired",
];

const AUDIO_TYPES: [&str; 4] = [
    "",
    "clean effects",
    "hearing impaired",
    "visual impaired commentary",
];

/// Vendor registrations recognized on user-private stream types.
const REGISTRATIONS: [(&[u8; 4], EsCategory, Fourcc); 7] = [
    (b"AC-3", EsCategory::Audio, codecs::A52),
    (b"DTS1", EsCategory::Audio, codecs::DTS),
    (b"DTS2", EsCategory::Audio, codecs::DTS),
    (b"DTS3", EsCategory::Audio, codecs::DTS),
    (b"BSSD", EsCategory::Audio, codecs::S302M),
    (b"VC-1", EsCategory::Video, codecs::VC1),
    (b"drac", EsCategory::Video, codecs::DIRAC),
];

/// Format implied by the stream type alone.
pub fn fill_format(stream_type: u8) -> EsFormat {
    use EsCategory::*;
    let (category, codec) = match stream_type {
        0x01 | 0x02 | 0x80 => (Video, codecs::MPGV),
        0x03 | 0x04 => (Audio, codecs::MPGA),
        0x0f | 0x11 | 0x1c => (Audio, codecs::MP4A),
        0x10 => (Video, codecs::MP4V),
        0x1b => (Video, codecs::H264),
        0x24 => (Video, codecs::HEVC),
        0x42 => (Video, codecs::CAVS),
        0x81 => (Audio, codecs::A52),
        0x82 => (Subtitle, codecs::SCTE27),
        0x84 => (Audio, codecs::SDDS),
        0x85 => (Audio, codecs::DTS),
        0x87 => (Audio, codecs::EAC3),
        0x91 => (Audio, codecs::A52B),
        0x92 => (Subtitle, codecs::SPUB),
        0x94 => (Audio, codecs::SDDB),
        _ => (Unknown, Fourcc::default()),
    };
    EsFormat::new(category, codec)
}

/// Result of resolving one PMT entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    /// Main output format
    pub primary: EsFormat,
    /// Co-located teletext/subtitle pages when splitting is on
    pub extra: Vec<EsFormat>,
    /// PES or table section framing
    pub data_type: DataType,
    /// MPEG-4 ES descriptor bound through the IOD
    pub mpeg4desc: Option<EsDescriptor>,
}

impl ResolvedStream {
    fn new(primary: EsFormat) -> Self {
        Self {
            primary,
            extra: Vec::new(),
            data_type: DataType::Pes,
            mpeg4desc: None,
        }
    }
}

/// Program-level context a PMT entry is resolved in.
#[derive(Debug, Clone, Copy)]
pub struct EsSetup<'a> {
    /// Elementary stream PID
    pub pid: u16,
    /// Program number of the PMT
    pub program_number: u16,
    /// PCR PID of the program
    pub pcr_pid: Option<u16>,
    /// Blu-ray (HDMV/HDPR) registration on the program
    pub hdmv: bool,
    /// ARIB mode in effect
    pub arib: bool,
    /// Split teletext/subtitle pages into separate outputs
    pub split_es: bool,
    /// Initial object descriptor of the program
    pub iod: Option<&'a Iod>,
}

impl EsSetup<'_> {
    /// Maps a stream type and its descriptors to output formats.
    pub fn resolve(&self, stream_type: u8, descriptors: &[Descriptor]) -> ResolvedStream {
        let mut es = ResolvedStream::new(fill_format(stream_type));

        let mut registered = false;
        if stream_type >= 0x80 {
            registered = if self.hdmv {
                self.setup_hdmv(&mut es.primary, stream_type)
            } else {
                setup_registration(&mut es.primary, stream_type, descriptors)
            };
            if registered {
                debug!("registration applied to pid {} type 0x{:02x}", self.pid, stream_type);
            }
        }

        if !registered {
            match stream_type {
                STREAM_TYPE_PRIVATE_PES => self.setup_private(&mut es, descriptors),
                STREAM_TYPE_AAC | STREAM_TYPE_MPEG4_VIDEO | STREAM_TYPE_AAC_LATM
                | STREAM_TYPE_MPEG4_SL_PES => self.setup_iso14496(&mut es, stream_type, descriptors),
                STREAM_TYPE_LPCM_BLURAY => self.setup_lpcm(&mut es.primary),
                STREAM_TYPE_MSCODEC => setup_mscodec(&mut es.primary, descriptors),
                STREAM_TYPE_DIRAC => setup_required_registration(&mut es.primary, descriptors, b"drac", codecs::DIRAC),
                STREAM_TYPE_VC1 => setup_required_registration(&mut es.primary, descriptors, b"VC-1", codecs::VC1),
                _ => {}
            }
        }

        let primary = &es.primary;
        if primary.category == EsCategory::Audio
            || (primary.category == EsCategory::Subtitle
                && primary.codec != codecs::DVBS
                && primary.codec != codecs::TELETEXT)
        {
            parse_iso639(&mut es.primary, descriptors);
        }

        if es.primary.codec == codecs::SCTE27 {
            es.data_type = DataType::TableSection;
        }
        es
    }

    fn setup_hdmv(&self, fmt: &mut EsFormat, stream_type: u8) -> bool {
        use EsCategory::*;
        let (category, codec) = match stream_type {
            0x80 => (Audio, codecs::BD_LPCM),
            0x82 | 0x85 | 0x86 | 0xa2 => (Audio, codecs::DTS),
            0x83 => (Audio, codecs::TRUEHD),
            0x84 | 0xa1 => (Audio, codecs::EAC3),
            0x90 => (Subtitle, codecs::BD_PG),
            0x91 | 0x92 => return false,
            _ => {
                info!(
                    "HDMV registration not implemented for pid 0x{:x} type 0x{:x}",
                    self.pid, stream_type
                );
                return false;
            }
        };
        fmt.set(category, codec);
        true
    }

    fn setup_private(&self, es: &mut ResolvedStream, descriptors: &[Descriptor]) {
        let fmt = &mut es.primary;
        let subtitling = desc::find(descriptors, DESC_SUBTITLING);
        let extension = desc::find(descriptors, DESC_EXTENSION);

        if desc::has_registration(descriptors, b"AC-3")
            || desc::find(descriptors, DESC_AC3).is_some()
            || desc::find(descriptors, DESC_AC3_ATSC).is_some()
        {
            fmt.set(EsCategory::Audio, codecs::A52);
        } else if let Some(ext) = extension
            .filter(|d| d.data.len() >= 2)
            .filter(|_| desc::has_registration(descriptors, b"Opus"))
        {
            match OpusConfig::from_descriptor(&ext.data) {
                Ok(config) => {
                    fmt.set(EsCategory::Audio, codecs::OPUS);
                    fmt.audio.channels = config.channels;
                    fmt.audio.rate = config.rate();
                    fmt.extra = config.opus_head();
                }
                Err(e) => error!("Opus setup failed: {}", e),
            }
        } else if desc::find(descriptors, DESC_EAC3).is_some() {
            fmt.set(EsCategory::Audio, codecs::EAC3);
        } else if desc::has_registration(descriptors, b"DTS1")
            || desc::has_registration(descriptors, b"DTS2")
            || desc::has_registration(descriptors, b"DTS3")
            || desc::find(descriptors, DESC_DTS).is_some()
        {
            fmt.set(EsCategory::Audio, codecs::DTS);
        } else if desc::has_registration(descriptors, b"BSSD") && subtitling.is_none() {
            fmt.set(EsCategory::Audio, codecs::S302M);
        } else if desc::has_registration(descriptors, b"HEVC") {
            fmt.set(EsCategory::Video, codecs::HEVC);
        } else if self.arib {
            setup_arib_subtitles(fmt, descriptors);
        } else {
            if let Some(sub) = subtitling {
                for entry in desc::subtitling_entries(sub) {
                    if es.primary.is_known() {
                        break;
                    }
                    match entry.subtitling_type {
                        0x01..=0x03 => self.setup_teletext(es, descriptors),
                        0x10..=0x14 | 0x20..=0x24 => self.setup_dvb_subtitle(es, descriptors),
                        other => error!("Unrecognized DVB subtitle type (0x{:x})", other),
                    }
                }
            }

            if !es.primary.is_known()
                && [DESC_VBI_DATA, DESC_VBI_TELETEXT, DESC_TELETEXT]
                    .iter()
                    .any(|&tag| desc::find(descriptors, tag).is_some())
            {
                self.setup_teletext(es, descriptors);
            }
        }

        if let Some(tag) = desc::component_tag(descriptors) {
            debug!("    * Stream Component Identifier: {}", tag);
        }
    }

    fn setup_teletext(&self, es: &mut ResolvedStream, descriptors: &[Descriptor]) {
        struct Page {
            page_type: u8,
            magazine: u8,
            page: u8,
            language: [u8; 3],
        }

        let mut pages = Vec::new();
        for tag in [DESC_VBI_TELETEXT, DESC_TELETEXT] {
            if let Some(d) = desc::find(descriptors, tag) {
                pages.extend(
                    desc::teletext_entries(d)
                        .into_iter()
                        .filter(|e| e.teletext_type < 0x06)
                        .map(|e| Page {
                            page_type: e.teletext_type,
                            magazine: if e.magazine != 0 { e.magazine } else { 8 },
                            page: e.page,
                            language: e.language,
                        }),
                );
            }
        }
        if let Some(d) = desc::find(descriptors, DESC_SUBTITLING) {
            pages.extend(
                desc::subtitling_entries(d)
                    .into_iter()
                    .filter(|e| (0x01..=0x03).contains(&e.subtitling_type))
                    .map(|e| {
                        let magazine = (e.composition_page_id >> 8) as u8;
                        Page {
                            page_type: if e.subtitling_type == 0x01 { 0x02 } else { 0x03 },
                            magazine: if magazine != 0 { magazine } else { 8 },
                            page: e.composition_page_id as u8,
                            language: e.language,
                        }
                    }),
            );
        }

        es.primary = EsFormat::new(EsCategory::Subtitle, codecs::TELETEXT);
        es.extra.clear();

        if !self.split_es || pages.is_empty() {
            es.primary.subtitle = SubtitleInfo::Teletext {
                magazine: None,
                page: 0,
            };
            es.primary.description = Some(TELETEXT_TYPES[1].to_string());
            let raw = desc::find(descriptors, DESC_VBI_TELETEXT)
                .or_else(|| desc::find(descriptors, DESC_TELETEXT));
            if let Some(d) = raw.filter(|d| !self.split_es && !d.data.is_empty()) {
                es.primary.extra = d.data.clone();
            }
            return;
        }

        let template = es.primary.clone();
        for (i, page) in pages.iter().enumerate() {
            let mut fmt = template.clone();
            fmt.priority = if page.page_type == 0x02 || page.page_type == 0x05 {
                PRIORITY_SELECTABLE_MIN
            } else {
                PRIORITY_NOT_DEFAULTABLE
            };
            fmt.language = Some(String::from_utf8_lossy(&page.language).into_owned());
            fmt.description = Some(TELETEXT_TYPES[page.page_type as usize].to_string());
            fmt.subtitle = SubtitleInfo::Teletext {
                magazine: Some(page.magazine),
                page: page.page,
            };
            debug!(
                "    * ttxt type={} lan={} page={}{:02x}",
                TELETEXT_TYPES[page.page_type as usize],
                String::from_utf8_lossy(&page.language),
                page.magazine,
                page.page
            );
            if i == 0 {
                es.primary = fmt;
            } else {
                es.extra.push(fmt);
            }
        }
    }

    fn setup_dvb_subtitle(&self, es: &mut ResolvedStream, descriptors: &[Descriptor]) {
        es.primary = EsFormat::new(EsCategory::Subtitle, codecs::DVBS);
        es.extra.clear();

        let dr = desc::find(descriptors, DESC_SUBTITLING);
        let entries = dr.map(desc::subtitling_entries).unwrap_or_default();
        let pages = entries
            .iter()
            .filter(|e| matches!(e.subtitling_type, 0x10..=0x14 | 0x20..=0x24))
            .count();

        if !self.split_es || pages == 0 {
            es.primary.subtitle = SubtitleInfo::Dvb { id: None };
            es.primary.description = Some("DVB subtitles".to_string());
            if let Some(d) = dr.filter(|d| !self.split_es && !d.data.is_empty()) {
                es.primary.extra = d.data.clone();
            }
            return;
        }

        let template = es.primary.clone();
        for (i, entry) in entries.iter().enumerate() {
            let mut fmt = template.clone();
            fmt.language = Some(String::from_utf8_lossy(&entry.language).into_owned());
            fmt.description = match entry.subtitling_type {
                0x10..=0x14 => Some("DVB subtitles".to_string()),
                0x20..=0x24 => Some("DVB subtitles: hearing impaired".to_string()),
                _ => None,
            };
            fmt.subtitle = SubtitleInfo::Dvb {
                id: Some(entry.composition_page_id as u32 | (entry.ancillary_page_id as u32) << 16),
            };
            if i == 0 {
                es.primary = fmt;
            } else {
                es.extra.push(fmt);
            }
        }
    }

    fn setup_iso14496(&self, es: &mut ResolvedStream, stream_type: u8, descriptors: &[Descriptor]) {
        if let Some(fmc) = desc::find(descriptors, DESC_FMC).filter(|d| d.data.len() == 2) {
            let es_id = u16::from_be_bytes([fmc.data[0], fmc.data[1]]);
            debug!("found FMC_descriptor declaring sl packetization on es_id={}", es_id);
            es.mpeg4desc = self.iod.and_then(|iod| iod.find(es_id)).cloned();
        }

        let Some(mpeg4desc) = &es.mpeg4desc else {
            match stream_type {
                STREAM_TYPE_AAC | STREAM_TYPE_AAC_LATM => info!(
                    "MPEG-4 descriptor not found for pid 0x{:x} type 0x{:x}",
                    self.pid, stream_type
                ),
                _ => error!(
                    "MPEG-4 descriptor not found for pid 0x{:x} type 0x{:x}",
                    self.pid, stream_type
                ),
            }
            return;
        };

        let dcd = &mpeg4desc.decoder;
        let fmt = &mut es.primary;
        use EsCategory::*;
        let resolved = match (dcd.stream_type, dcd.object_type) {
            (0x04, 0x0b) => Some((Subtitle, codecs::SUBT)),
            (0x04, 0x20) => Some((Video, codecs::MP4V)),
            (0x04, 0x21) => Some((Video, codecs::H264)),
            (0x04, 0x60..=0x65 | 0x6a) => Some((Video, codecs::MPGV)),
            (0x04, 0x6c) => Some((Video, codecs::JPEG)),
            (0x05, 0x40 | 0x66..=0x68) => Some((Audio, codecs::MP4A)),
            (0x05, 0x69 | 0x6b) => Some((Audio, codecs::MPGA)),
            _ => None,
        };
        match resolved {
            Some((category, codec)) => {
                fmt.set(category, codec);
                fmt.extra = dcd.extra.clone();
            }
            None => fmt.category = Unknown,
        }
    }

    fn setup_lpcm(&self, fmt: &mut EsFormat) {
        // WiDi sends LPCM without registration: program 1, PCR 0x1000, audio 0x11xx
        let codec = if self.program_number == 1 && self.pcr_pid == Some(0x1000) && self.pid >> 8 == 0x11 {
            codecs::WIDI_LPCM
        } else {
            codecs::DVD_LPCM
        };
        *fmt = EsFormat::new(EsCategory::Audio, codec);
    }
}

fn setup_registration(fmt: &mut EsFormat, stream_type: u8, descriptors: &[Descriptor]) -> bool {
    for (tag, category, codec) in REGISTRATIONS {
        if desc::has_registration(descriptors, tag) {
            let codec = if stream_type == 0x87 { codecs::EAC3 } else { codec };
            fmt.set(category, codec);
            return true;
        }
    }
    false
}

fn setup_required_registration(fmt: &mut EsFormat, descriptors: &[Descriptor], tag: &[u8; 4], codec: Fourcc) {
    if desc::has_registration(descriptors, tag) {
        fmt.set(EsCategory::Video, codec);
    } else {
        error!("Registration descriptor not found or invalid");
    }
}

fn setup_mscodec(fmt: &mut EsFormat, descriptors: &[Descriptor]) {
    let Some(d) = desc::find(descriptors, STREAM_TYPE_MSCODEC).filter(|d| d.data.len() >= 10) else {
        warn!("private MSCODEC stream without bih private descriptor");
        return;
    };
    let p = &d.data;
    fmt.category = EsCategory::Video;
    fmt.codec = Fourcc([p[0], p[1], p[2], p[3]]);
    fmt.video.width = u16::from_be_bytes([p[4], p[5]]) as u32;
    fmt.video.height = u16::from_be_bytes([p[6], p[7]]) as u32;
    let extra_len = u16::from_be_bytes([p[8], p[9]]) as usize;
    if extra_len > 0 {
        let available = (p.len() - 10).min(extra_len);
        let mut extra = p.slice(10..10 + available).to_vec();
        extra.resize(extra_len, 0);
        fmt.extra = Bytes::from(extra);
    }
}

fn setup_arib_subtitles(fmt: &mut EsFormat, descriptors: &[Descriptor]) {
    let Some(d) = desc::find(descriptors, DESC_ARIB_DATA_COMPONENT).filter(|d| d.data.len() >= 2) else {
        return;
    };
    let tag = desc::component_tag(descriptors);
    let has_tag = |range: &[u8]| tag.is_some_and(|t| range.contains(&t));

    let codec = if d.data[..2] == [0x00, 0x08] && has_tag(&[0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37]) {
        codecs::ARIB_A
    } else if d.data[..2] == [0x00, 0x12] && has_tag(&[0x87, 0x88]) {
        codecs::ARIB_C
    } else {
        return;
    };
    *fmt = EsFormat::new(EsCategory::Subtitle, codec)
        .with_language("jpn")
        .with_description("ARIB subtitles");
}

fn audio_type_description(audio_type: u8) -> Option<String> {
    match audio_type {
        1..=3 => Some(AUDIO_TYPES[audio_type as usize].to_string()),
        0 => None,
        other => {
            debug!("unknown audio type: {}", other);
            None
        }
    }
}

fn parse_iso639(fmt: &mut EsFormat, descriptors: &[Descriptor]) {
    let Some(d) = desc::find(descriptors, DESC_ISO639) else {
        return;
    };
    let entries = desc::iso639_entries(d);
    let Some(first) = entries.first() else {
        error!("Failed to decode a ISO 639 descriptor");
        return;
    };

    fmt.language = Some(first.language());
    debug!("found language: {}", first.language());
    fmt.description = audio_type_description(first.audio_type);
    if first.audio_type == 0 {
        fmt.priority = PRIORITY_SELECTABLE_MIN + 1;
    }
    fmt.extra_languages = entries[1..]
        .iter()
        .map(|e| (e.language(), audio_type_description(e.audio_type)))
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::psi::iod::tests::sample_iod;
    use pretty_assertions::assert_eq;

    fn d(tag: u8, data: &[u8]) -> Descriptor {
        Descriptor {
            tag,
            data: Bytes::copy_from_slice(data),
        }
    }

    fn setup() -> EsSetup<'static> {
        EsSetup {
            pid: 0x101,
            program_number: 1,
            pcr_pid: Some(0x101),
            hdmv: false,
            arib: false,
            split_es: true,
            iod: None,
        }
    }

    #[test]
    fn test_plain_stream_types() {
        let es = setup().resolve(STREAM_TYPE_H264, &[]);
        assert_eq!(es.primary.category, EsCategory::Video);
        assert_eq!(es.primary.codec, codecs::H264);
        assert_eq!(es.data_type, DataType::Pes);

        assert!(!setup().resolve(0x05, &[]).primary.is_known());
        assert_eq!(setup().resolve(0x82, &[]).data_type, DataType::TableSection);
    }

    #[test]
    fn test_registration_and_hdmv() {
        let regs = [d(DESC_REGISTRATION, b"DTS2")];
        assert_eq!(setup().resolve(0x86, &regs).primary.codec, codecs::DTS);
        let ac3 = [d(DESC_REGISTRATION, b"AC-3")];
        assert_eq!(setup().resolve(0x87, &ac3).primary.codec, codecs::EAC3);

        let bluray = EsSetup { hdmv: true, ..setup() };
        assert_eq!(bluray.resolve(0x83, &[]).primary.codec, codecs::TRUEHD);
        assert_eq!(bluray.resolve(0x90, &[]).primary.category, EsCategory::Subtitle);
        // not handled by the Blu-ray table, falls back to the stream type
        assert_eq!(bluray.resolve(0x92, &[]).primary.codec, codecs::SPUB);

        assert!(!setup().resolve(STREAM_TYPE_VC1, &[]).primary.is_known());
        let vc1 = [d(DESC_REGISTRATION, b"VC-1")];
        assert_eq!(setup().resolve(STREAM_TYPE_VC1, &vc1).primary.codec, codecs::VC1);
    }

    #[test]
    fn test_private_audio() {
        let es = setup().resolve(STREAM_TYPE_PRIVATE_PES, &[d(DESC_AC3, &[0])]);
        assert_eq!(es.primary.codec, codecs::A52);

        let es = setup().resolve(STREAM_TYPE_PRIVATE_PES, &[d(DESC_EAC3, &[0])]);
        assert_eq!(es.primary.codec, codecs::EAC3);

        let opus = [d(DESC_REGISTRATION, b"Opus"), d(DESC_EXTENSION, &[0x80, 0x02])];
        let es = setup().resolve(STREAM_TYPE_PRIVATE_PES, &opus);
        assert_eq!(es.primary.codec, codecs::OPUS);
        assert_eq!(es.primary.audio.channels, 2);
        assert_eq!(&es.primary.extra[..8], b"OpusHead");

        let lang = [d(DESC_AC3, &[0]), d(DESC_ISO639, b"fra\x00eng\x03")];
        let es = setup().resolve(STREAM_TYPE_PRIVATE_PES, &lang);
        assert_eq!(es.primary.language.as_deref(), Some("fra"));
        assert_eq!(es.primary.priority, PRIORITY_SELECTABLE_MIN + 1);
        assert_eq!(
            es.primary.extra_languages,
            vec![("eng".to_string(), Some("visual impaired commentary".to_string()))]
        );
    }

    #[test]
    fn test_teletext_split() {
        let ttx = [d(DESC_TELETEXT, &[b'd', b'e', b'u', 0x10, 0x88, b'f', b'r', b'a', 0x09, 0x00])];
        let es = setup().resolve(STREAM_TYPE_PRIVATE_PES, &ttx);
        assert_eq!(es.primary.codec, codecs::TELETEXT);
        assert_eq!(es.primary.language.as_deref(), Some("deu"));
        assert_eq!(es.primary.description.as_deref(), Some("Teletext subtitles"));
        assert_eq!(es.primary.priority, PRIORITY_SELECTABLE_MIN);
        assert_eq!(
            es.primary.subtitle,
            SubtitleInfo::Teletext { magazine: Some(8), page: 0x88 }
        );
        assert_eq!(es.extra.len(), 1);
        assert_eq!(es.extra[0].priority, PRIORITY_NOT_DEFAULTABLE);
        assert_eq!(es.extra[0].subtitle, SubtitleInfo::Teletext { magazine: Some(1), page: 0 });

        let whole = EsSetup { split_es: false, ..setup() }.resolve(STREAM_TYPE_PRIVATE_PES, &ttx);
        assert!(whole.extra.is_empty());
        assert_eq!(whole.primary.subtitle, SubtitleInfo::Teletext { magazine: None, page: 0 });
        assert_eq!(whole.primary.extra.len(), 10);
    }

    #[test]
    fn test_dvb_subtitles() {
        let subs = [d(
            DESC_SUBTITLING,
            &[b'e', b'n', b'g', 0x10, 0x00, 0x02, 0x00, 0x03, b'e', b'n', b'g', 0x20, 0x00, 0x04, 0x00, 0x05],
        )];
        let es = setup().resolve(STREAM_TYPE_PRIVATE_PES, &subs);
        assert_eq!(es.primary.codec, codecs::DVBS);
        assert_eq!(es.primary.subtitle, SubtitleInfo::Dvb { id: Some(0x0003_0002) });
        assert_eq!(es.extra.len(), 1);
        assert_eq!(
            es.extra[0].description.as_deref(),
            Some("DVB subtitles: hearing impaired")
        );
    }

    #[test]
    fn test_arib_subtitles() {
        let arib = EsSetup { arib: true, ..setup() };
        let descs = [d(DESC_ARIB_DATA_COMPONENT, &[0x00, 0x08, 0x3d]), d(DESC_STREAM_IDENTIFIER, &[0x30])];
        let es = arib.resolve(STREAM_TYPE_PRIVATE_PES, &descs);
        assert_eq!(es.primary.codec, codecs::ARIB_A);
        assert_eq!(es.primary.language.as_deref(), Some("jpn"));

        let other = [d(DESC_ARIB_DATA_COMPONENT, &[0x00, 0x08]), d(DESC_STREAM_IDENTIFIER, &[0x40])];
        assert!(!arib.resolve(STREAM_TYPE_PRIVATE_PES, &other).primary.is_known());
    }

    #[test]
    fn test_iso14496_through_iod() {
        let iod = Iod::parse(&sample_iod());
        let with_iod = EsSetup { iod: Some(&iod), ..setup() };
        let fmc = [d(DESC_FMC, &[0x01, 0x01])];
        let es = with_iod.resolve(STREAM_TYPE_MPEG4_SL_PES, &fmc);
        assert_eq!(es.primary.codec, codecs::MP4A);
        assert_eq!(&es.primary.extra[..], &[0x12, 0x10]);
        assert!(es.mpeg4desc.is_some());

        // ADTS without IOD binding keeps the stream type default
        let es = setup().resolve(STREAM_TYPE_AAC, &fmc);
        assert_eq!(es.primary.codec, codecs::MP4A);
        assert!(es.mpeg4desc.is_none());
    }

    #[test]
    fn test_mscodec_and_lpcm() {
        let bih = [d(STREAM_TYPE_MSCODEC, &[b'D', b'I', b'V', b'3', 0x01, 0x40, 0x00, 0xF0, 0x00, 0x02, 0xAA])];
        let es = setup().resolve(STREAM_TYPE_MSCODEC, &bih);
        assert_eq!(es.primary.codec, Fourcc::new(b"DIV3"));
        assert_eq!((es.primary.video.width, es.primary.video.height), (320, 240));
        assert_eq!(&es.primary.extra[..], &[0xAA, 0x00]);

        let widi = EsSetup { pid: 0x1100, pcr_pid: Some(0x1000), ..setup() };
        assert_eq!(widi.resolve(0x83, &[]).primary.codec, codecs::WIDI_LPCM);
        assert_eq!(setup().resolve(0x83, &[]).primary.codec, codecs::DVD_LPCM);
    }
}
