use std::fmt;

/// Broad elementary-stream category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EsCategory {
    /// Not (yet) resolved; the stream has no output
    #[default]
    Unknown,
    /// Video elementary stream
    Video,
    /// Audio elementary stream
    Audio,
    /// Subtitle, teletext or caption stream
    Subtitle,
}

/// Four-character codec identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fourcc(pub [u8; 4]);

impl Fourcc {
    /// Builds a fourcc from its four ASCII bytes.
    pub const fn new(code: &[u8; 4]) -> Self {
        Fourcc(*code)
    }

    /// Builds a fourcc from the first four bytes of `data`, if present.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        data.get(..4)
            .map(|code| Fourcc([code[0], code[1], code[2], code[3]]))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True for the all-zero placeholder.
    pub fn is_unset(&self) -> bool {
        self.0 == [0; 4]
    }
}

impl fmt::Debug for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fourcc({})", self)
    }
}

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Codec identifiers produced by stream-type resolution.
pub mod codecs {
    use super::Fourcc;

    /// MPEG-1/2 video
    pub const MPGV: Fourcc = Fourcc::new(b"mpgv");
    /// MPEG-1/2 audio
    pub const MPGA: Fourcc = Fourcc::new(b"mpga");
    /// AAC
    pub const MP4A: Fourcc = Fourcc::new(b"mp4a");
    /// MPEG-4 part 2 video
    pub const MP4V: Fourcc = Fourcc::new(b"mp4v");
    /// H.264
    pub const H264: Fourcc = Fourcc::new(b"h264");
    /// H.265
    pub const HEVC: Fourcc = Fourcc::new(b"hevc");
    /// AVS video
    pub const CAVS: Fourcc = Fourcc::new(b"CAVS");
    /// JPEG images
    pub const JPEG: Fourcc = Fourcc::new(b"jpeg");
    /// VC-1
    pub const VC1: Fourcc = Fourcc::new(b"VC-1");
    /// Dirac
    pub const DIRAC: Fourcc = Fourcc::new(b"drac");
    /// AC-3
    pub const A52: Fourcc = Fourcc::new(b"a52 ");
    /// Enhanced AC-3
    pub const EAC3: Fourcc = Fourcc::new(b"eac3");
    /// DTS
    pub const DTS: Fourcc = Fourcc::new(b"dts ");
    /// Dolby TrueHD
    pub const TRUEHD: Fourcc = Fourcc::new(b"trhd");
    /// MLP
    pub const MLP: Fourcc = Fourcc::new(b"mlp ");
    /// Opus
    pub const OPUS: Fourcc = Fourcc::new(b"Opus");
    /// SMPTE 302M PCM
    pub const S302M: Fourcc = Fourcc::new(b"s302");
    /// DVD LPCM
    pub const DVD_LPCM: Fourcc = Fourcc::new(b"lpcm");
    /// Blu-ray LPCM
    pub const BD_LPCM: Fourcc = Fourcc::new(b"bpcm");
    /// WiDi LPCM
    pub const WIDI_LPCM: Fourcc = Fourcc::new(b"wpcm");
    /// SDDS
    pub const SDDS: Fourcc = Fourcc::new(b"sdds");
    /// Legacy tagged AC-3 in private stream 1
    pub const A52B: Fourcc = Fourcc::new(b"a52b");
    /// Legacy tagged DTS in private stream 1
    pub const DTSB: Fourcc = Fourcc::new(b"dtsb");
    /// Legacy tagged LPCM in private stream 1
    pub const LPCB: Fourcc = Fourcc::new(b"lpcb");
    /// Legacy tagged DVD subpictures
    pub const SPUB: Fourcc = Fourcc::new(b"spub");
    /// Legacy tagged SDDS
    pub const SDDB: Fourcc = Fourcc::new(b"sddb");
    /// SCTE-27 subtitles
    pub const SCTE27: Fourcc = Fourcc::new(b"scte");
    /// EBU teletext
    pub const TELETEXT: Fourcc = Fourcc::new(b"telx");
    /// DVB subtitles
    pub const DVBS: Fourcc = Fourcc::new(b"dvbs");
    /// Blu-ray presentation graphics
    pub const BD_PG: Fourcc = Fourcc::new(b"bdpg");
    /// Blu-ray text subtitles
    pub const BD_TEXT: Fourcc = Fourcc::new(b"bdtx");
    /// ARIB STD-B24 captions, profile A
    pub const ARIB_A: Fourcc = Fourcc::new(b"arba");
    /// ARIB STD-B24 captions, profile C
    pub const ARIB_C: Fourcc = Fourcc::new(b"arbc");
    /// MPEG-4 timed text carried through the IOD path
    pub const SUBT: Fourcc = Fourcc::new(b"subt");
}
