use super::codec::{EsCategory, Fourcc};
use bytes::Bytes;

/// Priority for streams that may be picked by default.
pub const PRIORITY_SELECTABLE_MIN: i32 = 0;
/// Priority for streams that must never be auto-selected.
pub const PRIORITY_NOT_DEFAULTABLE: i32 = -2;

/// One teletext page announced by a teletext or subtitling descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeletextPage {
    /// ISO 639 language code
    pub language: [u8; 3],
    /// Teletext page type (1 initial page, 2 subtitles, 5 hearing impaired ...)
    pub page_type: u8,
    /// Magazine number, 1..=8
    pub magazine: u8,
    /// BCD page number
    pub page: u8,
}

/// Subtitle addressing carried by a format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubtitleInfo {
    /// Nothing beyond the codec
    #[default]
    None,
    /// Teletext page selection; `magazine == None` means all pages
    Teletext {
        /// Selected magazine
        magazine: Option<u8>,
        /// Selected BCD page
        page: u8,
    },
    /// DVB subtitle composition/ancillary pair; `None` means all pages
    Dvb {
        /// `composition_page | ancillary_page << 16`
        id: Option<u32>,
    },
}

/// Audio parameters known from descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioInfo {
    /// Channel count
    pub channels: u8,
    /// Sample rate in Hz
    pub rate: u32,
}

/// Video parameters known from descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Description of one elementary stream handed to the sink on `add`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EsFormat {
    /// Stream category
    pub category: EsCategory,
    /// Codec identifier
    pub codec: Fourcc,
    /// Stream id; the PID when PID-based ids are enabled
    pub id: Option<u16>,
    /// Owning program number
    pub group: i32,
    /// Selection priority (`PRIORITY_*`)
    pub priority: i32,
    /// ISO 639 language code
    pub language: Option<String>,
    /// Human readable description
    pub description: Option<String>,
    /// Additional (language, description) pairs from multi-entry language descriptors
    pub extra_languages: Vec<(String, Option<String>)>,
    /// Codec initialization bytes
    pub extra: Bytes,
    /// Audio parameters
    pub audio: AudioInfo,
    /// Video parameters
    pub video: VideoInfo,
    /// Subtitle page addressing
    pub subtitle: SubtitleInfo,
}

impl EsFormat {
    /// Creates a format for the given category and codec.
    pub fn new(category: EsCategory, codec: Fourcc) -> Self {
        Self {
            category,
            codec,
            ..Default::default()
        }
    }

    /// Sets category and codec together.
    pub fn set(&mut self, category: EsCategory, codec: Fourcc) {
        self.category = category;
        self.codec = codec;
    }

    /// Whether the stream resolved to something the sink can consume.
    pub fn is_known(&self) -> bool {
        self.category != EsCategory::Unknown
    }

    /// Sets the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the codec initialization bytes.
    pub fn with_extra(mut self, extra: impl Into<Bytes>) -> Self {
        self.extra = extra.into();
        self
    }
}
