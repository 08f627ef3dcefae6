//! Descriptor loops and the standard descriptor decoders used by the table handlers.

use super::types::*;
use crate::av::Fourcc;
use bytes::Bytes;
use log::warn;

/// One `tag, length, data` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Descriptor tag
    pub tag: u8,
    /// Descriptor body, header excluded
    pub data: Bytes,
}

/// Splits a descriptor loop. A truncated trailing descriptor is dropped.
pub fn parse_descriptors(data: &[u8]) -> Vec<Descriptor> {
    let mut descriptors = Vec::new();
    let mut pos = 0;

    while pos + 2 <= data.len() {
        let tag = data[pos];
        let length = data[pos + 1] as usize;
        pos += 2;

        if pos + length > data.len() {
            warn!("truncated descriptor 0x{:02x}", tag);
            break;
        }
        descriptors.push(Descriptor {
            tag,
            data: Bytes::copy_from_slice(&data[pos..pos + length]),
        });
        pos += length;
    }

    descriptors
}

/// First descriptor with the given tag.
pub fn find(descriptors: &[Descriptor], tag: u8) -> Option<&Descriptor> {
    descriptors.iter().find(|d| d.tag == tag)
}

/// Registration descriptor format identifier.
pub fn registration(descriptors: &[Descriptor]) -> Option<Fourcc> {
    find(descriptors, DESC_REGISTRATION).and_then(|d| Fourcc::from_slice(&d.data))
}

/// Whether a registration descriptor announces `tag`.
pub fn has_registration(descriptors: &[Descriptor], tag: &[u8; 4]) -> bool {
    match find(descriptors, DESC_REGISTRATION) {
        Some(d) if d.data.len() < 4 => {
            warn!("invalid Registration Descriptor");
            false
        }
        Some(d) => &d.data[..4] == tag,
        None => false,
    }
}

/// CA system id of a CA descriptor.
pub fn ca_system_id(descriptor: &Descriptor) -> Option<u16> {
    let d = &descriptor.data;
    (d.len() >= 2).then(|| u16::from_be_bytes([d[0], d[1]]))
}

/// ISO 639 language entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iso639Entry {
    /// ISO 639-2 language code
    pub code: [u8; 3],
    /// Audio type (0 undefined, 1 clean effects, 2 hearing impaired, 3 visual impaired)
    pub audio_type: u8,
}

impl Iso639Entry {
    /// Language code as a string.
    pub fn language(&self) -> String {
        String::from_utf8_lossy(&self.code).into_owned()
    }
}

/// Entries of an ISO 639 language descriptor (0x0A).
pub fn iso639_entries(descriptor: &Descriptor) -> Vec<Iso639Entry> {
    descriptor
        .data
        .chunks_exact(4)
        .map(|c| Iso639Entry {
            code: [c[0], c[1], c[2]],
            audio_type: c[3],
        })
        .collect()
}

/// Page announced by a teletext (0x56) or VBI teletext (0x46) descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeletextEntry {
    /// ISO 639-2 language code
    pub language: [u8; 3],
    /// Teletext type (2 subtitles, 5 hearing impaired ...)
    pub teletext_type: u8,
    /// Magazine number, 0 meaning 8
    pub magazine: u8,
    /// BCD page number
    pub page: u8,
}

/// Entries of a teletext or VBI teletext descriptor.
pub fn teletext_entries(descriptor: &Descriptor) -> Vec<TeletextEntry> {
    descriptor
        .data
        .chunks_exact(5)
        .map(|c| TeletextEntry {
            language: [c[0], c[1], c[2]],
            teletext_type: c[3] >> 3,
            magazine: c[3] & 0x07,
            page: c[4],
        })
        .collect()
}

/// DVB subtitling descriptor (0x59) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtitlingEntry {
    /// ISO 639-2 language code
    pub language: [u8; 3],
    /// Subtitling type
    pub subtitling_type: u8,
    /// Composition page id
    pub composition_page_id: u16,
    /// Ancillary page id
    pub ancillary_page_id: u16,
}

/// Entries of a DVB subtitling descriptor.
pub fn subtitling_entries(descriptor: &Descriptor) -> Vec<SubtitlingEntry> {
    descriptor
        .data
        .chunks_exact(8)
        .map(|c| SubtitlingEntry {
            language: [c[0], c[1], c[2]],
            subtitling_type: c[3],
            composition_page_id: u16::from_be_bytes([c[4], c[5]]),
            ancillary_page_id: u16::from_be_bytes([c[6], c[7]]),
        })
        .collect()
}

/// Service descriptor (0x48).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Service type
    pub service_type: u8,
    /// Raw service provider name
    pub provider: Bytes,
    /// Raw service name
    pub name: Bytes,
}

impl ServiceDescriptor {
    /// `None` when the lengths overrun the descriptor.
    pub fn parse(descriptor: &Descriptor) -> Option<Self> {
        let d = &descriptor.data;
        let provider_len = *d.get(1)? as usize;
        let name_len_pos = 2 + provider_len;
        let name_len = *d.get(name_len_pos)? as usize;
        let name_end = name_len_pos + 1 + name_len;
        if name_end > d.len() {
            return None;
        }
        Some(Self {
            service_type: d[0],
            provider: d.slice(2..name_len_pos),
            name: d.slice(name_len_pos + 1..name_end),
        })
    }
}

/// Short event descriptor (0x4D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortEvent {
    /// ISO 639-2 language code
    pub language: [u8; 3],
    /// Raw event name
    pub name: Bytes,
    /// Raw event text
    pub text: Bytes,
}

impl ShortEvent {
    /// `None` when the lengths overrun the descriptor.
    pub fn parse(descriptor: &Descriptor) -> Option<Self> {
        let d = &descriptor.data;
        if d.len() < 5 {
            return None;
        }
        let name_len = d[3] as usize;
        let text_len_pos = 4 + name_len;
        let text_len = *d.get(text_len_pos)? as usize;
        let text_end = text_len_pos + 1 + text_len;
        if text_end > d.len() {
            return None;
        }
        Some(Self {
            language: [d[0], d[1], d[2]],
            name: d.slice(4..text_len_pos),
            text: d.slice(text_len_pos + 1..text_end),
        })
    }
}

/// Extended event descriptor (0x4E).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedEvent {
    /// Descriptor number within the event
    pub number: u8,
    /// Last descriptor number of the event
    pub last_number: u8,
    /// ISO 639-2 language code
    pub language: [u8; 3],
    /// (item description, item) pairs
    pub items: Vec<(Bytes, Bytes)>,
    /// Raw free text
    pub text: Bytes,
}

impl ExtendedEvent {
    /// `None` when the fixed part or the item loop is truncated.
    pub fn parse(descriptor: &Descriptor) -> Option<Self> {
        let d = &descriptor.data;
        if d.len() < 6 {
            return None;
        }
        let items_len = d[4] as usize;
        let items_end = 5 + items_len;
        if items_end >= d.len() {
            return None;
        }

        let mut items = Vec::new();
        let mut pos = 5;
        while pos < items_end {
            let desc_len = *d.get(pos)? as usize;
            let desc = d.slice((pos + 1).min(items_end)..(pos + 1 + desc_len).min(items_end));
            pos += 1 + desc_len;
            let item_len = *d.get(pos)? as usize;
            let item = d.slice((pos + 1).min(items_end)..(pos + 1 + item_len).min(items_end));
            pos += 1 + item_len;
            items.push((desc, item));
        }

        let text_len = d[items_end] as usize;
        let text_end = (items_end + 1 + text_len).min(d.len());
        Some(Self {
            number: d[0] >> 4,
            last_number: d[0] & 0x0F,
            language: [d[1], d[2], d[3]],
            items,
            text: d.slice(items_end + 1..text_end),
        })
    }
}

/// Parental rating (0x55) entries as (country, rating).
pub fn parental_ratings(descriptor: &Descriptor) -> Vec<([u8; 3], u8)> {
    descriptor
        .data
        .chunks_exact(4)
        .map(|c| ([c[0], c[1], c[2]], c[3]))
        .collect()
}

/// Component tag of a stream identifier descriptor (0x52).
pub fn component_tag(descriptors: &[Descriptor]) -> Option<u8> {
    find(descriptors, DESC_STREAM_IDENTIFIER).and_then(|d| d.data.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn desc(tag: u8, data: &[u8]) -> Descriptor {
        Descriptor {
            tag,
            data: Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn test_parse_loop() {
        let raw = [0x05, 0x04, b'H', b'D', b'M', b'V', 0x52, 0x01, 0x30, 0x0a, 0x09];
        let list = parse_descriptors(&raw);
        assert_eq!(list.len(), 2);
        assert_eq!(registration(&list), Some(Fourcc::new(b"HDMV")));
        assert!(has_registration(&list, b"HDMV"));
        assert_eq!(component_tag(&list), Some(0x30));
    }

    #[test]
    fn test_short_registration() {
        let list = vec![desc(DESC_REGISTRATION, b"AC")];
        assert!(!has_registration(&list, b"AC-3"));
        assert_eq!(registration(&list), None);
    }

    #[test]
    fn test_page_tables() {
        let ttx = desc(DESC_TELETEXT, &[b'e', b'n', b'g', (2 << 3) | 1, 0x88]);
        assert_eq!(
            teletext_entries(&ttx),
            vec![TeletextEntry {
                language: *b"eng",
                teletext_type: 2,
                magazine: 1,
                page: 0x88,
            }]
        );

        let sub = desc(DESC_SUBTITLING, &[b'f', b'r', b'a', 0x10, 0x00, 0x02, 0x00, 0x03]);
        let entries = subtitling_entries(&sub);
        assert_eq!(entries[0].subtitling_type, 0x10);
        assert_eq!(entries[0].composition_page_id, 2);
        assert_eq!(entries[0].ancillary_page_id, 3);
    }

    #[test]
    fn test_event_descriptors() {
        let service = desc(DESC_SERVICE, &[0x01, 0x02, b'P', b'R', 0x03, b'O', b'n', b'e']);
        let service = ServiceDescriptor::parse(&service).unwrap();
        assert_eq!(&service.provider[..], b"PR");
        assert_eq!(&service.name[..], b"One");

        let short = desc(DESC_SHORT_EVENT, &[b'e', b'n', b'g', 2, b'H', b'i', 3, b'a', b'b', b'c']);
        let short = ShortEvent::parse(&short).unwrap();
        assert_eq!(&short.name[..], b"Hi");
        assert_eq!(&short.text[..], b"abc");

        let ext = desc(
            DESC_EXTENDED_EVENT,
            &[0x01, b'e', b'n', b'g', 4, 1, b'A', 1, b'B', 2, b'x', b'y'],
        );
        let ext = ExtendedEvent::parse(&ext).unwrap();
        assert_eq!(ext.number, 0);
        assert_eq!(ext.last_number, 1);
        assert_eq!(ext.items.len(), 1);
        assert_eq!(&ext.text[..], b"xy");

        assert!(ShortEvent::parse(&desc(DESC_SHORT_EVENT, &[1, 2])).is_none());
    }
}
