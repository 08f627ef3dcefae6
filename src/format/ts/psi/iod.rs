//! MPEG-4 Initial Object Descriptor (ISO/IEC 14496-1) as carried in PMT
//! descriptor 0x1D.

use bytes::Bytes;
use log::trace;

/// Maximum number of ES descriptors read from one IOD.
const ES_DESCRIPTOR_COUNT: usize = 255;

/// Forgiving big-endian reader: reads past the end yield zero bits.
struct IodCursor<'a> {
    data: &'a [u8],
}

impl<'a> IodCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn bytes(&mut self, count: usize) -> u32 {
        let mut value = 0u32;
        for _ in 0..count {
            let Some((&b, rest)) = self.data.split_first() else {
                break;
            };
            value = (value << 8) | b as u32;
            self.data = rest;
        }
        value
    }

    /// Expandable size field, clamped to what is left.
    fn length(&mut self) -> usize {
        let mut length = 0usize;
        while let Some((&b, rest)) = self.data.split_first() {
            self.data = rest;
            length = (length << 7) | (b & 0x7f) as usize;
            if b & 0x80 == 0 {
                break;
            }
        }
        length.min(self.data.len())
    }

    fn take(&mut self, count: usize) -> &'a [u8] {
        let (head, rest) = self.data.split_at(count.min(self.data.len()));
        self.data = rest;
        head
    }

    fn url(&mut self) -> String {
        let length = self.bytes(1) as usize;
        String::from_utf8_lossy(self.take(length)).into_owned()
    }
}

/// DecoderConfigDescriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecoderConfig {
    /// objectTypeIndication
    pub object_type: u8,
    /// streamType
    pub stream_type: u8,
    /// DecoderSpecificInfo bytes
    pub extra: Bytes,
}

/// ES_Descriptor of an IOD.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EsDescriptor {
    /// ES_ID
    pub es_id: u16,
    /// URL when the stream lives elsewhere
    pub url: Option<String>,
    /// Decoder configuration
    pub decoder: DecoderConfig,
}

/// Initial Object Descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Iod {
    /// ObjectDescriptorID
    pub od_id: u16,
    /// Set when the IOD only points elsewhere
    pub url: Option<String>,
    /// Complete ES descriptors, in declaration order
    pub es: Vec<EsDescriptor>,
}

impl Iod {
    /// Parses the body of an IOD descriptor. Malformed input yields a
    /// partially filled (possibly empty) descriptor, never an error.
    pub fn parse(data: &[u8]) -> Self {
        let mut iod = Iod::default();
        if data.len() < 3 {
            return iod;
        }
        let mut cursor = IodCursor::new(data);
        let byte1 = cursor.bytes(1) as u8;
        let byte2 = cursor.bytes(1) as u8;
        let byte3 = cursor.bytes(1) as u8;
        // some muxers omit the scope byte and write label, tag directly
        let (label, tag) = if byte2 == 0x02 { (byte1, byte2) } else { (byte2, byte3) };
        trace!("iod label:{} tag:0x{:x}", label, tag);
        if tag != 0x02 {
            trace!("iod tag 0x{:02x} != 0x02", tag);
            return iod;
        }

        cursor.length();
        let mut od_id = (cursor.bytes(1) as u16) << 2;
        let flags = cursor.bytes(1) as u8;
        od_id |= (flags >> 6) as u16;
        iod.od_id = od_id;
        if (flags >> 5) & 0x01 != 0 {
            iod.url = Some(cursor.url());
            return iod;
        }

        // OD, scene, audio, visual, graphics profile levels
        cursor.bytes(5);

        let mut count = 0;
        while cursor.remaining() > 0 && count < ES_DESCRIPTOR_COUNT {
            count += 1;
            let tag = cursor.bytes(1);
            let length = cursor.length();
            let body = cursor.take(length);
            if tag != 0x03 {
                trace!("OD tag 0x{:x} unsupported", tag);
                continue;
            }
            if let Some(es) = Self::parse_es_descriptor(body) {
                iod.es.push(es);
            }
        }

        iod
    }

    fn parse_es_descriptor(body: &[u8]) -> Option<EsDescriptor> {
        let mut cursor = IodCursor::new(body);
        let mut es = EsDescriptor {
            es_id: cursor.bytes(2) as u16,
            ..Default::default()
        };
        let flags = cursor.bytes(1);
        if (flags >> 7) & 0x01 != 0 {
            cursor.bytes(2); // dependsOn_ES_ID
        }
        if (flags >> 6) & 0x01 != 0 {
            es.url = Some(cursor.url());
        }
        if (flags >> 5) & 0x01 != 0 {
            cursor.bytes(2); // OCR_ES_ID
        }

        if cursor.bytes(1) != 0x04 {
            trace!("missing DecoderConfigDescr");
            return None;
        }
        let config_length = cursor.length();
        es.decoder.object_type = cursor.bytes(1) as u8;
        es.decoder.stream_type = (cursor.bytes(1) >> 2) as u8;
        cursor.bytes(3); // bufferSizeDB
        cursor.bytes(4); // maxBitrate
        cursor.bytes(4); // avgBitrate

        if config_length > 13 && cursor.bytes(1) == 0x05 {
            let extra_length = cursor.length();
            es.decoder.extra = Bytes::copy_from_slice(cursor.take(extra_length));
        }

        if cursor.bytes(1) != 0x06 {
            trace!("missing SLConfigDescr");
            return None;
        }
        cursor.length();
        if cursor.bytes(1) != 0x01 {
            trace!("unsupported SLConfigDescr predefined");
        }

        Some(es)
    }

    /// Complete ES descriptor with the given id.
    pub fn find(&self, es_id: u16) -> Option<&EsDescriptor> {
        self.es.iter().find(|es| es.es_id == es_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// IOD with one AAC ES descriptor (es_id 0x0101, 2 bytes of decoder info).
    pub(crate) fn sample_iod() -> Vec<u8> {
        let mut es = vec![0x01, 0x01, 0x00];
        es.extend_from_slice(&[0x04, 15, 0x40, 0x15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x05, 2, 0x12, 0x10]);
        es.extend_from_slice(&[0x06, 1, 0x01]);

        let mut od = vec![0x00, 0x1F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        od.push(0x03);
        od.push(es.len() as u8);
        od.extend_from_slice(&es);

        let mut iod = vec![0x10, 0x01, 0x02, od.len() as u8];
        iod.extend_from_slice(&od);
        iod
    }

    #[test]
    fn test_parse_iod() {
        let iod = Iod::parse(&sample_iod());
        assert_eq!(iod.url, None);
        assert_eq!(iod.es.len(), 1);
        let es = iod.find(0x0101).unwrap();
        assert_eq!(es.decoder.object_type, 0x40);
        assert_eq!(es.decoder.stream_type, 0x05);
        assert_eq!(&es.decoder.extra[..], &[0x12, 0x10]);
        assert!(iod.find(0x0102).is_none());
    }

    #[test]
    fn test_url_and_garbage() {
        let iod = Iod::parse(&[0x10, 0x01, 0x02, 0x06, 0x00, 0x3F, 0x03, b'a', b'b', b'c']);
        assert_eq!(iod.url.as_deref(), Some("abc"));
        assert!(iod.es.is_empty());

        assert_eq!(Iod::parse(&[0x01]), Iod::default());
        assert!(Iod::parse(&[0x10, 0x01, 0x09, 0x00]).es.is_empty());
    }
}
