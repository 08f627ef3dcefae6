//! SI text decoding: DVB character tables (EN 300 468 annex A), the
//! ISO-8859-1 override for broken providers, and a reduced ARIB decoder.

use encoding_rs::{
    Encoding, BIG5, EUC_JP, EUC_KR, GBK, ISO_8859_10, ISO_8859_13, ISO_8859_14, ISO_8859_15,
    ISO_8859_16, ISO_8859_2, ISO_8859_3, ISO_8859_4, ISO_8859_5, ISO_8859_6, ISO_8859_7,
    ISO_8859_8, UTF_16BE, UTF_8, WINDOWS_1254, WINDOWS_874,
};

/// Text selection for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// EN 300 468 annex A
    Dvb,
    /// Provider mislabels ISO-8859-1 as the default table
    BrokenLatin1,
    /// ARIB STD-B24 8-unit code
    Arib,
}

/// Decodes SI text according to `mode`.
///
/// The Latin-1 override only applies when the first byte is printable,
/// i.e. when the string carries no explicit table selector.
pub fn convert(data: &[u8], mode: TextMode) -> String {
    match mode {
        TextMode::Arib => decode_arib(data),
        TextMode::BrokenLatin1 if data.first().is_some_and(|&b| b > 0x20) => decode_latin1(data),
        _ => decode_dvb(data),
    }
}

/// ISO 8859-1, byte for byte.
pub fn decode_latin1(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

fn iso8859(part: u8) -> Option<&'static Encoding> {
    Some(match part {
        2 => ISO_8859_2,
        3 => ISO_8859_3,
        4 => ISO_8859_4,
        5 => ISO_8859_5,
        6 => ISO_8859_6,
        7 => ISO_8859_7,
        8 => ISO_8859_8,
        9 => WINDOWS_1254,
        10 => ISO_8859_10,
        11 => WINDOWS_874,
        13 => ISO_8859_13,
        14 => ISO_8859_14,
        15 => ISO_8859_15,
        16 => ISO_8859_16,
        _ => return None,
    })
}

/// Removes DVB single-byte control codes; CR/LF (0x8A) becomes a newline.
fn strip_controls(data: &[u8]) -> Vec<u8> {
    data.iter()
        .filter_map(|&b| match b {
            0x8A => Some(b'\n'),
            0x80..=0x9F => None,
            _ => Some(b),
        })
        .collect()
}

/// DVB text (EN 300 468 annex A), charset selected by the leading byte.
pub fn decode_dvb(data: &[u8]) -> String {
    let Some(&first) = data.first() else {
        return String::new();
    };

    let (encoding, body): (Option<&'static Encoding>, &[u8]) = match first {
        0x01..=0x0B => (iso8859(first + 4), &data[1..]),
        0x10 if data.len() >= 3 => {
            if data[2] == 1 {
                return decode_latin1(&strip_controls(&data[3..]));
            }
            (iso8859(data[2]), &data[3..])
        }
        0x11 => (Some(UTF_16BE), &data[1..]),
        0x12 => (Some(EUC_KR), &data[1..]),
        0x13 => (Some(GBK), &data[1..]),
        0x14 => (Some(BIG5), &data[1..]),
        0x15 => (Some(UTF_8), &data[1..]),
        0x1F if data.len() >= 2 => (None, &data[2..]),
        0x00..=0x1F => (None, &data[1..]),
        _ => (None, data),
    };

    match encoding {
        Some(enc) if enc == UTF_16BE || enc == UTF_8 => enc.decode_without_bom_handling(body).0.into_owned(),
        Some(enc) => enc.decode_without_bom_handling(&strip_controls(body)).0.into_owned(),
        None => decode_iso6937(body),
    }
}

fn iso6937_char(b: u8) -> Option<char> {
    const HIGH: [char; 96] = [
        '\u{a0}', '¡', '¢', '£', '$', '¥', '#', '§', '¤', '‘', '“', '«', '←', '↑', '→', '↓',
        '°', '±', '²', '³', '×', 'µ', '¶', '·', '÷', '’', '”', '»', '¼', '½', '¾', '¿',
        '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0', '\0',
        '―', '¹', '®', '©', '™', '♪', '¬', '¦', '\0', '\0', '\0', '\0', '⅛', '⅜', '⅝', '⅞',
        'Ω', 'Æ', 'Đ', 'ª', 'Ħ', '\0', 'Ĳ', 'Ŀ', 'Ł', 'Ø', 'Œ', 'º', 'Þ', 'Ŧ', 'Ŋ', 'ŉ',
        'ĸ', 'æ', 'đ', 'ð', 'ħ', 'ı', 'ĳ', 'ŀ', 'ł', 'ø', 'œ', 'ß', 'þ', 'ŧ', 'ŋ', '\u{ad}',
    ];
    match b {
        0x00..=0x7F => Some(b as char),
        0xA0..=0xFF => Some(HIGH[(b - 0xA0) as usize]).filter(|&c| c != '\0'),
        _ => None,
    }
}

/// Combining mark for ISO 6937 diacritic prefixes 0xC1..=0xCF.
fn iso6937_mark(b: u8) -> Option<char> {
    Some(match b {
        0xC1 => '\u{300}',
        0xC2 => '\u{301}',
        0xC3 => '\u{302}',
        0xC4 => '\u{303}',
        0xC5 => '\u{304}',
        0xC6 => '\u{306}',
        0xC7 => '\u{307}',
        0xC8 => '\u{308}',
        0xCA => '\u{30a}',
        0xCB => '\u{327}',
        0xCD => '\u{30b}',
        0xCE => '\u{328}',
        0xCF => '\u{30c}',
        _ => return None,
    })
}

/// Precomposed form of the commonest accented Latin letters.
fn compose(base: char, mark: char) -> Option<char> {
    let table: &str = match mark {
        '\u{300}' => "AÀEÈIÌOÒUÙaàeèiìoòuù",
        '\u{301}' => "AÁEÉIÍOÓUÚYÝaáeéiíoóuúyýCĆcćNŃnńSŚsśZŹzź",
        '\u{302}' => "AÂEÊIÎOÔUÛaâeêiîoôuû",
        '\u{303}' => "AÃNÑOÕaãnñoõ",
        '\u{308}' => "AÄEËIÏOÖUÜaäeëiïoöuüyÿ",
        '\u{30a}' => "AÅaåUŮuů",
        '\u{327}' => "CÇcçSŞsş",
        '\u{30c}' => "CČcčSŠsšZŽzžRŘrřEĚeěNŇnňDĎdďTŤtť",
        '\u{328}' => "AĄaąEĘeę",
        '\u{30b}' => "OŐoőUŰuű",
        _ => return None,
    };
    let chars: Vec<char> = table.chars().collect();
    chars
        .chunks_exact(2)
        .find(|pair| pair[0] == base)
        .map(|pair| pair[1])
}

/// ISO/IEC 6937, the DVB default table.
pub fn decode_iso6937(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    let mut iter = data.iter().copied().peekable();
    while let Some(b) = iter.next() {
        match b {
            0x8A => out.push('\n'),
            0x80..=0x9F => {}
            0xC1..=0xCF => {
                let Some(mark) = iso6937_mark(b) else {
                    continue;
                };
                let Some(base) = iter.next().and_then(iso6937_char) else {
                    continue;
                };
                match compose(base, mark) {
                    Some(c) => out.push(c),
                    None => {
                        out.push(base);
                        out.push(mark);
                    }
                }
            }
            _ => {
                if let Some(c) = iso6937_char(b) {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// ARIB STD-B24 text with the default designations (G0 kanji in GL,
/// G2 hiragana in GR). Escape and control sequences are skipped.
pub fn decode_arib(data: &[u8]) -> String {
    let mut out = String::new();
    let mut kanji = Vec::new();
    let mut i = 0;

    let flush = |kanji: &mut Vec<u8>, out: &mut String| {
        if !kanji.is_empty() {
            out.push_str(&EUC_JP.decode_without_bom_handling(&kanji[..]).0);
            kanji.clear();
        }
    };

    while i < data.len() {
        let b = data[i];
        match b {
            0x21..=0x7E if i + 1 < data.len() && (0x21..=0x7E).contains(&data[i + 1]) => {
                kanji.push(b | 0x80);
                kanji.push(data[i + 1] | 0x80);
                i += 2;
                continue;
            }
            _ => flush(&mut kanji, &mut out),
        }
        match b {
            0x0D | 0x0A => out.push('\n'),
            0x20 => out.push(' '),
            0xA1..=0xF3 => {
                if let Some(c) = char::from_u32(0x3041 + (b - 0xA1) as u32) {
                    out.push(c);
                }
            }
            // ESC plus its designation bytes
            0x1B => i += 2,
            // single and locking shifts, colour and size controls with a parameter
            0x19 | 0x1D | 0x90 | 0x91 | 0x93 | 0x94 | 0x97 => i += 1,
            _ => {}
        }
        i += 1;
    }
    flush(&mut kanji, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_table() {
        assert_eq!(decode_dvb(b"News"), "News");
        assert_eq!(decode_dvb(&[b'C', 0xC2, b'e', b't', 0x8A, b'x']), "Cét\nx");
        assert_eq!(decode_dvb(&[0xC8, b'o', 0xFB]), "öß");
        assert_eq!(decode_dvb(&[]), "");
    }

    #[test]
    fn test_selectors() {
        // ISO-8859-5 cyrillic
        assert_eq!(decode_dvb(&[0x01, 0xB0]), "А");
        assert_eq!(decode_dvb(&[0x10, 0x00, 0x02, 0xA9]), "Š");
        assert_eq!(decode_dvb(&[0x10, 0x00, 0x01, 0xE9]), "é");
        assert_eq!(decode_dvb(&[0x15, 0xC3, 0xA9]), "é");
        assert_eq!(decode_dvb(&[0x11, 0x00, 0x41, 0x00, 0xE9]), "Aé");
    }

    #[test]
    fn test_broken_latin1() {
        let bytes = [b'T', 0xE9, b'l', b'e'];
        assert_eq!(convert(&bytes, TextMode::BrokenLatin1), "Téle");
        assert_ne!(convert(&bytes, TextMode::Dvb), "Téle");
        // an explicit selector wins over the override
        assert_eq!(convert(&[0x15, b'a'], TextMode::BrokenLatin1), "a");
    }

    #[test]
    fn test_arib_subset() {
        // JIS 0x3021 is 亜
        assert_eq!(decode_arib(&[0x30, 0x21, 0x20, 0xA2]), "亜 あ");
    }
}
