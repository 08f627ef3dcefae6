//! Demuxer options and the extra-PMT definition syntax.
//!
//! Options come from [`DemuxConfig::default`], optionally overlaid by
//! environment variables and a `key = value` file through [`DemuxConfig::load`].

use crate::av::{EsCategory, Fourcc};
use crate::error::{DemuxError, Result};
use log::{debug, warn};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const CONFIG_PATHS: [&str; 2] = ["./tsdemux.toml", "./tsdemux_config.toml"];
const ENV_PREFIX: &str = "TSDEMUX_";

const OPTION_KEYS: [&str; 11] = [
    "extra_pmt",
    "trust_pcr",
    "es_id_pid",
    "csa_key",
    "csa2_key",
    "csa_packet_size",
    "split_es",
    "seek_percent",
    "arib",
    "force",
    "packets_per_call",
];

/// ARIB STD-B24/B10 handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AribMode {
    /// Enabled when a PMT carries the ARIB CA system and descriptors
    #[default]
    Auto,
    /// Always decode ARIB text and map ARIB stream types
    Enabled,
    /// Never treat the stream as ARIB
    Disabled,
}

impl FromStr for AribMode {
    type Err = DemuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(AribMode::Auto),
            "enabled" | "on" | "true" => Ok(AribMode::Enabled),
            "disabled" | "off" | "false" => Ok(AribMode::Disabled),
            other => Err(DemuxError::InvalidOption(format!("arib mode '{}'", other))),
        }
    }
}

/// Options recognized by the demuxer.
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxConfig {
    /// User supplied PMT, `pid[:program]=pid:type[,...]`
    pub extra_pmt: Option<String>,
    /// Forward stream PCRs to the sink; when false, PES timestamps drive the program clock
    pub trust_pcr: bool,
    /// Use the PID as the elementary stream id
    pub es_id_pid: bool,
    /// CSA odd control word
    pub csa_key: Option<String>,
    /// CSA even control word
    pub csa2_key: Option<String>,
    /// Number of packet bytes handed to the descrambler
    pub csa_packet_size: i64,
    /// Expose teletext/subtitle pages as separate streams
    pub split_es: bool,
    /// Seek by byte percentage instead of PCR
    pub seek_percent: bool,
    /// ARIB detection policy
    pub arib: AribMode,
    /// Accept a stream without a sync pattern as 188-byte TS
    pub force: bool,
    /// Packets processed per demux call
    pub packets_per_call: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            extra_pmt: None,
            trust_pcr: true,
            es_id_pid: true,
            csa_key: None,
            csa2_key: None,
            csa_packet_size: 188,
            split_es: true,
            seek_percent: false,
            arib: AribMode::Auto,
            force: false,
            packets_per_call: 100,
        }
    }
}

impl DemuxConfig {
    /// Defaults overlaid by `TSDEMUX_*` environment variables, then by the
    /// first readable option file in the working directory.
    pub fn load() -> Self {
        let mut config = DemuxConfig::default();

        for key in OPTION_KEYS {
            let var = format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase());
            if let Ok(value) = env::var(&var) {
                if let Err(e) = config.set_option(key, &value) {
                    warn!("ignoring {}: {}", var, e);
                }
            }
        }

        for path in CONFIG_PATHS {
            if let Ok(content) = fs::read_to_string(path) {
                debug!("reading demux options from {}", path);
                config.apply_file(&content);
                break;
            }
        }

        config
    }

    /// Applies `key = value` lines; `#` starts a comment.
    pub fn apply_file(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if let Err(e) = self.set_option(key.trim(), value) {
                warn!("ignoring option line '{}': {}", line, e);
            }
        }
    }

    /// Sets one option from its textual value.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "extra_pmt" => self.extra_pmt = non_empty(value),
            "trust_pcr" => self.trust_pcr = parse_bool(value)?,
            "es_id_pid" => self.es_id_pid = parse_bool(value)?,
            "csa_key" => self.csa_key = non_empty(value),
            "csa2_key" => self.csa2_key = non_empty(value),
            "csa_packet_size" => self.csa_packet_size = value.parse()?,
            "split_es" => self.split_es = parse_bool(value)?,
            "seek_percent" => self.seek_percent = parse_bool(value)?,
            "arib" => self.arib = value.parse()?,
            "force" => self.force = parse_bool(value)?,
            "packets_per_call" => {
                let n: usize = value.parse()?;
                if n == 0 {
                    return Err(DemuxError::InvalidOption("packets_per_call must be > 0".into()));
                }
                self.packets_per_call = n;
            }
            _ => return Err(DemuxError::InvalidOption(format!("unknown option '{}'", key))),
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DemuxError::InvalidOption(format!("'{}' is not a boolean", value))),
    }
}

/// Parses a C-style integer prefix (`0x` hex, leading-zero octal, decimal).
///
/// Returns the value and the unparsed remainder; no digits yields `(0, input)`.
pub(crate) fn parse_c_int(input: &str) -> (i64, &str) {
    let s = input.trim_start();
    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, digits) = if body.len() > 2
        && (body.starts_with("0x") || body.starts_with("0X"))
        && body.as_bytes()[2].is_ascii_hexdigit()
    {
        (16, &body[2..])
    } else if body.starts_with('0') {
        (8, body)
    } else {
        (10, body)
    };

    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return (0, input);
    }

    let value = i64::from_str_radix(&digits[..end], radix).unwrap_or(i64::MAX);
    (if negative { -value } else { value }, &digits[end..])
}

/// How one extra-PMT entry declares its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserStream {
    /// The entry only names the PCR PID
    Pcr,
    /// `video=`, `audio=` or `spu=` with an optional four character codec
    Typed {
        /// Stream category
        category: EsCategory,
        /// Codec; without one the stream is not declared
        codec: Option<Fourcc>,
    },
    /// An ISO/IEC 13818-1 stream type
    StreamType(u8),
}

/// One `pid:type` entry of an extra PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPmtEntry {
    /// Elementary stream PID
    pub pid: u16,
    /// What the PID carries
    pub stream: UserStream,
}

/// A PMT supplied through options instead of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPmt {
    /// PID the PMT would be carried on
    pub pmt_pid: u16,
    /// Program number, 0 when not given
    pub program: i32,
    /// Declared elementary streams
    pub entries: Vec<UserPmtEntry>,
}

impl UserPmt {
    /// Parses `pid[:program]=pid:type[,...]`.
    ///
    /// An invalid PMT PID is an error; invalid stream entries are skipped.
    pub fn parse(definition: &str) -> Result<Self> {
        let (pmt_pid, rest) = parse_c_int(definition);
        if !(2..8191).contains(&pmt_pid) {
            return Err(DemuxError::InvalidOption(format!(
                "extra PMT pid {} out of range",
                pmt_pid
            )));
        }

        let mut program = 0;
        let mut rest = rest;
        if let Some(tail) = rest.strip_prefix(':') {
            let (number, tail) = parse_c_int(tail);
            program = number as i32;
            rest = tail;
        }

        let mut entries = Vec::new();
        if let Some((_, list)) = rest.split_once('=') {
            for item in list.split(',') {
                match Self::parse_entry(item) {
                    Some(entry) => entries.push(entry),
                    None => debug!("skipping extra PMT entry '{}'", item),
                }
            }
        }

        Ok(UserPmt {
            pmt_pid: pmt_pid as u16,
            program,
            entries,
        })
    }

    fn parse_entry(item: &str) -> Option<UserPmtEntry> {
        let (pid, rest) = parse_c_int(item);
        let opt = rest.strip_prefix(':')?;
        if !(2..8191).contains(&pid) {
            return None;
        }

        let stream = if opt == "pcr" {
            UserStream::Pcr
        } else {
            let (kind, arg) = match opt.split_once('=') {
                Some((kind, arg)) => (kind, Some(arg)),
                None => (opt, None),
            };
            let category = match kind {
                "video" => Some(EsCategory::Video),
                "audio" => Some(EsCategory::Audio),
                "spu" => Some(EsCategory::Subtitle),
                _ => None,
            };
            match category {
                Some(category) => UserStream::Typed {
                    category,
                    codec: arg
                        .filter(|a| a.len() == 4)
                        .and_then(|a| Fourcc::from_slice(a.as_bytes())),
                },
                None => UserStream::StreamType(parse_c_int(kind).0 as u8),
            }
        };

        Some(UserPmtEntry {
            pid: pid as u16,
            stream,
        })
    }
}

/// Writes a commented options template unless the file already exists.
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# tsdemux options

# extra_pmt = "0x100:1=0x101:video=h264,0x101:pcr"
trust_pcr = true
es_id_pid = true
split_es = true
seek_percent = false
csa_packet_size = 188
arib = "auto"
"#;
        fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::codecs;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = DemuxConfig::default();
        assert!(config.trust_pcr);
        assert!(config.es_id_pid);
        assert!(config.split_es);
        assert!(!config.seek_percent);
        assert_eq!(config.csa_packet_size, 188);
        assert_eq!(config.arib, AribMode::Auto);
        assert_eq!(config.packets_per_call, 100);
    }

    #[test]
    fn test_apply_file() {
        let mut config = DemuxConfig::default();
        config.apply_file(
            "# comment\ntrust_pcr = false\narib = 'enabled'\ncsa_key = \"0x0102030405060708\"\nbogus = 1\n",
        );
        assert!(!config.trust_pcr);
        assert_eq!(config.arib, AribMode::Enabled);
        assert_eq!(config.csa_key.as_deref(), Some("0x0102030405060708"));
        assert!(config.set_option("split_es", "maybe").is_err());
        assert!(config.set_option("packets_per_call", "0").is_err());
    }

    #[test]
    fn test_parse_c_int() {
        assert_eq!(parse_c_int("0x100:1"), (0x100, ":1"));
        assert_eq!(parse_c_int("010,"), (8, ","));
        assert_eq!(parse_c_int("257"), (257, ""));
        assert_eq!(parse_c_int("0"), (0, ""));
        assert_eq!(parse_c_int("pcr"), (0, "pcr"));
    }

    #[test]
    fn test_user_pmt() {
        let pmt = UserPmt::parse("0x100:3=0x101:video=h264,0x102:pcr,0x103:0x0f,5000:spu,1:audio").unwrap();
        assert_eq!(pmt.pmt_pid, 0x100);
        assert_eq!(pmt.program, 3);
        assert_eq!(
            pmt.entries,
            vec![
                UserPmtEntry {
                    pid: 0x101,
                    stream: UserStream::Typed {
                        category: EsCategory::Video,
                        codec: Some(codecs::H264),
                    },
                },
                UserPmtEntry {
                    pid: 0x102,
                    stream: UserStream::Pcr,
                },
                UserPmtEntry {
                    pid: 0x103,
                    stream: UserStream::StreamType(0x0f),
                },
                UserPmtEntry {
                    pid: 5000,
                    stream: UserStream::Typed {
                        category: EsCategory::Subtitle,
                        codec: None,
                    },
                },
            ]
        );

        assert!(UserPmt::parse("1=0x101:pcr").is_err());
        assert!(UserPmt::parse("8191").is_err());
        assert_eq!(UserPmt::parse("0x20").unwrap().entries, vec![]);
    }
}
