// Packet geometry
/// Standard packet size.
pub const TS_PACKET_SIZE: usize = 188;
/// M2TS packet: 4-byte timecode prefix plus a standard packet.
pub const TS_PACKET_SIZE_192: usize = 192;
/// Packet with 16 Reed-Solomon parity bytes.
pub const TS_PACKET_SIZE_204: usize = 204;
/// Largest supported packet.
pub const TS_PACKET_SIZE_MAX: usize = 204;
/// Fixed header length.
pub const TS_HEADER_SIZE: usize = 4;
/// First byte of every packet.
pub const TS_SYNC_BYTE: u8 = 0x47;

// PIDs
/// Number of PIDs (13 bits).
pub const PID_COUNT: usize = 8192;
/// Program Association Table.
pub const PID_PAT: u16 = 0x0000;
/// DVB Service Description Table.
pub const PID_SDT: u16 = 0x0011;
/// DVB Event Information Table.
pub const PID_EIT: u16 = 0x0012;
/// DVB Time and Date Table.
pub const PID_TDT: u16 = 0x0014;
/// Padding.
pub const PID_NULL: u16 = 0x1FFF;
/// PIDs filtered while DVB metadata is active.
pub const DVB_META_PIDS: [u16; 3] = [PID_SDT, PID_EIT, PID_TDT];

// Table IDs
/// PAT table id.
pub const TABLE_ID_PAT: u8 = 0x00;
/// PMT table id.
pub const TABLE_ID_PMT: u8 = 0x02;
/// SDT actual table id.
pub const TABLE_ID_SDT: u8 = 0x42;
/// EIT present/following, actual transport stream.
pub const TABLE_ID_EIT_PF: u8 = 0x4E;
/// First EIT schedule table id.
pub const TABLE_ID_EIT_SCHEDULE_FIRST: u8 = 0x50;
/// Last EIT schedule table id.
pub const TABLE_ID_EIT_SCHEDULE_LAST: u8 = 0x5F;
/// TDT table id.
pub const TABLE_ID_TDT: u8 = 0x70;
/// TOT table id.
pub const TABLE_ID_TOT: u8 = 0x73;
/// SCTE-27 subtitle message.
pub const TABLE_ID_SCTE27: u8 = 0xC6;

// Elementary stream types (ISO/IEC 13818-1 table 2-34 and common private uses)
/// ISO/IEC 11172-2 video.
pub const STREAM_TYPE_MPEG1_VIDEO: u8 = 0x01;
/// ISO/IEC 13818-2 video.
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
/// ISO/IEC 11172-3 audio.
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
/// ISO/IEC 13818-3 audio.
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
/// PES private data, resolved through descriptors.
pub const STREAM_TYPE_PRIVATE_PES: u8 = 0x06;
/// ADTS AAC.
pub const STREAM_TYPE_AAC: u8 = 0x0f;
/// MPEG-4 part 2 video.
pub const STREAM_TYPE_MPEG4_VIDEO: u8 = 0x10;
/// LATM AAC.
pub const STREAM_TYPE_AAC_LATM: u8 = 0x11;
/// MPEG-4 SL packetized stream in PES.
pub const STREAM_TYPE_MPEG4_SL_PES: u8 = 0x12;
/// H.264.
pub const STREAM_TYPE_H264: u8 = 0x1b;
/// H.265.
pub const STREAM_TYPE_H265: u8 = 0x24;
/// Blu-ray LPCM (0x83 outside HDMV is ATSC private).
pub const STREAM_TYPE_LPCM_BLURAY: u8 = 0x83;
/// Private MSCODEC video.
pub const STREAM_TYPE_MSCODEC: u8 = 0xa0;
/// Dirac video.
pub const STREAM_TYPE_DIRAC: u8 = 0xd1;
/// VC-1 video.
pub const STREAM_TYPE_VC1: u8 = 0xea;

// Descriptor tags
/// Registration (format identifier).
pub const DESC_REGISTRATION: u8 = 0x05;
/// Conditional access.
pub const DESC_CA: u8 = 0x09;
/// ISO 639 language.
pub const DESC_ISO639: u8 = 0x0a;
/// MPEG-4 initial object descriptor.
pub const DESC_IOD: u8 = 0x1d;
/// FlexMux timing.
pub const DESC_FMC: u8 = 0x1f;
/// DVB service.
pub const DESC_SERVICE: u8 = 0x48;
/// DVB short event.
pub const DESC_SHORT_EVENT: u8 = 0x4d;
/// DVB extended event.
pub const DESC_EXTENDED_EVENT: u8 = 0x4e;
/// DVB stream identifier (component tag).
pub const DESC_STREAM_IDENTIFIER: u8 = 0x52;
/// DVB parental rating.
pub const DESC_PARENTAL_RATING: u8 = 0x55;
/// DVB teletext.
pub const DESC_TELETEXT: u8 = 0x56;
/// DVB VBI teletext.
pub const DESC_VBI_TELETEXT: u8 = 0x46;
/// DVB VBI data.
pub const DESC_VBI_DATA: u8 = 0x45;
/// DVB subtitling.
pub const DESC_SUBTITLING: u8 = 0x59;
/// DVB AC-3.
pub const DESC_AC3: u8 = 0x6a;
/// DVB enhanced AC-3.
pub const DESC_EAC3: u8 = 0x7a;
/// DVB DTS.
pub const DESC_DTS: u8 = 0x73;
/// DVB extension descriptor (Opus and others).
pub const DESC_EXTENSION: u8 = 0x7f;
/// ATSC AC-3 audio.
pub const DESC_AC3_ATSC: u8 = 0x81;
/// ARIB data component (caption profile).
pub const DESC_ARIB_DATA_COMPONENT: u8 = 0xfd;

/// 33-bit PCR/PTS modulus minus one.
pub const PCR_MASK: i64 = 0x1_FFFF_FFFF;

/// Converts 90 kHz ticks to microseconds.
pub fn ticks_to_us(ticks: i64) -> i64 {
    ticks * 100 / 9
}

/// Converts microseconds to 90 kHz ticks.
pub fn us_to_ticks(us: i64) -> i64 {
    us * 9 / 100
}
