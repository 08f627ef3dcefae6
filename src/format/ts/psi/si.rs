//! DVB service information: SDT, EIT and TDT/TOT.

use super::is_eit;
use super::text::{convert, TextMode};
use crate::av::{Epg, EpgEvent, EsOut, Metadata};
use crate::config::AribMode;
use crate::format::ts::descriptor::{self as desc, parse_descriptors, Descriptor};
use crate::format::ts::section::Table;
use crate::format::ts::types::*;
use crate::format::ts::TsDemuxer;
use crate::format::ByteSource;
use chrono::{NaiveDate, Utc};
use log::debug;

const CLOCK_FREQ: i64 = 1_000_000;

/// JST is UTC+9; ARIB event times are local.
const ARIB_TIMEZONE: i64 = -9 * 3600;

const SERVICE_TYPES: [&str; 17] = [
    "Reserved",
    "Digital television service",
    "Digital radio sound service",
    "Teletext service",
    "NVOD reference service",
    "NVOD time-shifted service",
    "Mosaic service",
    "PAL coded signal",
    "SECAM coded signal",
    "D/D2-MAC",
    "FM Radio",
    "NTSC coded signal",
    "Data broadcast service",
    "Reserved for Common Interface Usage",
    "RCS Map (see EN 301 790 [35])",
    "RCS FLS (see EN 301 790 [35])",
    "DVB MHP service",
];

const RUNNING_STATUS: [&str; 5] = [
    "Unknown",
    "Not running",
    "Starts in a few seconds",
    "Pausing",
    "Running",
];

/// Providers that send ISO-8859-1 without a table selector.
const BROKEN_PROVIDERS: [&[u8]; 4] = [b"CSAT", b"GR1", b"MULTI4", b"MR5"];

/// SKY DE & BetaDigital
const BROKEN_NETWORK_ID: u16 = 133;

fn from_bcd(v: u8) -> i64 {
    ((v >> 4) & 0x0F) as i64 * 10 + (v & 0x0F) as i64
}

/// Gregorian date of a Modified Julian Day (EN 300 468 annex C).
pub fn decode_mjd(mjd: u16) -> (i32, u32, u32) {
    let mjd = mjd as f64;
    let yp = ((mjd - 15078.2) / 365.25) as i32;
    let mp = ((mjd - 14956.1 - (yp as f64 * 365.25).trunc()) / 30.6001) as i32;
    let k = (mp == 14 || mp == 15) as i32;
    let day = mjd as i32 - 14956 - (yp as f64 * 365.25) as i32 - (mp as f64 * 30.6001) as i32;
    (1900 + yp + k, (mp - 1 - k * 12) as u32, day as u32)
}

/// Seconds since the epoch of a 40-bit MJD + BCD time, `None` when undefined.
pub fn convert_start_time(raw: &[u8; 5]) -> Option<i64> {
    if raw.iter().all(|&b| b == 0xFF) {
        return None;
    }
    let (year, month, day) = decode_mjd(u16::from_be_bytes([raw[0], raw[1]]));
    if year < 1970 {
        return None;
    }
    let time = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(
        from_bcd(raw[2]) as u32,
        from_bcd(raw[3]) as u32,
        from_bcd(raw[4]) as u32,
    )?;
    Some(time.and_utc().timestamp())
}

/// Seconds of a 24-bit BCD `hhmmss` duration.
pub fn convert_duration(raw: &[u8; 3]) -> i64 {
    from_bcd(raw[0]) * 3600 + from_bcd(raw[1]) * 60 + from_bcd(raw[2])
}

fn now_us() -> i64 {
    Utc::now().timestamp_micros()
}

/// One service of an SDT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdtService {
    /// Service id (program number)
    pub service_id: u16,
    /// EIT schedule present
    pub eit_schedule: bool,
    /// EIT present/following present
    pub eit_present: bool,
    /// Running status (4 running)
    pub running_status: u8,
    /// Components are scrambled
    pub free_ca: bool,
    /// Service descriptors
    pub descriptors: Vec<Descriptor>,
}

/// Service Description Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdt {
    /// transport_stream_id
    pub ts_id: u16,
    /// Version number
    pub version: u8,
    /// current_next_indicator
    pub current_next: bool,
    /// original_network_id
    pub network_id: u16,
    /// Services in table order
    pub services: Vec<SdtService>,
}

impl Sdt {
    /// Decodes every section of the table.
    pub fn parse(table: &Table) -> Self {
        let mut network_id = 0;
        let mut services = Vec::new();
        for payload in table.payloads() {
            if payload.len() < 3 {
                continue;
            }
            network_id = u16::from_be_bytes([payload[0], payload[1]]);
            let mut p = &payload[3..];
            while p.len() >= 5 {
                let len = (u16::from_be_bytes([p[3] & 0x0F, p[4]]) as usize).min(p.len() - 5);
                services.push(SdtService {
                    service_id: u16::from_be_bytes([p[0], p[1]]),
                    eit_schedule: p[2] & 0x02 != 0,
                    eit_present: p[2] & 0x01 != 0,
                    running_status: p[3] >> 5,
                    free_ca: p[3] & 0x10 != 0,
                    descriptors: parse_descriptors(&p[5..5 + len]),
                });
                p = &p[5 + len..];
            }
        }
        Self {
            ts_id: table.extension,
            version: table.version,
            current_next: table.current_next,
            network_id,
            services,
        }
    }
}

/// One event of an EIT section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EitEvent {
    /// Event id
    pub event_id: u16,
    /// MJD + BCD UTC start (JST for ARIB)
    pub start_time: [u8; 5],
    /// BCD duration
    pub duration: [u8; 3],
    /// Running status (4 running)
    pub running_status: u8,
    /// Event is scrambled
    pub free_ca: bool,
    /// Event descriptors
    pub descriptors: Vec<Descriptor>,
}

/// Event Information Table (one section's worth of events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eit {
    /// Table id, present/following or schedule
    pub table_id: u8,
    /// Service id (program number)
    pub service_id: u16,
    /// Version number
    pub version: u8,
    /// current_next_indicator
    pub current_next: bool,
    /// transport_stream_id
    pub ts_id: u16,
    /// original_network_id
    pub network_id: u16,
    /// Events in section order
    pub events: Vec<EitEvent>,
}

impl Eit {
    /// Decodes the events of the table.
    pub fn parse(table: &Table) -> Self {
        let mut ts_id = 0;
        let mut network_id = 0;
        let mut events = Vec::new();
        for payload in table.payloads() {
            if payload.len() < 6 {
                continue;
            }
            ts_id = u16::from_be_bytes([payload[0], payload[1]]);
            network_id = u16::from_be_bytes([payload[2], payload[3]]);
            let mut p = &payload[6..];
            while p.len() >= 12 {
                let len = (u16::from_be_bytes([p[10] & 0x0F, p[11]]) as usize).min(p.len() - 12);
                events.push(EitEvent {
                    event_id: u16::from_be_bytes([p[0], p[1]]),
                    start_time: [p[2], p[3], p[4], p[5], p[6]],
                    duration: [p[7], p[8], p[9]],
                    running_status: p[10] >> 5,
                    free_ca: p[10] & 0x10 != 0,
                    descriptors: parse_descriptors(&p[12..12 + len]),
                });
                p = &p[12 + len..];
            }
        }
        Self {
            table_id: table.table_id,
            service_id: table.extension,
            version: table.version,
            current_next: table.current_next,
            ts_id,
            network_id,
            events,
        }
    }
}

/// UTC time carried by a TDT or TOT.
pub fn parse_utc_time(table: &Table) -> Option<i64> {
    let payload = table.payloads().next()?;
    let raw: [u8; 5] = payload.get(..5)?.try_into().ok()?;
    convert_start_time(&raw)
}

/// Broadcast time of the running event, from EIT present/following and TDT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DvbTime {
    /// Event start, µs since the epoch
    pub start: i64,
    /// Event duration in µs, 0 when unknown
    pub length: i64,
    /// Stream UTC minus wall clock, µs
    pub tdt_delta: i64,
}

impl DvbTime {
    /// `(elapsed, length)` of the running event at wall-clock time `now`.
    pub fn event_info(&self, now: i64) -> Option<(i64, i64)> {
        if self.length <= 0 {
            return None;
        }
        let t = now + self.tdt_delta;
        (self.start <= t && t < self.start + self.length).then(|| (t - self.start, self.length))
    }

    /// [`event_info`](Self::event_info) at the current wall-clock time.
    pub fn current_event(&self) -> Option<(i64, i64)> {
        self.event_info(now_us())
    }
}

impl<S: ByteSource, O: EsOut> TsDemuxer<S, O> {
    fn text_mode(&self) -> TextMode {
        if self.arib == AribMode::Enabled {
            TextMode::Arib
        } else if self.broken_charset {
            TextMode::BrokenLatin1
        } else {
            TextMode::Dvb
        }
    }

    /// Routes a table from one of the DVB SI PIDs.
    pub(crate) fn handle_si(&mut self, table: &Table) {
        match table.table_id {
            TABLE_ID_SDT if self.pat_version.is_some() => self.handle_sdt(table),
            id if is_eit(id) && self.sdt_version.is_some() => self.handle_eit(table),
            TABLE_ID_TDT | TABLE_ID_TOT if self.sdt_version.is_some() => self.handle_tdt(table),
            id => debug!("SI table 0x{:02x} not handled yet", id),
        }
    }

    fn handle_sdt(&mut self, table: &Table) {
        let sdt = Sdt::parse(table);
        debug!("SDT received");
        if self.sdt_version.is_some() && (!sdt.current_next || self.sdt_version == Some(sdt.version)) {
            return;
        }
        debug!(
            "new SDT ts_id={} version={} current_next={} network_id={}",
            sdt.ts_id, sdt.version, sdt.current_next, sdt.network_id
        );

        self.broken_charset = false;
        for service in &sdt.services {
            debug!(
                "  * service id={} eit schedule={} present={} running={} free_ca={}",
                service.service_id,
                service.eit_schedule,
                service.eit_present,
                service.running_status,
                service.free_ca
            );

            let mut meta = Metadata::default();
            let mut service_type = None;
            for d in service.descriptors.iter().filter(|d| d.tag == DESC_SERVICE) {
                let Some(sd) = desc::ServiceDescriptor::parse(d) else {
                    continue;
                };
                if sdt.network_id == BROKEN_NETWORK_ID
                    || BROKEN_PROVIDERS.iter().any(|p| &sd.provider[..] == *p)
                {
                    self.broken_charset = true;
                }

                let mode = self.text_mode();
                let provider = convert(&sd.provider, mode);
                let name = convert(&sd.name, mode);
                debug!("    - type={} provider={} name={}", sd.service_type, provider, name);

                meta.title = Some(name);
                meta.publisher = Some(provider);
                if (0x01..=0x10).contains(&sd.service_type) {
                    service_type = Some(SERVICE_TYPES[sd.service_type as usize]);
                }
            }

            if let Some(kind) = service_type {
                meta.extra.push(("Type".into(), kind.into()));
            }
            if (0x01..=0x04).contains(&service.running_status) {
                meta.extra.push((
                    "Status".into(),
                    RUNNING_STATUS[service.running_status as usize].into(),
                ));
            }
            self.out.set_group_meta(service.service_id as i32, &meta);
        }
        self.sdt_version = Some(sdt.version);
    }

    fn handle_eit(&mut self, table: &Table) {
        let eit = Eit::parse(table);
        let present_following = eit.table_id == TABLE_ID_EIT_PF;
        debug!("EIT received");
        if present_following && !eit.current_next {
            return;
        }
        debug!(
            "new EIT service_id={} version={} current_next={} ts_id={} network_id={}",
            eit.service_id, eit.version, eit.current_next, eit.ts_id, eit.network_id
        );

        let mode = self.text_mode();
        let mut epg = Epg::default();
        for event in &eit.events {
            let mut start = convert_start_time(&event.start_time).unwrap_or(-1);
            let duration = convert_duration(&event.duration);
            let mut running = event.running_status;

            if self.arib == AribMode::Enabled {
                if self.dvb_time.tdt_delta == 0 {
                    self.dvb_time.tdt_delta = CLOCK_FREQ * (start + duration - 5) - now_us();
                }
                let tot_time = (now_us() + self.dvb_time.tdt_delta) / CLOCK_FREQ + ARIB_TIMEZONE;
                start += ARIB_TIMEZONE;
                if running == 0x00 && start - 5 < tot_time && tot_time < start + duration + 5 {
                    running = 0x04;
                    debug!("  EIT running status 0x00 -> 0x04");
                }
            }
            debug!(
                "  * event id={} start_time:{} duration={} running={} free_ca={}",
                event.event_id, start, duration, running, event.free_ca
            );

            let mut name = None;
            let mut text = None;
            let mut extra = String::new();
            let mut min_age = 0;
            for d in &event.descriptors {
                match d.tag {
                    DESC_SHORT_EVENT => {
                        if let Some(se) = desc::ShortEvent::parse(d).filter(|_| name.is_none()) {
                            let n = convert(&se.name, mode);
                            let t = convert(&se.text, mode);
                            debug!(
                                "    - short event lang={} '{}' : '{}'",
                                String::from_utf8_lossy(&se.language),
                                n,
                                t
                            );
                            name = Some(n);
                            text = Some(t);
                        }
                    }
                    DESC_EXTENDED_EVENT => {
                        if let Some(ee) = desc::ExtendedEvent::parse(d) {
                            debug!(
                                "    - extended event lang={} [{}/{}]",
                                String::from_utf8_lossy(&ee.language),
                                ee.number,
                                ee.last_number
                            );
                            if !ee.text.is_empty() {
                                let t = convert(&ee.text, mode);
                                debug!("       - text='{}'", t);
                                extra.push_str(&t);
                            }
                            for (dsc, item) in &ee.items {
                                debug!(
                                    "       - desc='{}' item='{}'",
                                    convert(dsc, mode),
                                    convert(item, mode)
                                );
                            }
                        }
                    }
                    DESC_PARENTAL_RATING => {
                        for (_, rating) in desc::parental_ratings(d) {
                            if (0x01..=0x0F).contains(&rating) && rating + 3 > min_age {
                                min_age = rating + 3;
                                debug!("    - parental control set to {} years", min_age);
                            }
                        }
                    }
                    other => debug!("    - event unknown dr 0x{:x}({})", other, other),
                }
            }

            if let (true, Some(name), Some(text)) = (start > 0, name, text) {
                epg.add_event(EpgEvent {
                    start,
                    duration,
                    name,
                    short_description: text,
                    description: (!extra.is_empty()).then_some(extra),
                    min_age,
                });
                if running == 0x04 {
                    epg.set_current(start);
                }
            }
        }

        if epg.events.is_empty() {
            return;
        }
        let current = self.selection.current;
        if present_following && (current == -1 || current == eit.service_id as i32) {
            self.dvb_time.start = 0;
            self.dvb_time.length = 0;
            if let Some(event) = epg
                .current
                .and_then(|start| epg.events.iter().find(|e| e.start == start))
            {
                self.dvb_time.start = CLOCK_FREQ * event.start;
                self.dvb_time.length = CLOCK_FREQ * event.duration;
            }
        }
        self.out.set_group_epg(eit.service_id as i32, &epg);
    }

    fn handle_tdt(&mut self, table: &Table) {
        if let Some(utc) = parse_utc_time(table) {
            self.dvb_time.tdt_delta = CLOCK_FREQ * utc - now_us();
            debug!("TDT/TOT utc={} delta={}us", utc, self.dvb_time.tdt_delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::section::tests::long_section;
    use crate::format::ts::section::Section;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mjd_and_bcd() {
        // EN 300 468 annex C example: 93/10/13 12:45:00
        assert_eq!(decode_mjd(0xC079), (1993, 10, 13));
        assert_eq!(
            convert_start_time(&[0xC0, 0x79, 0x12, 0x45, 0x00]),
            Some(750_516_300)
        );
        assert_eq!(convert_start_time(&[0xFF; 5]), None);
        assert_eq!(convert_duration(&[0x01, 0x45, 0x30]), 6330);
    }

    #[test]
    fn test_parse_sdt() {
        let mut body = vec![0x00, 0x85, 0xFF];
        let service = [0x48, 0x0A, 0x01, 0x04, b'C', b'S', b'A', b'T', 0x03, b'F', b'o', b'o'];
        body.extend_from_slice(&[0x00, 0x07, 0xFF, 0x80, service.len() as u8]);
        body.extend_from_slice(&service);
        let table = Table::from(Section::parse(Bytes::from(long_section(TABLE_ID_SDT, 9, 1, 0, 0, &body))).unwrap());

        let sdt = Sdt::parse(&table);
        assert_eq!(sdt.network_id, 133);
        assert_eq!(sdt.services.len(), 1);
        let s = &sdt.services[0];
        assert_eq!(s.service_id, 7);
        assert_eq!(s.running_status, 4);
        assert!(s.eit_schedule && s.eit_present);
        assert_eq!(s.descriptors[0].tag, DESC_SERVICE);
    }

    #[test]
    fn test_parse_eit_and_tdt() {
        let mut body = vec![0x00, 0x01, 0x00, 0x02, 0x00, 0x4E];
        let short = [0x4D, 0x09, b'e', b'n', b'g', 0x02, b'N', b'w', 0x02, b'T', b'x'];
        body.extend_from_slice(&[0x00, 0x10, 0xC0, 0x79, 0x12, 0x45, 0x00, 0x00, 0x30, 0x00]);
        body.extend_from_slice(&[0x80, short.len() as u8]);
        body.extend_from_slice(&short);
        let table = Table::from(Section::parse(Bytes::from(long_section(TABLE_ID_EIT_PF, 7, 0, 0, 0, &body))).unwrap());

        let eit = Eit::parse(&table);
        assert_eq!(eit.service_id, 7);
        assert_eq!(eit.events.len(), 1);
        assert_eq!(eit.events[0].running_status, 4);
        assert_eq!(convert_duration(&eit.events[0].duration), 1800);

        let tdt = Table::from(Section::parse(Bytes::from_static(&[0x70, 0x70, 0x05, 0xC0, 0x79, 0x12, 0x45, 0x00])).unwrap());
        assert_eq!(parse_utc_time(&tdt), Some(750_516_300));
    }

    #[test]
    fn test_event_window() {
        let time = DvbTime {
            start: 1_000_000,
            length: 10_000_000,
            tdt_delta: 500_000,
        };
        assert_eq!(time.event_info(1_500_000), Some((1_000_000, 10_000_000)));
        assert_eq!(time.event_info(11_000_000), None);
        assert_eq!(DvbTime::default().event_info(0), None);
    }
}
