use super::clock::ClockState;
use super::csa::{CsaHandle, Descrambler};
use super::parser::{pid_of, AdaptationField};
use super::pid::{PidRole, PidTable};
use super::program::{GroupSelection, Program, ProgramRegistry, Selection};
use super::psi::si::DvbTime;
use super::psi::PsiContext;
use super::section::Table;
use super::sync::{detect_packet_format, read_packet, PacketFormat};
use super::types::*;
use crate::av::EsOut;
use crate::config::{AribMode, DemuxConfig};
use crate::error::{DemuxError, Result};
use crate::format::{ByteSource, SignalInfo, TitleInfo};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of one [`TsDemuxer::demux`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxStatus {
    /// More packets may follow
    Continue,
    /// The source is exhausted
    Eof,
}

/// MPEG Transport Stream demuxer.
///
/// Reads packets from a [`ByteSource`], follows the PSI tables to discover
/// programs and their elementary streams, reassembles PES packets and hands
/// finished access units to an [`EsOut`].
pub struct TsDemuxer<S: ByteSource, O: EsOut> {
    pub(crate) source: S,
    pub(crate) out: O,
    pub(crate) config: DemuxConfig,
    pub(crate) format: PacketFormat,

    pub(crate) pids: PidTable,
    pub(crate) programs: ProgramRegistry,
    pub(crate) selection: Selection,
    pub(crate) pat_version: Option<u8>,
    pub(crate) sdt_version: Option<u8>,
    /// Outputs currently declared to the sink
    pub(crate) pmt_es: usize,
    pub(crate) user_pmt: bool,

    /// PID filtering is available on the source
    pub(crate) access_control: bool,
    /// SDT/EIT/TDT are parsed on their DVB PIDs
    pub(crate) dvb_meta: bool,
    pub(crate) arib: AribMode,
    pub(crate) broken_charset: bool,
    pub(crate) dvb_time: DvbTime,

    pub(crate) clock: ClockState,
    pub(crate) csa: CsaHandle,
    start_record: bool,
    alive: Arc<AtomicBool>,
}

impl<S: ByteSource, O: EsOut> TsDemuxer<S, O> {
    /// Opens a transport stream.
    ///
    /// Detects the packet size, sets up the PSI parsers, probes the PCR
    /// range when the source seeks fast, then demuxes until the first
    /// elementary stream is declared.
    pub async fn open(source: S, out: O, config: DemuxConfig) -> Result<Self> {
        Self::open_with_descrambler(source, out, config, None).await
    }

    /// Like [`open`](Self::open), descrambling with `descrambler` when CSA keys are configured.
    pub async fn open_with_descrambler(
        mut source: S,
        out: O,
        config: DemuxConfig,
        descrambler: Option<Box<dyn Descrambler>>,
    ) -> Result<Self> {
        let format = detect_packet_format(&mut source, config.force).await?;
        debug!(
            "packet size {} (header {})",
            format.packet_size, format.header_size
        );

        let csa = CsaHandle::configure(
            descrambler,
            config.csa_key.as_deref(),
            config.csa2_key.as_deref(),
            config.csa_packet_size,
        );

        let mut demux = Self {
            source,
            out,
            format,
            pids: PidTable::new(),
            programs: ProgramRegistry::new(),
            selection: Selection::default(),
            pat_version: None,
            sdt_version: None,
            pmt_es: 0,
            user_pmt: false,
            access_control: true,
            dvb_meta: true,
            arib: config.arib,
            broken_charset: false,
            dvb_time: DvbTime::default(),
            clock: ClockState::new(config.seek_percent),
            csa,
            start_record: false,
            alive: Arc::new(AtomicBool::new(true)),
            config,
        };

        demux
            .pids
            .get_mut(PID_PAT)
            .init(PidRole::Psi(Box::new(PsiContext::pat())), None);
        for pid in DVB_META_PIDS {
            demux
                .pids
                .get_mut(pid)
                .init(PidRole::Psi(Box::new(PsiContext::si())), None);
        }
        if [PID_SDT, PID_TDT, PID_EIT]
            .into_iter()
            .any(|pid| demux.set_pid_filter(pid, true).is_err())
        {
            demux.access_control = false;
        }

        if let Some(definition) = demux.config.extra_pmt.clone() {
            if let Err(e) = demux.apply_user_pmt(&definition) {
                warn!("ignoring extra PMT '{}': {}", definition, e);
            }
        }

        if demux.source.can_fast_seek() {
            demux.probe_first_pcr().await?;
            demux.probe_pcr_samples().await?;
            demux.probe_last_pcr().await?;
        }
        if demux.clock.first_pcr.is_none() || demux.clock.last_pcr.is_none() {
            debug!("Force Seek Per Percent: PCR's not found,");
            demux.clock.force_percent = true;
        }

        while demux.pmt_es == 0 && demux.is_alive() {
            if demux.demux().await? == DemuxStatus::Eof {
                break;
            }
        }
        Ok(demux)
    }

    /// Processes up to `packets_per_call` packets.
    ///
    /// Stops early once an access unit was delivered or the first
    /// elementary stream appeared.
    pub async fn demux(&mut self) -> Result<DemuxStatus> {
        let wait_es = self.pmt_es == 0;

        for _ in 0..self.config.packets_per_call {
            if !self.is_alive() {
                break;
            }
            let Some(packet) = read_packet(&mut self.source, self.format).await? else {
                return Ok(DemuxStatus::Eof);
            };

            if self.start_record {
                // recording starts on a synchronized packet
                if let Err(e) = self.source.set_record_state(true) {
                    debug!("cannot start recording: {}", e);
                }
                self.start_record = false;
            }

            let pid = pid_of(&packet);
            let mut frame = false;
            let tables = self.pids.get_mut(pid).psi_mut().map(|psi| psi.push(&packet));
            if let Some(tables) = tables {
                for table in &tables {
                    self.dispatch_table(table);
                }
            } else if self.pids.get(pid).is_valid() {
                frame = self.gather(packet);
            } else {
                if !self.pids.is_seen(pid) {
                    debug!("pid[{}] unknown", pid);
                }
                let pcr = AdaptationField::parse(&packet).ok().flatten().and_then(|af| af.pcr);
                self.handle_pcr(pid, pcr);
            }
            self.pids.mark_seen(pid);

            if frame || (wait_es && self.pmt_es > 0) {
                break;
            }
        }
        Ok(DemuxStatus::Continue)
    }

    fn dispatch_table(&mut self, table: &Table) {
        match table.table_id {
            TABLE_ID_PAT => self.handle_pat(table),
            TABLE_ID_PMT => self.handle_pmt(table),
            _ => self.handle_si(table),
        }
    }

    fn uses_event_clock(&self) -> bool {
        self.dvb_meta && self.access_control
    }

    /// Playback position in `0.0..=1.0`.
    pub fn position(&self) -> f64 {
        let clock = &self.clock;
        match (clock.elapsed(), clock.duration()) {
            (Some(elapsed), Some(duration))
                if !clock.force_percent && !self.uses_event_clock() =>
            {
                elapsed as f64 / duration as f64
            }
            _ => {
                if let Some((time, length)) = self.dvb_time.current_event() {
                    return time as f64 / length as f64;
                }
                match self.source.size() {
                    Some(size) if size > 0 => self.source.tell() as f64 / size as f64,
                    _ => 0.0,
                }
            }
        }
    }

    /// Moves to `position` (`0.0..=1.0`), by PCR when the range is known.
    ///
    /// A PCR search that does not converge switches to byte-percentage
    /// seeking and reports an error; the read position is left unchanged.
    pub async fn set_position(&mut self, position: f64) -> Result<()> {
        if self.clock.force_percent || self.uses_event_clock() || self.clock.duration().is_none() {
            let size = self.source.size().unwrap_or(0);
            return self.source.seek((size as f64 * position) as u64).await;
        }

        if !self.seek_pcr(position).await? {
            self.clock.force_percent = true;
            return Err(DemuxError::InvalidData("no PCR found near the seek target".into()));
        }
        Ok(())
    }

    /// Elapsed time in microseconds.
    pub fn time(&self) -> i64 {
        match self.clock.elapsed() {
            Some(elapsed) if !self.clock.force_percent && !self.uses_event_clock() => {
                ticks_to_us(elapsed)
            }
            _ => self.dvb_time.current_event().map_or(0, |(time, _)| time),
        }
    }

    /// Stream duration in microseconds, 0 when unknown.
    pub fn length(&self) -> i64 {
        match self.clock.duration() {
            Some(duration) if !self.clock.force_percent && !self.uses_event_clock() => {
                ticks_to_us(duration)
            }
            _ => self.dvb_time.current_event().map_or(0, |(_, length)| length),
        }
    }

    /// Changes which programs are demuxed and requested from the source.
    pub fn set_group(&mut self, group: GroupSelection) {
        debug!("set group {:?}", group);
        let (mut number, list) = match group {
            GroupSelection::Current => (0, None),
            GroupSelection::Program(number) => (number, None),
            GroupSelection::List(list) => (-1, Some(list)),
            GroupSelection::All => (-1, None),
        };

        let current = self.selection.current;
        if number == 0 && current > 0 {
            number = current;
        }
        if current > 0 {
            if current != number {
                self.set_prg_filter(current, false);
            }
        } else if current < 0 {
            for program in self.selection.list.clone() {
                self.set_prg_filter(program, false);
            }
        }

        if number > 0 {
            self.selection.current = number;
            self.set_prg_filter(number, true);
        } else if number < 0 {
            self.selection.current = -1;
            self.selection.list = list.unwrap_or_default();
            for program in self.selection.list.clone() {
                self.set_prg_filter(program, true);
            }
        }
    }

    /// Stops recording now, or starts it with the next packet.
    pub fn set_record_state(&mut self, recording: bool) -> Result<()> {
        self.start_record = recording;
        if !recording {
            self.source.set_record_state(false)?;
        }
        Ok(())
    }

    /// Recording is always supported; the source decides whether it works.
    pub fn can_record(&self) -> bool {
        true
    }

    /// Replaces the odd (`csa_key`) or even (`csa2_key`) control word.
    pub fn change_key(&self, odd: bool, key: &str) -> Result<()> {
        self.csa.change_key(odd, key)
    }

    /// Shared descrambler handle for key changes from another task.
    pub fn csa_handle(&self) -> CsaHandle {
        self.csa.clone()
    }

    /// Clearing this flag stops demuxing and PCR probing at the next packet.
    pub fn alive_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Underlying byte source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Elementary stream sink.
    pub fn out(&self) -> &O {
        &self.out
    }

    /// Mutable elementary stream sink.
    pub fn out_mut(&mut self) -> &mut O {
        &mut self.out
    }

    /// Options the demuxer was opened with.
    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Detected packet geometry.
    pub fn packet_format(&self) -> PacketFormat {
        self.format
    }

    /// Signal quality, answered by the source.
    pub fn signal(&self) -> Option<SignalInfo> {
        self.source.signal()
    }

    /// Title and seekpoint, answered by the source.
    pub fn title_info(&self) -> Option<TitleInfo> {
        self.source.title_info()
    }

    /// Programs currently known, in PMT order.
    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    /// Whether `pid` currently carries PSI or an elementary stream.
    pub fn is_pid_valid(&self, pid: u16) -> bool {
        self.pids.get(pid).is_valid()
    }

    /// PIDs that carried at least one packet.
    pub fn seen_pids(&self) -> Vec<u16> {
        self.pids.seen_pids()
    }

    /// Number of outputs declared to the sink.
    pub fn es_count(&self) -> usize {
        self.pmt_es
    }

    /// Releases every PID and filter, giving back the source and sink.
    pub fn close(mut self) -> (S, O) {
        debug!("pid list:");
        for pid in 0..PID_COUNT as u16 {
            if self.pids.get(pid).is_valid() {
                self.clean_pid(pid);
            }
            if self.pids.is_seen(pid) {
                debug!("  - pid[{}] seen", pid);
            }
            if pid > 0 {
                self.set_pid_filter(pid, false).ok();
            }
        }
        self.programs.clear();
        (self.source, self.out)
    }

    /// Requests or cancels delivery of one PID from the source.
    pub(crate) fn set_pid_filter(&mut self, pid: u16, selected: bool) -> Result<()> {
        if !self.access_control {
            return Err(DemuxError::Unsupported("pid filtering disabled".into()));
        }
        self.source.set_pid_filter(pid, selected)
    }

    /// Toggles the filters of a program's PMT, PCR and elementary streams.
    pub(crate) fn set_prg_filter(&mut self, number: i32, selected: bool) {
        let Some(program) = self.programs.find(number) else {
            return;
        };
        let pmt_pid = program.pmt_pid;
        let pcr_pid = program.pcr_pid;

        self.set_pid_filter(pmt_pid, selected).ok();
        if let Some(pcr_pid) = pcr_pid.filter(|&pid| pid > 0) {
            self.set_pid_filter(pcr_pid, selected).ok();
        }

        // streams from a user PMT keep their filters
        let streams: Vec<u16> = self
            .pids
            .iter()
            .filter(|p| {
                p.pid >= 2
                    && p.owner == Some(pmt_pid)
                    && p.stream().is_some_and(|es| es.primary.id.is_some())
            })
            .map(|p| p.pid)
            .collect();
        for pid in streams {
            self.set_pid_filter(pid, selected).ok();
        }
    }

    /// Invalidates a PID, removing the outputs it declared.
    pub(crate) fn clean_pid(&mut self, pid: u16) {
        if let PidRole::Stream(es) = self.pids.get_mut(pid).take_role() {
            for id in es.output_ids() {
                self.out.remove(id);
                self.pmt_es = self.pmt_es.saturating_sub(1);
            }
        }
    }

    /// Leaves DVB mode when a table reuses one of the SDT/EIT/TDT PIDs.
    pub(crate) fn validate_dvb_meta(&mut self, pid: u16) {
        if !self.dvb_meta || !DVB_META_PIDS.contains(&pid) {
            return;
        }
        warn!("Switching to non DVB mode");

        for meta in DVB_META_PIDS {
            let slot = self.pids.get_mut(meta);
            if slot.is_psi() {
                slot.take_role();
            }
            self.set_pid_filter(meta, false).ok();
        }
        self.dvb_meta = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{Block, EsFormat, EsId};
    use crate::format::ts::section::tests::{long_section, packetize};
    use crate::format::StreamSource;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::io::Cursor;

    #[derive(Default)]
    struct Sink {
        added: Vec<EsFormat>,
        removed: Vec<EsId>,
        sent: usize,
    }

    impl EsOut for Sink {
        fn add(&mut self, format: &EsFormat) -> Option<EsId> {
            self.added.push(format.clone());
            Some(EsId(self.added.len() as u64))
        }

        fn remove(&mut self, id: EsId) {
            self.removed.push(id);
        }

        fn send(&mut self, _id: EsId, _block: Block) {
            self.sent += 1;
        }

        fn set_group_pcr(&mut self, _group: i32, _pcr: i64) {}
    }

    /// Filtering source recording the selected PIDs.
    struct Filtered {
        inner: StreamSource<Cursor<Vec<u8>>>,
        selected: HashSet<u16>,
    }

    #[async_trait::async_trait]
    impl ByteSource for Filtered {
        async fn peek(&mut self, len: usize) -> Result<bytes::Bytes> {
            self.inner.peek(len).await
        }

        async fn read(&mut self, len: usize) -> Result<bytes::BytesMut> {
            self.inner.read(len).await
        }

        async fn seek(&mut self, pos: u64) -> Result<()> {
            self.inner.seek(pos).await
        }

        fn tell(&self) -> u64 {
            self.inner.tell()
        }

        fn size(&self) -> Option<u64> {
            self.inner.size()
        }

        fn signal(&self) -> Option<SignalInfo> {
            Some(SignalInfo {
                quality: 0.5,
                strength: 0.75,
            })
        }

        fn set_pid_filter(&mut self, pid: u16, selected: bool) -> Result<()> {
            if selected {
                self.selected.insert(pid);
            } else {
                self.selected.remove(&pid);
            }
            Ok(())
        }
    }

    fn psi_stream() -> Vec<u8> {
        let pat = long_section(
            TABLE_ID_PAT,
            1,
            0,
            0,
            0,
            &[0x00, 0x01, 0xE1, 0x00, 0x00, 0x02, 0xE2, 0x00],
        );
        let pmt1 = long_section(
            TABLE_ID_PMT,
            1,
            0,
            0,
            0,
            &[0xE1, 0x01, 0xF0, 0x00, 0x1B, 0xE1, 0x01, 0xF0, 0x00],
        );
        let pmt2 = long_section(
            TABLE_ID_PMT,
            2,
            0,
            0,
            0,
            &[0xE2, 0x01, 0xF0, 0x00, 0x03, 0xE2, 0x01, 0xF0, 0x00],
        );
        let mut data = Vec::new();
        for packet in packetize(PID_PAT, 0, &pat)
            .into_iter()
            .chain(packetize(0x100, 0, &pmt1))
            .chain(packetize(0x200, 0, &pmt2))
        {
            data.extend_from_slice(&packet);
        }
        // padding so the stream is long enough for sync detection
        for _ in 0..4 {
            let mut null = vec![0xFF; TS_PACKET_SIZE];
            null[..4].copy_from_slice(&[0x47, 0x1F, 0xFF, 0x10]);
            data.extend_from_slice(&null);
        }
        data
    }

    async fn open_filtered() -> TsDemuxer<Filtered, Sink> {
        let inner = StreamSource::open(Cursor::new(psi_stream()))
            .await
            .unwrap()
            .with_fast_seek(false);
        let source = Filtered {
            inner,
            selected: HashSet::new(),
        };
        let mut demux = TsDemuxer::open(source, Sink::default(), DemuxConfig::default())
            .await
            .unwrap();
        while demux.demux().await.unwrap() == DemuxStatus::Continue {}
        demux
    }

    #[tokio::test]
    async fn test_open_declares_programs() {
        let demux = open_filtered().await;
        assert!(demux.access_control);
        assert!(demux.dvb_meta);
        assert_eq!(demux.es_count(), 2);
        assert_eq!(demux.selection.current, 1);
        assert_eq!(
            demux.programs().map(|p| p.number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(demux.clock.force_percent);
        assert_eq!(demux.signal().map(|s| s.strength), Some(0.75));
        assert_eq!(demux.title_info(), None);
        for pid in [PID_SDT, PID_EIT, PID_TDT, 0x100, 0x101] {
            assert!(demux.source.selected.contains(&pid), "pid {:#x}", pid);
        }
        // only the first program is selected
        assert!(!demux.source.selected.contains(&0x200));
        assert!(!demux.source.selected.contains(&0x201));
    }

    #[tokio::test]
    async fn test_set_group_filters() {
        let mut demux = open_filtered().await;

        demux.set_group(GroupSelection::Program(2));
        assert_eq!(demux.selection.current, 2);
        assert!(!demux.source.selected.contains(&0x100));
        assert!(!demux.source.selected.contains(&0x101));
        assert!(demux.source.selected.contains(&0x201));

        demux.set_group(GroupSelection::List(vec![1]));
        assert_eq!(demux.selection, Selection { current: -1, list: vec![1] });
        assert!(demux.source.selected.contains(&0x101));
        assert!(!demux.source.selected.contains(&0x201));

        demux.set_group(GroupSelection::Program(2));
        assert_eq!(demux.selection.current, 2);
        assert!(!demux.source.selected.contains(&0x101));
        demux.set_group(GroupSelection::Current);
        assert_eq!(demux.selection.current, 2);
        assert!(demux.source.selected.contains(&0x201));
    }

    #[tokio::test]
    async fn test_dvb_meta_switch_and_close() {
        let mut demux = open_filtered().await;
        demux.validate_dvb_meta(PID_EIT);
        assert!(!demux.dvb_meta);
        assert!(!demux.is_pid_valid(PID_SDT));
        assert!(!demux.source.selected.contains(&PID_TDT));

        let (source, sink) = demux.close();
        assert!(source.selected.is_empty());
        assert_eq!(sink.removed.len(), 2);
    }

    #[tokio::test]
    async fn test_record_state() {
        let mut demux = open_filtered().await;
        assert!(demux.can_record());
        assert!(demux.set_record_state(true).is_ok());
        assert!(demux.start_record);
        assert!(demux.set_record_state(false).is_err());
        assert!(!demux.start_record);
    }
}
