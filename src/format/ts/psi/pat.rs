//! Program Association Table.

use super::PsiContext;
use crate::av::EsOut;
use crate::format::ts::pid::PidRole;
use crate::format::ts::program::Program;
use crate::format::ts::section::Table;
use crate::format::ts::TsDemuxer;
use crate::format::ByteSource;
use log::{debug, warn};

/// One `program_number -> PMT PID` association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    /// Program number, 0 for the network PID
    pub number: u16,
    /// PMT (or NIT) PID
    pub pid: u16,
}

/// Decoded PAT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    /// transport_stream_id
    pub ts_id: u16,
    /// Version number
    pub version: u8,
    /// current_next_indicator
    pub current_next: bool,
    /// Associations in table order
    pub programs: Vec<PatEntry>,
}

impl Pat {
    /// Decodes every section of the table.
    pub fn parse(table: &Table) -> Self {
        let programs = table
            .payloads()
            .flat_map(|payload| payload.chunks_exact(4))
            .map(|c| PatEntry {
                number: u16::from_be_bytes([c[0], c[1]]),
                pid: u16::from_be_bytes([c[2] & 0x1F, c[3]]),
            })
            .collect();
        Self {
            ts_id: table.extension,
            version: table.version,
            current_next: table.current_next,
            programs,
        }
    }

    fn declares(&self, pmt_pid: u16, number: i32) -> bool {
        self.programs
            .iter()
            .any(|p| p.pid == pmt_pid && p.number as i32 == number)
    }
}

impl<S: ByteSource, O: EsOut> TsDemuxer<S, O> {
    pub(crate) fn handle_pat(&mut self, table: &Table) {
        let pat = Pat::parse(table);
        debug!("PAT received");

        if (self.pat_version.is_some() && (!pat.current_next || self.pat_version == Some(pat.version)))
            || self.user_pmt
        {
            return;
        }
        debug!(
            "new PAT ts_id={} version={} current_next={}",
            pat.ts_id, pat.version, pat.current_next
        );

        let removed: Vec<u16> = self
            .programs
            .pmt_pids()
            .iter()
            .copied()
            .filter(|&pmt_pid| {
                !self
                    .programs
                    .on_pmt(pmt_pid)
                    .any(|prg| pat.declares(pmt_pid, prg.number))
            })
            .collect();

        for &pmt_pid in &removed {
            for pid in self.pids.streams_owned_by(pmt_pid) {
                if self.pids.get(pid).stream().is_some_and(|es| es.primary.id.is_some()) {
                    self.set_pid_filter(pid, false).ok();
                }
                self.clean_pid(pid);
            }
        }
        for &pmt_pid in &removed {
            self.set_pid_filter(pmt_pid, false).ok();
            for program in self.programs.remove_pmt(pmt_pid) {
                debug!("program {} removed", program.number);
                self.out.del_group(program.number);
            }
            self.clean_pid(pmt_pid);
        }

        for entry in &pat.programs {
            debug!("  * number={} pid={}", entry.number, entry.pid);
            if entry.number == 0 {
                continue;
            }
            let number = entry.number as i32;

            self.validate_dvb_meta(entry.pid);

            let slot = self.pids.get(entry.pid);
            if slot.is_psi() {
                if self.programs.contains(entry.pid, number) {
                    continue;
                }
            } else {
                if slot.is_valid() {
                    warn!("pid {} redeclared as PMT", entry.pid);
                    self.clean_pid(entry.pid);
                }
                self.pids
                    .get_mut(entry.pid)
                    .init(PidRole::Psi(Box::new(PsiContext::pmt())), Some(0));
                self.programs.add_pmt_pid(entry.pid);
            }
            self.programs.add(Program::new(number, entry.pid));

            if self.selection.is_selected(number) {
                if self.selection.current == 0 {
                    self.selection.current = number;
                }
                if self.set_pid_filter(entry.pid, true).is_err() {
                    self.access_control = false;
                }
            }
        }
        self.pat_version = Some(pat.version);
    }
}
