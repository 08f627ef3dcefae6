//! Program Specific Information: PAT, PMT and the DVB service tables.
//!
//! Each PSI PID owns a [`PsiContext`] that turns transport packets into
//! complete tables. The table handlers themselves run on the demuxer, which
//! owns the PID arena and the program registry they update.

pub mod es_setup;
pub mod iod;
pub mod pat;
pub mod pmt;
pub mod si;
pub mod text;

use super::section::{CollectMode, Section, SectionAssembler, Table, TableCollector};
use super::types::*;
use log::{trace, warn};

/// Which tables a PSI PID carries.
#[derive(Debug)]
pub enum PsiKind {
    /// PID 0
    Pat(TableCollector),
    /// A PMT PID
    Pmt(TableCollector),
    /// DVB SDT/EIT/TDT PIDs
    Si {
        /// SDT (and TDT/TOT) tables
        sdt: TableCollector,
        /// EIT sections, reported one by one
        eit: TableCollector,
    },
}

/// Section reassembly state of one PSI PID.
#[derive(Debug)]
pub struct PsiContext {
    assembler: SectionAssembler,
    kind: PsiKind,
}

impl PsiContext {
    /// Context for the PAT PID.
    pub fn pat() -> Self {
        Self::with_kind(PsiKind::Pat(TableCollector::new(CollectMode::WholeTable)))
    }

    /// Context for a PMT PID.
    pub fn pmt() -> Self {
        Self::with_kind(PsiKind::Pmt(TableCollector::new(CollectMode::WholeTable)))
    }

    /// Context for the DVB SDT/EIT/TDT PIDs.
    pub fn si() -> Self {
        Self::with_kind(PsiKind::Si {
            sdt: TableCollector::new(CollectMode::WholeTable),
            eit: TableCollector::new(CollectMode::PerSection),
        })
    }

    fn with_kind(kind: PsiKind) -> Self {
        Self {
            assembler: SectionAssembler::new(),
            kind,
        }
    }

    /// Tables this PID carries.
    pub fn kind(&self) -> &PsiKind {
        &self.kind
    }

    /// Feeds one packet and returns the tables it completed.
    ///
    /// Only tables the PID is expected to carry are reported; other table
    /// ids are dropped here.
    pub fn push(&mut self, packet: &[u8]) -> Vec<Table> {
        let mut tables = Vec::new();
        for raw in self.assembler.push(packet) {
            let section = match Section::parse(raw) {
                Ok(section) => section,
                Err(e) => {
                    warn!("dropping section: {}", e);
                    continue;
                }
            };

            let table = match &mut self.kind {
                PsiKind::Pat(collector) if section.table_id == TABLE_ID_PAT => collector.push(section),
                PsiKind::Pmt(collector) if section.table_id == TABLE_ID_PMT => collector.push(section),
                PsiKind::Si { sdt, .. } if section.table_id == TABLE_ID_SDT => sdt.push(section),
                PsiKind::Si { eit, .. } if is_eit(section.table_id) => eit.push(section),
                PsiKind::Si { .. } if matches!(section.table_id, TABLE_ID_TDT | TABLE_ID_TOT) => {
                    Some(Table::from(section))
                }
                _ => {
                    trace!("ignoring table_id 0x{:02x}", section.table_id);
                    None
                }
            };
            tables.extend(table);
        }
        tables
    }
}

/// Present/following or schedule EIT.
pub fn is_eit(table_id: u8) -> bool {
    table_id == TABLE_ID_EIT_PF
        || (TABLE_ID_EIT_SCHEDULE_FIRST..=TABLE_ID_EIT_SCHEDULE_LAST).contains(&table_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::section::tests::{long_section, packetize};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_routing_by_kind() {
        let pat = long_section(TABLE_ID_PAT, 1, 0, 0, 0, &[0x00, 0x01, 0xE1, 0x00]);
        let sdt = long_section(TABLE_ID_SDT, 1, 0, 0, 0, &[0x00, 0x01, 0xFF]);

        let mut ctx = PsiContext::pat();
        assert_eq!(ctx.push(&packetize(0, 0, &sdt)[0]).len(), 0);
        assert_eq!(ctx.push(&packetize(0, 1, &pat)[0]).len(), 1);

        let mut ctx = PsiContext::si();
        let tables = ctx.push(&packetize(0x11, 0, &sdt)[0]);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_id, TABLE_ID_SDT);
        assert!(ctx.push(&packetize(0x11, 1, &pat)[0]).is_empty());
    }

    #[test]
    fn test_eit_ids() {
        assert!(is_eit(0x4E));
        assert!(is_eit(0x5F));
        assert!(!is_eit(0x4F));
        assert!(!is_eit(0x60));
    }
}
