//! Program registry and the program selection policy.

use super::psi::iod::Iod;

/// One program declared by the PAT (or by a user PMT).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Program number, 0 for a user PMT without a number
    pub number: i32,
    /// PID carrying the program's PMT
    pub pmt_pid: u16,
    /// PCR PID declared by the PMT, `None` before the first PMT
    pub pcr_pid: Option<u16>,
    /// Last accepted PMT version
    pub version: Option<u8>,
    /// Last PCR seen on the program's PCR PID, 90 kHz ticks
    pub pcr_value: Option<i64>,
    /// MPEG-4 initial object descriptor from the PMT
    pub iod: Option<Iod>,
}

impl Program {
    /// Program announced but without a PMT yet.
    pub fn new(number: i32, pmt_pid: u16) -> Self {
        Self {
            number,
            pmt_pid,
            ..Default::default()
        }
    }
}

/// Programs grouped under the PMT PIDs that carry them, in declaration order.
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    pmt_pids: Vec<u16>,
    programs: Vec<Program>,
}

impl ProgramRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// PMT PIDs in declaration order.
    pub fn pmt_pids(&self) -> &[u16] {
        &self.pmt_pids
    }

    /// Registers a PMT PID once.
    pub fn add_pmt_pid(&mut self, pid: u16) {
        if !self.pmt_pids.contains(&pid) {
            self.pmt_pids.push(pid);
        }
    }

    /// Adds a program, registering its PMT PID.
    pub fn add(&mut self, program: Program) {
        self.add_pmt_pid(program.pmt_pid);
        self.programs.push(program);
    }

    /// All programs.
    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    /// All programs, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Program> {
        self.programs.iter_mut()
    }

    /// No program is known.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Programs carried on one PMT PID.
    pub fn on_pmt(&self, pmt_pid: u16) -> impl Iterator<Item = &Program> {
        self.programs.iter().filter(move |p| p.pmt_pid == pmt_pid)
    }

    /// `number` is carried on `pmt_pid`.
    pub fn contains(&self, pmt_pid: u16, number: i32) -> bool {
        self.on_pmt(pmt_pid).any(|p| p.number == number)
    }

    /// First program with this number, in PMT order.
    pub fn find(&self, number: i32) -> Option<&Program> {
        self.pmt_pids
            .iter()
            .find_map(|&pid| self.on_pmt(pid).find(|p| p.number == number))
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(&mut self, number: i32) -> Option<&mut Program> {
        let pmt_pid = self.find(number)?.pmt_pid;
        self.programs
            .iter_mut()
            .find(|p| p.pmt_pid == pmt_pid && p.number == number)
    }

    /// Drops a PMT PID with every program it carried.
    pub fn remove_pmt(&mut self, pmt_pid: u16) -> Vec<Program> {
        self.pmt_pids.retain(|&pid| pid != pmt_pid);
        let (removed, kept) = std::mem::take(&mut self.programs)
            .into_iter()
            .partition(|p| p.pmt_pid == pmt_pid);
        self.programs = kept;
        removed
    }

    /// Forgets every program.
    pub fn clear(&mut self) {
        self.pmt_pids.clear();
        self.programs.clear();
    }
}

/// Which programs the consumer wants.
///
/// `current == 0` selects everything, `-1` selects the explicit list,
/// any positive value a single program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    /// Single program, 0 for all, -1 for the list
    pub current: i32,
    /// Selected programs when `current == -1`
    pub list: Vec<i32>,
}

impl Selection {
    /// The program is wanted by the consumer.
    pub fn is_selected(&self, number: i32) -> bool {
        (self.current == -1 && self.list.is_empty())
            || self.current == 0
            || self.current == number
            || self.list.contains(&number)
    }
}

/// Argument of [`TsDemuxer::set_group`](super::TsDemuxer::set_group).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelection {
    /// Keep the current program (or everything when none is current)
    Current,
    /// One program by number
    Program(i32),
    /// An explicit list of programs
    List(Vec<i32>),
    /// Every program
    All,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry() {
        let mut registry = ProgramRegistry::new();
        registry.add(Program::new(1, 0x100));
        registry.add(Program::new(2, 0x100));
        registry.add(Program::new(3, 0x200));
        assert_eq!(registry.pmt_pids(), &[0x100, 0x200]);
        assert!(registry.contains(0x100, 2));
        assert!(!registry.contains(0x200, 2));

        registry.find_mut(3).unwrap().pcr_pid = Some(0x201);
        assert_eq!(registry.find(3).unwrap().pcr_pid, Some(0x201));

        let removed = registry.remove_pmt(0x100);
        assert_eq!(removed.iter().map(|p| p.number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(registry.pmt_pids(), &[0x200]);
        assert!(registry.find(1).is_none());
    }

    #[test]
    fn test_selection() {
        let all = Selection::default();
        assert!(all.is_selected(7));

        let single = Selection { current: 2, list: vec![] };
        assert!(single.is_selected(2));
        assert!(!single.is_selected(3));

        let list = Selection { current: -1, list: vec![3, 4] };
        assert!(list.is_selected(4));
        assert!(!list.is_selected(2));
        assert!(Selection { current: -1, list: vec![] }.is_selected(9));
    }
}
