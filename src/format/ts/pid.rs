//! Per-PID state: the 8192-slot arena owned by the demuxer.

use super::psi::PsiContext;
use super::types::*;
use crate::av::{EsFormat, EsId};
use crate::format::ts::psi::iod::EsDescriptor;
use bitvec::prelude::*;
use bytes::BytesMut;

/// Continuity counter value meaning "no packet seen yet".
pub const CC_UNSET: u8 = 0xFF;

/// Framing of the payload carried by an elementary stream PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    /// PES packets
    #[default]
    Pes,
    /// Private table sections (SCTE-27)
    TableSection,
}

/// Reassembly progress of one PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatherState {
    /// Waiting for a unit start
    #[default]
    Idle,
    /// `expected == 0` means unbounded, completed by the next unit start
    Accumulating {
        /// Unit size announced by its header
        expected: usize,
        /// Bytes gathered so far
        gathered: usize,
    },
}

/// One logical stream exposed to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct EsOutput {
    /// Format declared to the sink
    pub format: EsFormat,
    /// Sink id, `None` until added (or refused)
    pub id: Option<EsId>,
}

impl EsOutput {
    /// Output not yet declared to the sink.
    pub fn new(format: EsFormat) -> Self {
        Self { format, id: None }
    }
}

/// Elementary stream carried by a PID, with its co-located sub-streams.
#[derive(Debug)]
pub struct ElementaryStream {
    /// Main output of the PID
    pub primary: EsOutput,
    /// Extra teletext/subtitle pages sharing the PID
    pub extra: Vec<EsOutput>,
    /// Payload framing
    pub data_type: DataType,
    /// Reassembly progress
    pub state: GatherState,
    /// Bytes gathered for the unit in progress
    pub buffer: BytesMut,
    /// Unit in progress lost data
    pub corrupted: bool,
    /// MPEG-4 ES descriptor bound through the program IOD
    pub mpeg4desc: Option<EsDescriptor>,
}

impl ElementaryStream {
    /// Idle PES stream with a single output.
    pub fn new(format: EsFormat) -> Self {
        Self {
            primary: EsOutput::new(format),
            extra: Vec::new(),
            data_type: DataType::Pes,
            state: GatherState::Idle,
            buffer: BytesMut::new(),
            corrupted: false,
            mpeg4desc: None,
        }
    }

    /// Starts a new unit with `payload` as its first bytes.
    pub fn begin(&mut self, payload: &[u8], expected: usize) {
        self.buffer.clear();
        self.buffer.extend_from_slice(payload);
        self.corrupted = false;
        self.state = GatherState::Accumulating {
            expected,
            gathered: payload.len(),
        };
    }

    /// Appends to the open unit; false when nothing is being gathered.
    pub fn append(&mut self, payload: &[u8]) -> bool {
        match &mut self.state {
            GatherState::Idle => false,
            GatherState::Accumulating { gathered, .. } => {
                self.buffer.extend_from_slice(payload);
                *gathered += payload.len();
                true
            }
        }
    }

    /// Whether the open unit reached its declared size.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, GatherState::Accumulating { expected, gathered }
            if expected > 0 && gathered >= expected)
    }

    /// Closes the open unit, returning its bytes and corruption flag.
    pub fn take(&mut self) -> Option<(BytesMut, bool)> {
        match std::mem::take(&mut self.state) {
            GatherState::Idle => None,
            GatherState::Accumulating { .. } => {
                let corrupted = std::mem::take(&mut self.corrupted);
                Some((self.buffer.split(), corrupted))
            }
        }
    }

    /// A unit is being accumulated.
    pub fn is_gathering(&self) -> bool {
        matches!(self.state, GatherState::Accumulating { .. })
    }

    /// Ids of every output (primary first) that the sink accepted.
    pub fn output_ids(&self) -> impl Iterator<Item = EsId> + '_ {
        std::iter::once(&self.primary)
            .chain(self.extra.iter())
            .filter_map(|o| o.id)
    }
}

/// What a valid PID is used for.
#[derive(Debug, Default)]
pub enum PidRole {
    /// Not declared by any table
    #[default]
    Unused,
    /// Carries PSI tables
    Psi(Box<PsiContext>),
    /// Carries an elementary stream
    Stream(Box<ElementaryStream>),
}

/// One of the 8192 PID slots.
#[derive(Debug)]
pub struct Pid {
    /// PID value
    pub pid: u16,
    /// Last continuity counter, [`CC_UNSET`] before the first packet
    pub cc: u8,
    /// Scrambling state last reported to the sink
    pub scrambled: bool,
    /// PSI PID that declared this one (PID 0 for PMTs, the PMT PID for streams)
    pub owner: Option<u16>,
    /// Program number of the declaring PMT
    pub owner_number: i32,
    /// Current use of the PID
    pub role: PidRole,
}

impl Pid {
    fn new(pid: u16) -> Self {
        Self {
            pid,
            cc: CC_UNSET,
            scrambled: false,
            owner: None,
            owner_number: 0,
            role: PidRole::Unused,
        }
    }

    /// The PID has a role.
    pub fn is_valid(&self) -> bool {
        !matches!(self.role, PidRole::Unused)
    }

    /// The PID carries PSI.
    pub fn is_psi(&self) -> bool {
        matches!(self.role, PidRole::Psi(_))
    }

    /// Elementary stream state, when the PID carries one.
    pub fn stream(&self) -> Option<&ElementaryStream> {
        match &self.role {
            PidRole::Stream(es) => Some(es),
            _ => None,
        }
    }

    /// Mutable elementary stream state.
    pub fn stream_mut(&mut self) -> Option<&mut ElementaryStream> {
        match &mut self.role {
            PidRole::Stream(es) => Some(es),
            _ => None,
        }
    }

    /// PSI context, when the PID carries tables.
    pub fn psi(&self) -> Option<&PsiContext> {
        match &self.role {
            PidRole::Psi(psi) => Some(psi),
            _ => None,
        }
    }

    /// Mutable PSI context.
    pub fn psi_mut(&mut self) -> Option<&mut PsiContext> {
        match &mut self.role {
            PidRole::Psi(psi) => Some(psi),
            _ => None,
        }
    }

    /// Resets the transport state and installs a new role.
    pub fn init(&mut self, role: PidRole, owner: Option<u16>) {
        self.cc = CC_UNSET;
        self.scrambled = false;
        self.owner = owner;
        self.owner_number = 0;
        self.role = role;
    }

    /// Detaches the role, leaving the slot invalid.
    pub fn take_role(&mut self) -> PidRole {
        std::mem::take(&mut self.role)
    }
}

/// Arena of all PIDs plus the diagnostic "seen" set.
pub struct PidTable {
    pids: Vec<Pid>,
    seen: BitVec,
}

impl PidTable {
    /// All slots unused; only the padding PID counts as seen.
    pub fn new() -> Self {
        let mut seen = bitvec![0; PID_COUNT];
        seen.set(PID_NULL as usize, true);
        Self {
            pids: (0..PID_COUNT as u16).map(Pid::new).collect(),
            seen,
        }
    }

    /// Slot of `pid`, masked to 13 bits.
    pub fn get(&self, pid: u16) -> &Pid {
        &self.pids[pid as usize & 0x1FFF]
    }

    /// Mutable slot of `pid`, masked to 13 bits.
    pub fn get_mut(&mut self, pid: u16) -> &mut Pid {
        &mut self.pids[pid as usize & 0x1FFF]
    }

    /// A packet was seen on `pid`.
    pub fn is_seen(&self, pid: u16) -> bool {
        self.seen[pid as usize & 0x1FFF]
    }

    /// Records a packet on `pid`.
    pub fn mark_seen(&mut self, pid: u16) {
        self.seen.set(pid as usize & 0x1FFF, true);
    }

    /// PIDs that carried at least one packet, excluding padding.
    pub fn seen_pids(&self) -> Vec<u16> {
        self.seen
            .iter_ones()
            .map(|i| i as u16)
            .filter(|&pid| pid != PID_NULL)
            .collect()
    }

    /// Every slot, in PID order.
    pub fn iter(&self) -> impl Iterator<Item = &Pid> {
        self.pids.iter()
    }

    /// Valid stream PIDs declared by the given PSI PID.
    pub fn streams_owned_by(&self, owner: u16) -> Vec<u16> {
        self.pids
            .iter()
            .filter(|p| p.owner == Some(owner) && matches!(p.role, PidRole::Stream(_)))
            .map(|p| p.pid)
            .collect()
    }
}

impl Default for PidTable {
    fn default() -> Self {
        Self::new()
    }
}
