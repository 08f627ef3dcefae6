use super::block::Block;
use super::format::EsFormat;

/// Opaque handle returned by [`EsOut::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EsId(pub u64);

/// Program-level metadata published from the SDT.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    /// Service name
    pub title: Option<String>,
    /// Service provider name
    pub publisher: Option<String>,
    /// Additional named values ("Type", "Status")
    pub extra: Vec<(String, String)>,
}

impl Metadata {
    /// Looks up an extra value by name.
    pub fn extra(&self, name: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// One event of an electronic program guide.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpgEvent {
    /// Start as seconds since the Unix epoch
    pub start: i64,
    /// Duration in seconds
    pub duration: i64,
    /// Event name
    pub name: String,
    /// Short event text
    pub short_description: String,
    /// Extended event text, when present
    pub description: Option<String>,
    /// Minimum viewer age, 0 when unrated
    pub min_age: u8,
}

/// Event guide for one program, rebuilt on each EIT.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Epg {
    /// Service name
    pub name: String,
    /// Events in table order
    pub events: Vec<EpgEvent>,
    /// Start time of the running event, when one is flagged
    pub current: Option<i64>,
}

impl Epg {
    /// Empty guide for the named service.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends an event.
    pub fn add_event(&mut self, event: EpgEvent) {
        self.events.push(event);
    }

    /// Marks the running event by its start time.
    pub fn set_current(&mut self, start: i64) {
        self.current = Some(start);
    }
}

/// Consumer of demultiplexed elementary streams.
///
/// All calls happen synchronously on the thread driving the demuxer.
pub trait EsOut {
    /// Declares a new stream; `None` when the sink refuses it.
    fn add(&mut self, format: &EsFormat) -> Option<EsId>;

    /// Destroys a stream previously added.
    fn remove(&mut self, id: EsId);

    /// Delivers one access unit.
    fn send(&mut self, id: EsId, block: Block);

    /// Program clock update for a program group, in microseconds.
    fn set_group_pcr(&mut self, group: i32, pcr: i64);

    /// The scrambling state of a stream changed.
    fn set_scrambled(&mut self, _id: EsId, _scrambled: bool) {}

    /// Service metadata from the SDT.
    fn set_group_meta(&mut self, _group: i32, _meta: &Metadata) {}

    /// Guide update from the EIT.
    fn set_group_epg(&mut self, _group: i32, _epg: &Epg) {}

    /// The program disappeared from the multiplex.
    fn del_group(&mut self, _group: i32) {}
}
