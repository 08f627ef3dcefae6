//! # MPEG Transport Stream demuxing
//!
//! [`TsDemuxer`] synchronizes on 188/192/204-byte packets, follows the
//! PAT and PMTs to discover programs, reassembles PES packets and table
//! sections per PID, and delivers access units to an [`EsOut`](crate::av::EsOut).
//!
//! Alongside the core tables it understands:
//!
//! - DVB SDT, EIT and TDT/TOT, published as program metadata and EPG
//! - PCR tracking with wrap-around handling, for time queries and PCR seeking
//! - CSA descrambling through a pluggable [`Descrambler`]
//! - user supplied PMTs for streams that lack one
//!
//! ## Example
//!
//! ```rust,no_run
//! use tsdemux::av::{Block, EsFormat, EsId, EsOut};
//! use tsdemux::config::DemuxConfig;
//! use tsdemux::format::ts::{DemuxStatus, GroupSelection, TsDemuxer};
//! use tsdemux::format::StreamSource;
//!
//! struct Printer(u64);
//!
//! impl EsOut for Printer {
//!     fn add(&mut self, format: &EsFormat) -> Option<EsId> {
//!         self.0 += 1;
//!         println!("es {}: {}", self.0, format.codec);
//!         Some(EsId(self.0))
//!     }
//!     fn remove(&mut self, _id: EsId) {}
//!     fn send(&mut self, id: EsId, block: Block) {
//!         println!("es {}: {} bytes pts={:?}", id.0, block.data.len(), block.pts);
//!     }
//!     fn set_group_pcr(&mut self, _group: i32, _pcr: i64) {}
//! }
//!
//! # async fn run() -> tsdemux::Result<()> {
//! let file = tokio::fs::File::open("capture.ts").await?;
//! let source = StreamSource::open(file).await?;
//! let mut demux = TsDemuxer::open(source, Printer(0), DemuxConfig::default()).await?;
//! demux.set_group(GroupSelection::All);
//! while demux.demux().await? == DemuxStatus::Continue {}
//! println!("duration {} us", demux.length());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod csa;
/// The demuxer entry point and its control surface.
pub mod demuxer;
pub mod descriptor;
pub mod gather;
pub mod opus;
/// Transport packet header and adaptation field decoding.
pub mod parser;
pub mod pes;
pub mod pid;
pub mod program;
pub mod psi;
pub mod section;
pub mod sync;
/// Transport stream constants.
pub mod types;

pub use csa::{CsaHandle, Descrambler};
pub use demuxer::{DemuxStatus, TsDemuxer};
pub use program::{GroupSelection, Program};
pub use sync::PacketFormat;
pub use types::{PID_NULL, PID_PAT, TS_PACKET_SIZE};
