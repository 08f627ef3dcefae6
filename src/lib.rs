#![doc(html_root_url = "https://docs.rs/tsdemux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsdemux - MPEG Transport Stream demultiplexer
//!
//! `tsdemux` turns an MPEG-TS byte stream (broadcast captures, DVB/ATSC/ISDB
//! recordings, Blu-ray M2TS) into elementary streams: it follows the program
//! tables, reassembles PES packets, converts timestamps and tracks the
//! program clock.
//!
//! ## Features
//!
//! - 188, 192 (M2TS) and 204-byte packets, with resynchronization
//! - PAT/PMT tracking with version handling and stream reuse across updates
//! - Codec mapping for MPEG, H.264/H.265, AAC, AC-3/E-AC-3, DTS, LPCM, Opus,
//!   teletext, DVB subtitles, ARIB captions and MPEG-4 SL streams
//! - DVB SDT/EIT/TDT parsing into program metadata and EPG
//! - PCR-based duration, time and seeking, with wrap-around correction
//! - CSA descrambling hook and PID filtering on capable sources
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsdemux::av::{Block, EsFormat, EsId, EsOut};
//! use tsdemux::config::DemuxConfig;
//! use tsdemux::format::{StreamSource, TsDemuxer};
//! use tsdemux::format::ts::DemuxStatus;
//!
//! #[derive(Default)]
//! struct Counter {
//!     streams: u64,
//!     blocks: usize,
//! }
//!
//! impl EsOut for Counter {
//!     fn add(&mut self, _format: &EsFormat) -> Option<EsId> {
//!         self.streams += 1;
//!         Some(EsId(self.streams))
//!     }
//!     fn remove(&mut self, _id: EsId) {}
//!     fn send(&mut self, _id: EsId, _block: Block) {
//!         self.blocks += 1;
//!     }
//!     fn set_group_pcr(&mut self, _group: i32, _pcr: i64) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = tokio::fs::File::open("capture.ts").await?;
//!     let source = StreamSource::open(file).await?;
//!     let mut demux = TsDemuxer::open(source, Counter::default(), DemuxConfig::load()).await?;
//!
//!     while demux.demux().await? == DemuxStatus::Continue {}
//!
//!     let (_, counter) = demux.close();
//!     println!("{} streams, {} blocks", counter.streams, counter.blocks);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: stream formats, access units and the [`EsOut`](av::EsOut) sink trait
//! - `config`: demuxer options and the extra-PMT syntax
//! - `format`: the [`ByteSource`](format::ByteSource) trait and the TS demuxer
//! - `error`: [`DemuxError`] and the crate [`Result`]
//! - `utils`: bit reader and CRC-32/MPEG-2

/// Elementary stream formats, blocks and the output sink
pub mod av;

/// Demuxer options
pub mod config;

/// Error types and utilities
pub mod error;

/// Byte sources and the transport stream demuxer
pub mod format;

/// Common utilities and helper functions
pub mod utils;

pub use error::{DemuxError, Result};
