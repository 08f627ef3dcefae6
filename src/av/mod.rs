//! Elementary stream types shared between the demuxer and its sink.

mod block;
mod codec;
mod format;
mod output;

pub use block::*;
pub use codec::*;
pub use format::*;
pub use output::*;
