//! # Utility Types
//!
//! Bit-level reading for packed descriptor fields and the MPEG-2 CRC used to
//! validate table sections.
//!
//! ```rust
//! use tsdemux::utils::{BitReader, Crc32Mpeg2};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = [0b10110011u8];
//! let mut reader = BitReader::new(&data);
//! assert_eq!(reader.read_bits(3)?, 0b101);
//!
//! let crc = Crc32Mpeg2::new();
//! assert_eq!(crc.calculate(&[0x01, 0x01]), 0xD66FB816);
//! # Ok(())
//! # }
//! ```

/// Bitstream reading
pub mod bits;

/// CRC-32/MPEG-2
pub mod crc;

pub use bits::BitReader;
pub use crc::Crc32Mpeg2;
