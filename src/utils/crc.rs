//! CRC-32/MPEG-2 as used by PSI/SI table sections (ISO/IEC 13818-1 annex A).

const CRC32_MPEG2_POLY: u32 = 0x04C11DB7;

/// Table-driven CRC-32/MPEG-2 calculator.
pub struct Crc32Mpeg2 {
    table: [u32; 256],
}

impl Crc32Mpeg2 {
    /// Builds the lookup table.
    pub fn new() -> Self {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if crc & 0x8000_0000 != 0 {
                    (crc << 1) ^ CRC32_MPEG2_POLY
                } else {
                    crc << 1
                };
            }
            *entry = crc;
        }
        Self { table }
    }

    /// Computes the checksum of `data` (initial value 0xFFFFFFFF, no final xor).
    pub fn calculate(&self, data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            let index = ((crc >> 24) ^ byte as u32) & 0xFF;
            (crc << 8) ^ self.table[index as usize]
        })
    }

    /// Checks a complete section whose last four bytes are its big-endian CRC.
    pub fn verify_section(&self, section: &[u8]) -> bool {
        if section.len() < 4 {
            return false;
        }
        let (body, crc) = section.split_at(section.len() - 4);
        let stored = u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]);
        self.calculate(body) == stored
    }
}

impl std::fmt::Debug for Crc32Mpeg2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Crc32Mpeg2")
    }
}

impl Default for Crc32Mpeg2 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_known_vector() {
        let crc = Crc32Mpeg2::new();
        assert_eq!(crc.calculate(&[0x01, 0x01]), 0xD66FB816);
    }

    #[test]
    fn test_verify_section() {
        let crc = Crc32Mpeg2::new();
        let mut pat = vec![
            0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00,
        ];
        let sum = crc.calculate(&pat);
        pat.extend_from_slice(&sum.to_be_bytes());
        assert!(crc.verify_section(&pat));

        pat[10] ^= 0x01;
        assert!(!crc.verify_section(&pat));
        assert!(!crc.verify_section(&[0x00, 0x01]));
    }
}
