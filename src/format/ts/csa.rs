//! Common Scrambling Algorithm hook: control words and the shared descrambler.

use crate::error::{DemuxError, Result};
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Black-box CSA implementation supplied by the embedder.
pub trait Descrambler: Send {
    /// Installs the odd (`true`) or even control word.
    fn set_control_word(&mut self, odd: bool, cw: [u8; 8]);

    /// Descrambles the leading bytes of one packet in place.
    ///
    /// Called for every packet; packets whose scrambling control bits are
    /// clear must be left untouched, scrambled ones get their bits reset.
    fn decrypt(&mut self, packet: &mut [u8]);
}

/// Parses a 64-bit control word: 16 hex digits, optional `0x` prefix.
pub fn parse_control_word(key: &str) -> Result<[u8; 8]> {
    let hex = key.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    if hex.len() != 16 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DemuxError::InvalidKey(format!(
            "control word must be 16 hex digits, got '{}'",
            key
        )));
    }

    let mut cw = [0u8; 8];
    for (i, byte) in cw.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)?;
    }
    Ok(cw)
}

struct CsaState {
    descrambler: Box<dyn Descrambler>,
    packet_size: usize,
}

/// Descrambler shared between the demux loop and live key changes.
#[derive(Clone, Default)]
pub struct CsaHandle {
    state: Arc<Mutex<Option<CsaState>>>,
}

impl std::fmt::Debug for CsaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsaHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl CsaHandle {
    /// Sets up descrambling from the configured keys.
    ///
    /// The even key falls back to the odd one when absent or malformed. A
    /// malformed odd key disables descrambling altogether.
    pub fn configure(
        descrambler: Option<Box<dyn Descrambler>>,
        odd_key: Option<&str>,
        even_key: Option<&str>,
        packet_size: i64,
    ) -> Self {
        let handle = Self::default();
        let Some(odd_key) = odd_key.filter(|k| !k.is_empty()) else {
            return handle;
        };
        let Some(mut descrambler) = descrambler else {
            warn!("CSA key given but no descrambler available, packets stay scrambled");
            return handle;
        };

        let odd = match parse_control_word(odd_key) {
            Ok(cw) => cw,
            Err(e) => {
                error!("{}", e);
                return handle;
            }
        };
        descrambler.set_control_word(true, odd);
        let even = even_key
            .filter(|k| !k.is_empty())
            .and_then(|k| parse_control_word(k).map_err(|e| warn!("{}", e)).ok())
            .unwrap_or(odd);
        descrambler.set_control_word(false, even);

        let packet_size = if (4..=188).contains(&packet_size) {
            packet_size as usize
        } else {
            error!("wrong packet size {} specified.", packet_size);
            warn!("using default packet size of 188 bytes");
            188
        };
        debug!("decrypting {} bytes of packet", packet_size);

        *handle.state.lock() = Some(CsaState {
            descrambler,
            packet_size,
        });
        handle
    }

    /// True once a descrambler was installed.
    pub fn is_active(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Replaces one control word; a malformed key keeps the previous one.
    pub fn change_key(&self, odd: bool, key: &str) -> Result<()> {
        let cw = parse_control_word(key)?;
        let mut state = self.state.lock();
        let state = state
            .as_mut()
            .ok_or_else(|| DemuxError::Unsupported("descrambling is not active".into()))?;
        state.descrambler.set_control_word(odd, cw);
        debug!("using new {} control word", if odd { "odd" } else { "even" });
        Ok(())
    }

    /// Descrambles `packet` when a descrambler is active.
    pub fn decrypt(&self, packet: &mut [u8]) {
        if let Some(state) = self.state.lock().as_mut() {
            let len = state.packet_size.min(packet.len());
            state.descrambler.decrypt(&mut packet[..len]);
        }
    }
}
