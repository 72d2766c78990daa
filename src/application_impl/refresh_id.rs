use crate::domain_model::SessionId;
use anyhow::anyhow;
use hmac::{Hmac, Mac};
use sha2::Sha256;

const REFRESH_ID_HEX_LEN: usize = 32;

/// Derives refresh-token ids from `(session, generation)` under a server key.
///
/// Session ids are random, so the output is unguessable without the key, and
/// the engine can re-create the current refresh credential from a ledger row
/// that only stores hashes.
pub struct RefreshIdDeriver {
    mac: Hmac<Sha256>,
}

impl RefreshIdDeriver {
    pub fn new(key: &[u8]) -> anyhow::Result<Self> {
        let mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
            .map_err(|e| anyhow!("invalid refresh id key: {}", e))?;
        Ok(RefreshIdDeriver { mac })
    }

    pub fn derive(&self, session_id: SessionId, generation: u32) -> String {
        let mut mac = self.mac.clone();
        mac.update(session_id.0.as_bytes());
        mac.update(b":");
        mac.update(&generation.to_be_bytes());
        let mut out = hex::encode(mac.finalize().into_bytes());
        out.truncate(REFRESH_ID_HEX_LEN);
        out
    }
}
