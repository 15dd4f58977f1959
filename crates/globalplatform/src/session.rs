//! Session state for the SCP02 secure channel
//!
//! [`SessionKeys`] holds the unwrapped keys and wipes them on drop.
//! [`HandshakeData`] keeps the public quantities exchanged during the
//! handshake so callers can inspect key information before authenticating.

use cipher::Key;
use tps_apdu_core::Buffer;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Result;
use crate::commands::InitializeUpdateData;
use crate::crypto::{Scp02, unwrap_session_key};

/// Unwrapped session keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// C-MAC session key
    mac: [u8; 16],
    /// Command encryption session key
    enc: [u8; 16],
}

impl SessionKeys {
    /// Create a key set from already unwrapped keys
    pub const fn new(mac: [u8; 16], enc: [u8; 16]) -> Self {
        Self { mac, enc }
    }

    /// Unwrap the session and encryption session keys with the shared secret
    pub fn unwrap(
        shared_secret: &Key<Scp02>,
        wrapped_mac: &[u8],
        wrapped_enc: &[u8],
    ) -> Result<Self> {
        let mac = unwrap_session_key(shared_secret, wrapped_mac)?;
        let enc = unwrap_session_key(shared_secret, wrapped_enc)?;
        Ok(Self::new(mac.into(), enc.into()))
    }

    /// Get the MAC key
    pub fn mac(&self) -> &Key<Scp02> {
        Key::<Scp02>::from_slice(&self.mac)
    }

    /// Get the encryption key
    pub fn enc(&self) -> &Key<Scp02> {
        Key::<Scp02>::from_slice(&self.enc)
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys { .. }")
    }
}

/// Public quantities of one handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeData {
    /// Key diversification data from the card
    pub diversification_data: Buffer,
    /// Key version and index reported by the card
    pub key_info: Buffer,
    /// Card challenge
    pub card_challenge: Buffer,
    /// Card cryptogram
    pub card_cryptogram: Buffer,
    /// Host challenge sent in INITIALIZE UPDATE
    pub host_challenge: Buffer,
    /// Host cryptogram presented in EXTERNAL AUTHENTICATE
    pub host_cryptogram: Buffer,
}

impl HandshakeData {
    /// Combine the card's INITIALIZE UPDATE answer with the host side values
    pub fn new(card: InitializeUpdateData, host_challenge: Buffer, host_cryptogram: Buffer) -> Self {
        Self {
            diversification_data: card.diversification_data,
            key_info: card.key_info,
            card_challenge: card.card_challenge,
            card_cryptogram: card.card_cryptogram,
            host_challenge,
            host_cryptogram,
        }
    }
}
