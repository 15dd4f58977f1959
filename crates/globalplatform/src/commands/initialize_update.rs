//! INITIALIZE UPDATE
//!
//! Opens the handshake: the host sends its challenge together with the key
//! version and index it wants to use, and the card answers with its
//! diversification data, key information, challenge and cryptogram.

use tps_apdu_core::{Buffer, Command};

use super::require_success;
use crate::constants::{cla, ins, sizes};
use crate::{Error, Result};

/// Parsed INITIALIZE UPDATE response data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeUpdateData {
    /// Key diversification data (10 bytes)
    pub diversification_data: Buffer,
    /// Key information: version and protocol (2 bytes)
    pub key_info: Buffer,
    /// Card challenge (8 bytes)
    pub card_challenge: Buffer,
    /// Card cryptogram (8 bytes)
    pub card_cryptogram: Buffer,
}

impl InitializeUpdateData {
    /// Split a response data field
    ///
    /// The data must be exactly 28 bytes; nothing is sliced otherwise.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != sizes::INITIALIZE_UPDATE_RESPONSE {
            return Err(Error::InvalidLength {
                expected: sizes::INITIALIZE_UPDATE_RESPONSE,
                actual: data.len(),
            });
        }
        let data = Buffer::copy_from_slice(data);
        Ok(Self {
            diversification_data: data.substr(0, 10)?,
            key_info: data.substr(10, 2)?,
            card_challenge: data.substr(12, 8)?,
            card_cryptogram: data.substr(20, 8)?,
        })
    }
}

apdu_command! {
    /// INITIALIZE UPDATE: `80 50 version index 08 challenge 00`
    pub struct InitializeUpdateCommand;
    success = InitializeUpdateData;
    parse = |response| {
        require_success(&response)?;
        InitializeUpdateData::parse(&response.data())
    }
}

impl InitializeUpdateCommand {
    /// Start a handshake with the given key set and host challenge
    pub fn new(key_version: u8, key_index: u8, host_challenge: &[u8]) -> Result<Self> {
        if host_challenge.len() != sizes::HOST_CHALLENGE {
            return Err(Error::InvalidLength {
                expected: sizes::HOST_CHALLENGE,
                actual: host_challenge.len(),
            });
        }
        Ok(Self(
            Command::new_with_data(
                cla::GP,
                ins::INITIALIZE_UPDATE,
                key_version,
                key_index,
                host_challenge.to_vec(),
            )
            .with_le(0x00),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use tps_apdu_core::ApduCommand;

    #[test]
    fn test_initialize_update_command() {
        let cmd = InitializeUpdateCommand::new(0x01, 0x00, &hex!("f0467f908e5ca23f")).unwrap();
        assert_eq!(cmd.to_bytes().as_ref(), hex!("8050010008f0467f908e5ca23f00"));
        assert!(InitializeUpdateCommand::new(0x01, 0x00, &hex!("f0467f908e5ca2")).is_err());
    }

    #[test]
    fn test_initialize_update_response() {
        let raw = hex!("000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce49000");
        let data = InitializeUpdateCommand::parse_response_raw(&raw).unwrap();
        assert_eq!(data.diversification_data.as_ref(), &hex!("00000265018303953662"));
        assert_eq!(data.key_info.as_ref(), &hex!("2002"));
        assert_eq!(data.card_challenge.as_ref(), &hex!("000de9c62ba1c4c8"));
        assert_eq!(data.card_cryptogram.as_ref(), &hex!("e55fcb91b6654ce4"));
    }

    #[test]
    fn test_initialize_update_wrong_length() {
        for len in [27usize, 29] {
            let mut raw = vec![0u8; len];
            raw.extend_from_slice(&hex!("9000"));
            assert!(matches!(
                InitializeUpdateCommand::parse_response_raw(&raw),
                Err(Error::InvalidLength { expected: 28, actual }) if actual == len
            ));
        }
    }
}
