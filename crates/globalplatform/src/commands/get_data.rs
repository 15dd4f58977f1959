//! GET DATA for card production life cycle data

use tps_apdu_core::Command;

use super::require_success;
use crate::card::{CplcData, card_buffer};
use crate::constants::{cla, ins, sizes};
use crate::Error;

apdu_command! {
    /// GET DATA (CPLC): `80 CA 9F 7F 2D`
    pub struct GetDataCommand;
    success = CplcData;
    parse = |response| {
        require_success(&response)?;
        let data = card_buffer(&response);
        if data.len() != sizes::CPLC_DATA {
            return Err(Error::InvalidLength {
                expected: sizes::CPLC_DATA,
                actual: data.len(),
            });
        }
        CplcData::new(data)
    }
}

impl GetDataCommand {
    /// Request the CPLC data object (tag 9F7F)
    pub const fn cplc() -> Self {
        Self(Command::new_with_le(cla::GP, ins::GET_DATA, 0x9F, 0x7F, sizes::CPLC_LE))
    }
}

impl Default for GetDataCommand {
    fn default() -> Self {
        Self::cplc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use tps_apdu_core::ApduCommand;

    #[test]
    fn test_get_data_command() {
        assert_eq!(GetDataCommand::cplc().to_bytes().as_ref(), hex!("80CA9F7F2D"));
    }

    #[test]
    fn test_get_data_length_checked() {
        let mut raw = vec![0u8; 45];
        raw.extend_from_slice(&hex!("9000"));
        assert!(GetDataCommand::parse_response_raw(&raw).is_ok());

        raw.remove(0);
        assert!(matches!(
            GetDataCommand::parse_response_raw(&raw),
            Err(Error::InvalidLength { expected: 47, actual: 46 })
        ));
    }
}
