//! Applet SET ISSUER INFO

use tps_apdu_core::Command;

use super::require_success;
use crate::constants::{cla, ins, sizes};
use crate::{Error, Result};

apdu_command! {
    /// SET ISSUER INFO: `84 F4 00 00 E0 info`
    pub struct SetIssuerInfoCommand;
    success = ();
    parse = |response| { require_success(&response) }
}

impl SetIssuerInfoCommand {
    /// Write issuer information, zero padded to 224 bytes
    pub fn new(info: &[u8]) -> Result<Self> {
        if info.len() > sizes::ISSUER_INFO {
            return Err(Error::InvalidLength {
                expected: sizes::ISSUER_INFO,
                actual: info.len(),
            });
        }
        let mut data = vec![0u8; sizes::ISSUER_INFO];
        data[..info.len()].copy_from_slice(info);
        Ok(Self(Command::new_with_data(cla::GP, ins::SET_ISSUER_INFO, 0x00, 0x00, data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tps_apdu_core::ApduCommand;

    #[test]
    fn test_issuer_info_padding() {
        let cmd = SetIssuerInfoCommand::new(b"Example Org").unwrap();
        let bytes = cmd.to_bytes();
        assert_eq!(&bytes[..5], &[0x80, 0xF4, 0x00, 0x00, 0xE0]);
        assert_eq!(&bytes[5..16], b"Example Org");
        assert!(bytes[16..].iter().all(|b| *b == 0));
        assert_eq!(bytes.len(), 5 + 224);

        assert!(SetIssuerInfoCommand::new(&[0u8; 225]).is_err());
    }
}
