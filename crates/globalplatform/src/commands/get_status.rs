//! Applet GET STATUS

use tps_apdu_core::Command;

use crate::card::TokenStatus;
use crate::constants::{cla, ins, sizes};

apdu_command! {
    /// GET STATUS: `B0 3C 00 00 10`
    ///
    /// A failed GET STATUS yields an all-zero status rather than an error.
    pub struct GetStatusCommand;
    success = TokenStatus;
    parse = |response| {
        if response.check_result() {
            Ok(TokenStatus::parse(&response.data()))
        } else {
            Ok(TokenStatus::default())
        }
    }
}

impl GetStatusCommand {
    /// Query applet status
    pub const fn new() -> Self {
        Self(Command::new_with_le(cla::APPLET, ins::GET_STATUS, 0x00, 0x00, sizes::STATUS_LE))
    }
}

impl Default for GetStatusCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use tps_apdu_core::ApduCommand;

    #[test]
    fn test_get_status_command() {
        assert_eq!(GetStatusCommand::new().to_bytes().as_ref(), hex!("B03C000010"));
        let status = GetStatusCommand::parse_response_raw(&hex!("010201039000"))
            .unwrap();
        assert_eq!(status.app_minor_version, 3);
    }
}
