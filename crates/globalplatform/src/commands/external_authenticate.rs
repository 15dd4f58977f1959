//! EXTERNAL AUTHENTICATE

use tps_apdu_core::Command;

use crate::Error;
use crate::constants::{cla, ins};

apdu_command! {
    /// EXTERNAL AUTHENTICATE: `84 82 level 00 10 cryptogram mac`
    ///
    /// Built unwrapped; the secure channel appends the C-MAC.
    pub struct ExternalAuthenticateCommand;
    success = ();
    parse = |response| {
        if response.check_result() {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed(response.status()))
        }
    }
}

impl ExternalAuthenticateCommand {
    /// Present the host cryptogram at the requested security level
    pub fn new(security_level: u8, host_cryptogram: &[u8]) -> Self {
        Self(Command::new_with_data(
            cla::GP,
            ins::EXTERNAL_AUTHENTICATE,
            security_level,
            0x00,
            host_cryptogram.to_vec(),
        ))
    }
}
