//! Applet GET VERSION

use tps_apdu_core::{Buffer, Command};

use crate::Error;
use crate::card::card_buffer;
use crate::constants::{cla, ins, sizes};

apdu_command! {
    /// GET VERSION: `B0 70 00 00 00`
    ///
    /// Succeeds with `None` when the token has no applet to answer.
    pub struct GetVersionCommand;
    success = Option<Buffer>;
    parse = |response| {
        if !response.check_result() {
            return Ok(None);
        }
        let data = card_buffer(&response);
        if data.len() != sizes::VERSION_RESPONSE {
            return Err(Error::InvalidLength {
                expected: sizes::VERSION_RESPONSE,
                actual: data.len(),
            });
        }
        Ok(Some(data.substr(0, 4)?))
    }
}

impl GetVersionCommand {
    /// Query the applet build id
    pub const fn new() -> Self {
        Self(Command::new_with_le(cla::APPLET, ins::GET_VERSION, 0x00, 0x00, 0x00))
    }
}

impl Default for GetVersionCommand {
    fn default() -> Self {
        Self::new()
    }
}
