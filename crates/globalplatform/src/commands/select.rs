//! SELECT by AID

use tps_apdu_core::Command;

use super::require_success;
use crate::constants::{cla, ins, param};

apdu_command! {
    /// SELECT command: `00 A4 04 00 Lc aid`
    pub struct SelectCommand;
    success = ();
    parse = |response| { require_success(&response) }
}

impl SelectCommand {
    /// Select an application by AID
    pub fn with_aid(aid: impl Into<bytes::Bytes>) -> Self {
        Self(Command::new_with_data(
            cla::ISO7816,
            ins::SELECT,
            param::SELECT_BY_NAME,
            0x00,
            aid.into(),
        ))
    }
}
