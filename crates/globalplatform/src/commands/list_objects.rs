//! Applet LIST OBJECTS

use tps_apdu_core::{Buffer, Command};

use crate::card::card_buffer;
use crate::constants::{cla, ins, sizes};

apdu_command! {
    /// LIST OBJECTS: `B0 58 seq 00 0E`
    ///
    /// `None` when the token reports no further objects.
    pub struct ListObjectsCommand;
    success = Option<Buffer>;
    parse = |response| {
        Ok(response.check_result().then(|| card_buffer(&response)))
    }
}

impl ListObjectsCommand {
    /// List the object at position `seq` (0x00 resets, 0x01 continues)
    pub const fn new(seq: u8) -> Self {
        Self(Command::new_with_le(cla::APPLET, ins::LIST_OBJECTS, seq, 0x00, sizes::LIST_OBJECTS_LE))
    }
}
