//! PUT KEY

use tps_apdu_core::Command;

use super::require_success;
use crate::constants::{cla, ins, param};

apdu_command! {
    /// PUT KEY: `84 D8 version (80 | index) Lc key_set`
    pub struct PutKeyCommand;
    success = ();
    parse = |response| { require_success(&response) }
}

impl PutKeyCommand {
    /// Replace the key set identified by the current key version and index
    ///
    /// A current version of `FF` (factory state) is sent as `00`.
    pub fn replace(current_version: u8, current_index: u8, key_set: &[u8]) -> Self {
        let version = if current_version == 0xFF { 0x00 } else { current_version };
        Self(Command::new_with_data(
            cla::GP,
            ins::PUT_KEY,
            version,
            param::PUT_KEY_MULTIPLE | current_index,
            key_set.to_vec(),
        ))
    }
}
