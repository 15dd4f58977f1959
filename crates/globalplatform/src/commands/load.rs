//! LOAD

use tps_apdu_core::Command;

use super::require_success;
use crate::constants::{cla, ins, param};

apdu_command! {
    /// LOAD: `84 E8 p1 block_number Lc block`
    pub struct LoadCommand;
    success = ();
    parse = |response| { require_success(&response) }
}

impl LoadCommand {
    /// Send one block of the load file; `last` marks the final block
    pub fn block(last: bool, block_number: u8, block: &[u8]) -> Self {
        let p1 = if last { param::LOAD_LAST_BLOCK } else { param::LOAD_MORE_BLOCKS };
        Self(Command::new_with_data(cla::GP, ins::LOAD, p1, block_number, block.to_vec()))
    }
}
