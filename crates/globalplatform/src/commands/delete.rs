//! DELETE

use tps_apdu_core::{Command, StatusClass};

use crate::Error;
use crate::constants::{cla, ins, tags};

/// Result of a DELETE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object was removed
    Deleted,
    /// The card reported the object absent (6A 82 or 6A 88)
    Absent,
}

apdu_command! {
    /// DELETE: `84 E4 00 00 Lc 4F len aid`
    pub struct DeleteCommand;
    success = DeleteOutcome;
    parse = |response| {
        match response.status().class() {
            StatusClass::Ok => Ok(DeleteOutcome::Deleted),
            StatusClass::NotFound => Ok(DeleteOutcome::Absent),
            _ => Err(Error::CardStatus(response.status())),
        }
    }
}

impl DeleteCommand {
    /// Delete the object identified by `aid`
    pub fn with_aid(aid: &[u8]) -> Self {
        let mut data = Vec::with_capacity(aid.len() + 2);
        data.push(tags::AID);
        data.push(aid.len() as u8);
        data.extend_from_slice(aid);
        Self(Command::new_with_data(cla::GP, ins::DELETE, 0x00, 0x00, data))
    }
}
