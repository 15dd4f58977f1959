use thiserror::Error;
use tps_apdu_core::{StatusWord, TransportError};

use crate::secure_channel::ChannelState;

/// Result alias for card management operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures while identifying, authenticating or managing a token
#[derive(Debug, Error)]
pub enum Error {
    /// Lost or broken session with the token
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// APDU encoding or buffer handling failed
    #[error(transparent)]
    Codec(tps_apdu_core::Error),

    /// The card refused a command
    #[error("card returned status {0}")]
    CardStatus(StatusWord),

    /// Card data or a parameter has the wrong size
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Length found
        actual: usize,
    },

    /// Card data or a package is not in the expected shape
    #[error("invalid data: {0}")]
    InvalidFormat(&'static str),

    /// Key material unusable for the requested cipher
    #[error("crypto failure: {0}")]
    Crypto(&'static str),

    /// EXTERNAL AUTHENTICATE was rejected
    #[error("card rejected host cryptogram with status {0}")]
    AuthenticationFailed(StatusWord),

    /// Protected command on a channel that is not authenticated
    #[error("secure channel is {0}")]
    NotAuthenticated(ChannelState),
}

impl From<tps_apdu_core::Error> for Error {
    fn from(error: tps_apdu_core::Error) -> Self {
        match error {
            tps_apdu_core::Error::Transport(e) => Self::Transport(e),
            tps_apdu_core::Error::Status(sw) => Self::CardStatus(sw),
            other => Self::Codec(other),
        }
    }
}

impl Error {
    /// Status word carried by this error, if the card produced one
    pub const fn status(&self) -> Option<StatusWord> {
        match self {
            Self::CardStatus(sw) | Self::AuthenticationFailed(sw) => Some(*sw),
            _ => None,
        }
    }
}
