use thiserror::Error;

use crate::status::StatusWord;
use crate::transport::TransportError;

/// Result alias for this crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures raised while building, exchanging or decoding APDUs
#[derive(Debug, Error)]
pub enum Error {
    /// The exchange with the token did not complete
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Fewer than two bytes came back, so there is no status word
    #[error("response of {0} bytes has no status word")]
    TruncatedResponse(usize),

    /// The card answered with a status the caller treats as fatal
    #[error("card returned status {0}")]
    Status(StatusWord),

    /// Raw command bytes do not form a short APDU
    #[error("malformed command APDU of {0} bytes")]
    MalformedCommand(usize),

    /// Command data does not fit the one-byte Lc field
    #[error("command data of {len} bytes exceeds {max}")]
    DataTooLong {
        /// Actual data length
        len: usize,
        /// Largest allowed length
        max: usize,
    },

    /// A slice was requested outside a buffer
    #[error("range {offset}+{len} outside buffer of {size} bytes")]
    OutOfRange {
        /// Requested start
        offset: usize,
        /// Requested length
        len: usize,
        /// Buffer length
        size: usize,
    },

    /// Text could not be decoded as hex
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}
