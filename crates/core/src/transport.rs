//! Byte exchange with a token
//!
//! A transport moves command bytes to the token and response bytes back. It
//! has no notion of APDU structure or secure messaging.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace};

use crate::apdu::ApduCommand;

/// Failure to exchange bytes with the token
#[derive(Debug, Error)]
pub enum TransportError {
    /// There is no live session with the client
    #[error("token session is disconnected")]
    Disconnected,

    /// The session failed or answered with something other than a token response
    #[error("token session failed: {0}")]
    Session(String),
}

impl TransportError {
    /// Session failure with a message
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }
}

/// Raw APDU exchange
pub trait CardTransport: Send + fmt::Debug {
    /// Send command bytes and return the response bytes, status word included
    fn transmit_raw(&mut self, apdu: &[u8]) -> Result<Bytes, TransportError>;

    /// Whether the session with the token is still usable
    fn is_connected(&self) -> bool;
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn transmit_raw(&mut self, apdu: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transmit_raw(apdu)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Typed exchange on top of [`CardTransport`]
pub trait CardTransportExt: CardTransport {
    /// Encode `command`, exchange it and decode the answer
    fn transmit<C>(&mut self, command: &C) -> Result<C::Success, C::Error>
    where
        C: ApduCommand,
        C::Error: From<TransportError>,
    {
        let apdu = command.to_bytes();
        trace!(apdu = %hex::encode_upper(&apdu), "->");
        let response = self
            .transmit_raw(&apdu)
            .inspect_err(|e| debug!(error = %e, "exchange failed"))?;
        trace!(response = %hex::encode_upper(&response), "<-");
        C::parse_response_raw(&response)
    }
}

impl<T: CardTransport + ?Sized> CardTransportExt for T {}

/// Transport answering from a queue; the last answer repeats
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    pub(crate) answers: std::collections::VecDeque<Bytes>,
    pub(crate) sent: Vec<Bytes>,
    pub(crate) disconnected: bool,
}

#[cfg(test)]
impl CardTransport for ScriptedTransport {
    fn transmit_raw(&mut self, apdu: &[u8]) -> Result<Bytes, TransportError> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }
        self.sent.push(Bytes::copy_from_slice(apdu));
        match self.answers.len() {
            0 => Err(TransportError::session("script exhausted")),
            1 => Ok(self.answers[0].clone()),
            _ => Ok(self.answers.pop_front().unwrap_or_default()),
        }
    }

    fn is_connected(&self) -> bool {
        !self.disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Command, Error, Response};
    use hex_literal::hex;

    #[test]
    fn typed_exchange_records_apdu() {
        let mut transport = ScriptedTransport {
            answers: [Bytes::from_static(&hex!("4A5F01029000"))].into(),
            ..Default::default()
        };
        let response: Response =
            transport.transmit(&Command::new_with_le(0xB0, 0x70, 0x00, 0x00, 0x00)).unwrap();
        assert_eq!(response.data().as_ref(), hex!("4A5F0102"));
        assert_eq!(transport.sent[0].as_ref(), hex!("B070000000"));
    }

    #[test]
    fn transport_failure_surfaces_through_codec_error() {
        let mut transport = ScriptedTransport { disconnected: true, ..Default::default() };
        let err = transport.transmit(&Command::new(0x80, 0x50, 0x00, 0x00)).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Disconnected)));
        assert!(!transport.is_connected());
    }
}
