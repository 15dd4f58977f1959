//! Terminal session messages and the card transport built on them
//!
//! The terminal relays APDUs to the token inside `TokenPduRequest` /
//! `TokenPduResponse` pairs and also carries prompts (login, new PIN,
//! progress) for the holder. [`SessionTransport`] adapts the APDU half of a
//! [`TokenSession`] into a [`CardTransport`].

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use thiserror::Error;
use tps_apdu_core::transport::{CardTransport, TransportError};
use tracing::{debug, trace};

/// Message exchanged with the terminal
#[derive(Clone, PartialEq, Eq)]
pub enum Message {
    /// APDU for the token
    TokenPduRequest(Bytes),
    /// Token's answer to an APDU
    TokenPduResponse(Bytes),
    /// Ask the holder for a user name and password
    LoginRequest,
    /// Plain login credentials
    LoginResponse {
        /// User name
        screen_name: String,
        /// Password
        password: String,
    },
    /// Ask the holder for a set of named credentials
    ExtendedLoginRequest {
        /// Prompt title
        title: String,
        /// Prompt description
        description: String,
        /// Requested parameters and their UI descriptors
        params: BTreeMap<String, String>,
    },
    /// Named credentials
    ExtendedLoginResponse(BTreeMap<String, String>),
    /// Ask the holder for a new PIN
    NewPinRequest {
        /// Shortest acceptable PIN
        min_len: usize,
        /// Longest acceptable PIN
        max_len: usize,
    },
    /// New PIN chosen by the holder
    NewPinResponse {
        /// PIN
        pin: String,
    },
    /// Report progress to the holder
    StatusUpdateRequest {
        /// Percentage complete
        percent: u8,
        /// Progress label
        info: String,
    },
    /// Acknowledgement of a progress report
    StatusUpdateResponse,
}

impl Message {
    /// Message type name, safe for logs
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TokenPduRequest(_) => "TokenPduRequest",
            Self::TokenPduResponse(_) => "TokenPduResponse",
            Self::LoginRequest => "LoginRequest",
            Self::LoginResponse { .. } => "LoginResponse",
            Self::ExtendedLoginRequest { .. } => "ExtendedLoginRequest",
            Self::ExtendedLoginResponse(_) => "ExtendedLoginResponse",
            Self::NewPinRequest { .. } => "NewPinRequest",
            Self::NewPinResponse { .. } => "NewPinResponse",
            Self::StatusUpdateRequest { .. } => "StatusUpdateRequest",
            Self::StatusUpdateResponse => "StatusUpdateResponse",
        }
    }
}

// Credentials and PINs never reach the logs
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenPduRequest(pdu) | Self::TokenPduResponse(pdu) => {
                write!(f, "{}({})", self.name(), hex::encode_upper(pdu))
            }
            Self::StatusUpdateRequest { percent, info } => {
                write!(f, "StatusUpdateRequest({percent}, {info})")
            }
            Self::NewPinRequest { min_len, max_len } => {
                write!(f, "NewPinRequest({min_len}..={max_len})")
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Session failures
#[derive(Debug, Error)]
pub enum SessionError {
    /// The terminal connection failed or closed
    #[error("session closed: {0}")]
    Closed(String),
    /// A reply did not match the pending request
    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected message type
        expected: &'static str,
        /// Received message type
        actual: &'static str,
    },
}

/// Duplex, ordered message channel to one terminal
pub trait TokenSession: Send + fmt::Debug {
    /// Send a message
    fn write(&mut self, message: Message) -> Result<(), SessionError>;

    /// Receive the next message
    fn read(&mut self) -> Result<Message, SessionError>;

    /// Address of the terminal client
    fn client_address(&self) -> String;

    /// Send `request` and read its reply
    fn exchange(&mut self, request: Message) -> Result<Message, SessionError> {
        self.write(request)?;
        self.read()
    }
}

/// Card transport that relays APDUs through a terminal session
#[derive(Debug)]
pub struct SessionTransport {
    session: Box<dyn TokenSession>,
    connected: bool,
}

impl SessionTransport {
    /// Wrap a session
    pub fn new(session: Box<dyn TokenSession>) -> Self {
        Self {
            session,
            connected: true,
        }
    }

    /// The underlying session, for non-APDU prompts
    pub fn session(&mut self) -> &mut dyn TokenSession {
        self.session.as_mut()
    }

    /// Address of the terminal client
    pub fn client_address(&self) -> String {
        self.session.client_address()
    }

    /// Report progress to the holder; the acknowledgement is discarded
    pub fn status_update(&mut self, percent: u8, info: &str) -> Result<(), SessionError> {
        debug!(percent, info, "Status update");
        self.session.exchange(Message::StatusUpdateRequest {
            percent,
            info: info.to_owned(),
        })?;
        Ok(())
    }
}

impl CardTransport for SessionTransport {
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(apdu = %hex::encode_upper(command), "TokenPduRequest");
        let reply = self
            .session
            .exchange(Message::TokenPduRequest(Bytes::copy_from_slice(command)))
            .map_err(|e| {
                if matches!(e, SessionError::Closed(_)) {
                    self.connected = false;
                }
                TransportError::session(e.to_string())
            })?;

        match reply {
            Message::TokenPduResponse(response) => {
                trace!(response = %hex::encode_upper(&response), "TokenPduResponse");
                Ok(response)
            }
            other => Err(TransportError::session(
                SessionError::UnexpectedMessage {
                    expected: "TokenPduResponse",
                    actual: other.name(),
                }
                .to_string(),
            )),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    struct ScriptedSession {
        written: Vec<Message>,
        replies: VecDeque<Message>,
    }

    impl TokenSession for ScriptedSession {
        fn write(&mut self, message: Message) -> Result<(), SessionError> {
            self.written.push(message);
            Ok(())
        }

        fn read(&mut self) -> Result<Message, SessionError> {
            self.replies
                .pop_front()
                .ok_or_else(|| SessionError::Closed("no more replies".into()))
        }

        fn client_address(&self) -> String {
            "127.0.0.1".into()
        }
    }

    #[test]
    fn test_relays_pdus() {
        let session = ScriptedSession {
            replies: VecDeque::from([Message::TokenPduResponse(Bytes::from_static(&[0x90, 0x00]))]),
            ..Default::default()
        };
        let mut transport = SessionTransport::new(Box::new(session));
        let response = transport.transmit_raw(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert_eq!(response.as_ref(), &[0x90, 0x00]);
        assert!(transport.is_connected());
    }

    #[test]
    fn test_out_of_order_reply_is_session_error() {
        let session = ScriptedSession {
            replies: VecDeque::from([Message::StatusUpdateResponse]),
            ..Default::default()
        };
        let mut transport = SessionTransport::new(Box::new(session));
        let err = transport.transmit_raw(&[0x00]).unwrap_err();
        assert!(matches!(err, TransportError::Session(_)));
        assert!(err.to_string().contains("StatusUpdateResponse"));

        let err = transport.transmit_raw(&[0x00]).unwrap_err();
        assert!(matches!(err, TransportError::Session(_)));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_status_update_discards_reply() {
        let session = ScriptedSession {
            replies: VecDeque::from([Message::StatusUpdateResponse]),
            ..Default::default()
        };
        let mut transport = SessionTransport::new(Box::new(session));
        transport.status_update(100, "PROGRESS_DONE").unwrap();
        assert!(transport.status_update(100, "PROGRESS_DONE").is_err());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let msg = Message::LoginResponse {
            screen_name: "alice".into(),
            password: "secret".into(),
        };
        assert_eq!(format!("{msg:?}"), "LoginResponse");
    }
}
