//! Short command APDUs and their responses
//!
//! A [`Command`] is the CLA INS P1 P2 header with optional data and Le. A
//! [`Response`] is the returned data followed by the status word. Typed
//! commands implement [`ApduCommand`] to decode a response into something
//! meaningful; a non-success status is only an error if that decoding says so.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::status::StatusWord;
use crate::{Error, Result};

/// Largest data field a short APDU can carry
pub const MAX_DATA_LENGTH: usize = 255;

/// A command with a typed interpretation of its response
pub trait ApduCommand {
    /// Decoded result of a successful exchange
    type Success;

    /// Error raised while decoding
    type Error: From<Error>;

    /// The underlying APDU
    fn command(&self) -> &Command;

    /// Wire encoding of the APDU
    fn to_bytes(&self) -> Bytes {
        self.command().to_bytes()
    }

    /// Decode a parsed response
    fn parse_response(response: Response) -> Result<Self::Success, Self::Error>;

    /// Decode raw response bytes, status word included
    fn parse_response_raw(raw: &[u8]) -> Result<Self::Success, Self::Error> {
        Self::parse_response(Response::from_bytes(raw)?)
    }
}

/// Command APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// First parameter
    pub p1: u8,
    /// Second parameter
    pub p2: u8,
    /// Data field, sent with a one-byte Lc
    pub data: Option<Bytes>,
    /// Expected response length; 0 requests up to 256 bytes
    pub le: Option<u8>,
}

impl Command {
    /// Header-only command
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self { cla, ins, p1, p2, data: None, le: None }
    }

    /// Header plus Le
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: u8) -> Self {
        Self::new(cla, ins, p1, p2).with_le(le)
    }

    /// Header plus data
    pub fn new_with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: impl Into<Bytes>) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Replace the data field
    pub fn with_data(self, data: impl Into<Bytes>) -> Self {
        Self { data: Some(data.into()), ..self }
    }

    /// Replace Le
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Fail if the data field is too long for a short APDU
    pub fn validate(&self) -> Result<()> {
        match self.data.as_ref().map(Bytes::len) {
            Some(len) if len > MAX_DATA_LENGTH => {
                Err(Error::DataTooLong { len, max: MAX_DATA_LENGTH })
            }
            _ => Ok(()),
        }
    }

    /// Encode as CLA INS P1 P2 [Lc data] [Le]
    pub fn to_bytes(&self) -> Bytes {
        let data = self.data.as_deref().unwrap_or_default();
        let mut out = BytesMut::with_capacity(6 + data.len());
        out.put_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if self.data.is_some() {
            out.put_u8(data.len() as u8);
            out.put_slice(data);
        }
        if let Some(le) = self.le {
            out.put_u8(le);
        }
        out.freeze()
    }

    /// Decode a short APDU
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let malformed = || Error::MalformedCommand(raw.len());
        let [cla, ins, p1, p2, body @ ..] = raw else {
            return Err(malformed());
        };
        let mut command = Self::new(*cla, *ins, *p1, *p2);
        match body {
            [] => {}
            [le] => command.le = Some(*le),
            [lc, rest @ ..] => {
                let lc = usize::from(*lc);
                let (data, trailer) = rest.split_at_checked(lc).ok_or_else(malformed)?;
                if lc > 0 {
                    command.data = Some(Bytes::copy_from_slice(data));
                }
                match trailer {
                    [] => {}
                    [le] => command.le = Some(*le),
                    _ => return Err(malformed()),
                }
            }
        }
        Ok(command)
    }
}

impl ApduCommand for Command {
    type Success = Response;
    type Error = Error;

    fn command(&self) -> &Command {
        self
    }

    fn parse_response(response: Response) -> Result<Response> {
        Ok(response)
    }
}

/// Response APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    data: Bytes,
    status: StatusWord,
}

impl Response {
    /// Build from data and status
    pub fn new(data: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self { data: data.into(), status: status.into() }
    }

    /// Split raw bytes into data and the trailing status word
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let [data @ .., sw1, sw2] = raw else {
            return Err(Error::TruncatedResponse(raw.len()));
        };
        let status = StatusWord::new(*sw1, *sw2);
        trace!(%status, len = data.len(), "response");
        Ok(Self { data: Bytes::copy_from_slice(data), status })
    }

    /// Data without the status word
    pub fn data(&self) -> Bytes {
        self.data.clone()
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// True iff the status word is 90 00
    pub const fn check_result(&self) -> bool {
        self.status.is_success()
    }

    /// The data, or [`Error::Status`] when the card did not answer 90 00
    pub fn require_ok(self) -> Result<Bytes> {
        if self.check_result() { Ok(self.data) } else { Err(Error::Status(self.status)) }
    }

    /// Data followed by the status word
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.data.len() + 2);
        out.put_slice(&self.data);
        out.put_slice(&self.status.to_bytes());
        out.freeze()
    }
}
