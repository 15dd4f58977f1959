//! Card data returned by identity queries
//!
//! The buffers handled here are the response data followed by the status
//! word, exactly as the token delivers them. Field offsets are relative to
//! that buffer.

use std::fmt;

use tps_apdu_core::{Buffer, Response};

use crate::constants::sizes;
use crate::{Error, Result};

/// Append the status word to a response's data, giving the card data buffer
pub(crate) fn card_buffer(response: &Response) -> Buffer {
    let status = response.status();
    Buffer::from(response.data()).concat(&status.to_bytes())
}

/// Card production life cycle data from GET DATA
#[derive(Clone, PartialEq, Eq)]
pub struct CplcData(Buffer);

impl CplcData {
    /// Wrap a GET DATA buffer
    ///
    /// Fails when the buffer is shorter than 47 bytes.
    pub fn new(data: Buffer) -> Result<Self> {
        if data.len() < sizes::CPLC_DATA {
            return Err(Error::InvalidLength {
                expected: sizes::CPLC_DATA,
                actual: data.len(),
            });
        }
        Ok(Self(data))
    }

    /// Card unique identifier: bytes 3..7, 19..21 and 15..19 in that order
    pub fn cuid(&self) -> Result<Buffer> {
        let parts = [
            self.0.substr(3, 4)?,
            self.0.substr(19, 2)?,
            self.0.substr(15, 4)?,
        ];
        Ok(Buffer::join(parts.iter().map(|p| p.as_ref())))
    }

    /// Manufacturing serial number: bytes 41..45
    pub fn msn(&self) -> Result<Buffer> {
        Ok(self.0.substr(41, 4)?)
    }

    /// Raw buffer
    pub const fn as_buffer(&self) -> &Buffer {
        &self.0
    }
}

impl fmt::Debug for CplcData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CplcData").field(&self.0).finish()
    }
}

/// Versions and memory reported by the token applet's GET STATUS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenStatus {
    /// Card OS major version
    pub major_version: u8,
    /// Card OS minor version
    pub minor_version: u8,
    /// Applet major version
    pub app_major_version: u8,
    /// Applet minor version
    pub app_minor_version: u8,
    /// Total on-card memory
    pub total_memory: u16,
    /// Free on-card memory
    pub free_memory: u16,
}

impl TokenStatus {
    /// Parse GET STATUS data; short buffers leave the missing fields at zero
    pub fn parse(data: &[u8]) -> Self {
        let mut status = Self::default();
        if let [major, minor, app_major, app_minor, ..] = *data {
            status.major_version = major;
            status.minor_version = minor;
            status.app_major_version = app_major;
            status.app_minor_version = app_minor;
        }
        if data.len() >= 12 {
            status.total_memory = u16::from_be_bytes([data[6], data[7]]);
            status.free_memory = u16::from_be_bytes([data[10], data[11]]);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn cplc() -> Buffer {
        Buffer::from((0u8..45).chain([0x90, 0x00]).collect::<Vec<_>>())
    }

    #[test]
    fn test_cuid_and_msn_offsets() {
        let data = CplcData::new(cplc()).unwrap();
        assert_eq!(
            data.cuid().unwrap().as_ref(),
            &hex!("03040506 1314 0F101112")
        );
        assert_eq!(data.msn().unwrap().as_ref(), &hex!("292A2B2C"));
    }

    #[test]
    fn test_short_cplc_rejected() {
        let short = cplc().substr(0, 46).unwrap();
        assert!(matches!(
            CplcData::new(short),
            Err(Error::InvalidLength {
                expected: 47,
                actual: 46
            })
        ));
    }

    #[test]
    fn test_token_status_parse() {
        let status = TokenStatus::parse(&hex!("01020103 0000 4650 0000 1F40 00000000"));
        assert_eq!(status.major_version, 1);
        assert_eq!(status.minor_version, 2);
        assert_eq!(status.app_major_version, 1);
        assert_eq!(status.app_minor_version, 3);
        assert_eq!(status.total_memory, 0x4650);
        assert_eq!(status.free_memory, 0x1F40);

        let partial = TokenStatus::parse(&hex!("0102"));
        assert_eq!(partial, TokenStatus::default());
    }
}
