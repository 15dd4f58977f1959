//! Key derivation service client
//!
//! All symmetric key material comes from the external key service. Every
//! response carries the service's status; a non-zero status is a secure
//! channel failure.

use std::fmt;

use tps_apdu_core::Buffer;

use crate::error::{Error, ErrorKind, Result, ResultExt, ServiceError};

/// Inputs for a session key computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyRequest<'a> {
    /// Key diversification data from INITIALIZE UPDATE
    pub diversification_data: &'a Buffer,
    /// Key version and index from INITIALIZE UPDATE
    pub key_info: &'a Buffer,
    /// Card challenge
    pub card_challenge: &'a Buffer,
    /// Host challenge
    pub host_challenge: &'a Buffer,
    /// Card cryptogram
    pub card_cryptogram: &'a Buffer,
    /// Key service connection
    pub connection_id: &'a str,
    /// Token type the keys are for
    pub token_type: &'a str,
}

/// Session keys wrapped under the shared secret, plus the host cryptogram
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionKeyResponse {
    /// Service status; zero is success
    pub status: i32,
    /// Wrapped C-MAC session key
    pub session_key: Buffer,
    /// Wrapped encryption session key
    pub enc_session_key: Buffer,
    /// Host cryptogram for EXTERNAL AUTHENTICATE
    pub host_cryptogram: Buffer,
    /// Transport key for server side key generation
    pub drm_trans_key: Option<Buffer>,
    /// KEK-wrapped DES key for server side key generation
    pub kek_wrapped_key: Option<Buffer>,
    /// Key check value
    pub key_check: Option<Buffer>,
}

impl fmt::Debug for SessionKeyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyResponse")
            .field("status", &self.status)
            .field("host_cryptogram", &self.host_cryptogram)
            .finish_non_exhaustive()
    }
}

/// A response that carries the key service's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status<T> {
    /// Service status; zero is success
    pub status: i32,
    /// Payload
    pub data: T,
}

impl<T> Status<T> {
    /// Successful response
    pub const fn ok(data: T) -> Self {
        Self { status: 0, data }
    }
}

/// Remote key derivation service
pub trait KeyDerivationClient: Send + Sync + fmt::Debug {
    /// Random bytes for host challenges
    fn compute_random_data(&self, size: usize, connection_id: &str) -> std::result::Result<Status<Buffer>, ServiceError>;

    /// Derive session keys for one handshake
    fn compute_session_key(
        &self,
        request: &SessionKeyRequest<'_>,
    ) -> std::result::Result<SessionKeyResponse, ServiceError>;

    /// Encrypt data under the token's keys
    fn encrypt_data(
        &self,
        cuid: &Buffer,
        key_info: &Buffer,
        plaintext: &Buffer,
        connection_id: &str,
    ) -> std::result::Result<Status<Buffer>, ServiceError>;

    /// Wrapped key set for `new_key_info`, ready for PUT KEY
    fn create_key_set_data(
        &self,
        new_key_info: &Buffer,
        current_key_info: &Buffer,
        diversification_data: &Buffer,
        connection_id: &str,
    ) -> std::result::Result<Status<Buffer>, ServiceError>;
}

/// Unwrap a status-bearing response; failures are secure channel errors
pub(crate) fn check<T>(
    response: std::result::Result<Status<T>, ServiceError>,
    what: &str,
) -> Result<T> {
    let response = response.or_kind(ErrorKind::SecureChannel, format!("{what} failed"))?;
    if response.status != 0 {
        return Err(Error::secure_channel(format!(
            "{what} failed with status {}",
            response.status
        )));
    }
    Ok(response.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        let ok = check(Ok(Status::ok(Buffer::from([1u8, 2]))), "random data").unwrap();
        assert_eq!(ok.as_ref(), &[1, 2]);

        let err = check(Ok(Status { status: 3, data: Buffer::new() }), "random data").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecureChannel);
        assert_eq!(err.message(), "random data failed with status 3");

        let err = check::<Buffer>(Err(ServiceError::new("timeout")), "key set").unwrap_err();
        assert_eq!(err.message(), "key set failed: timeout");
    }
}
