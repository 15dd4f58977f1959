//! Error taxonomy for token operations
//!
//! Every failure surfaced by the processor is an [`Error`] of one
//! [`ErrorKind`] with a [`TpsStatus`] the terminal-facing protocol
//! understands. Lower-layer errors are wrapped, never passed through.

use std::fmt;

use derive_more::Display;

/// Result type for token operations
pub type Result<T> = std::result::Result<T, Error>;

/// Status codes reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(u16)]
pub enum TpsStatus {
    /// Operation completed
    #[display("STATUS_NO_ERROR")]
    NoError = 0,
    /// INITIALIZE UPDATE failed
    #[display("STATUS_ERROR_SECURE_CHANNEL_INIT_UPDATE")]
    SecInitUpdate = 2,
    /// The card manager could not be selected
    #[display("STATUS_ERROR_CREATE_CARDMGR")]
    CreateCardmgr = 3,
    /// Unexpected status from the token
    #[display("STATUS_ERROR_BAD_STATUS")]
    BadStatus = 9,
    /// The certificate authority returned an error
    #[display("STATUS_ERROR_CA_RESPONSE")]
    CaResponse = 10,
    /// Client or token connection failure
    #[display("STATUS_ERROR_CONNECTION")]
    Connection = 13,
    /// Holder authentication failed
    #[display("STATUS_ERROR_LOGIN")]
    Login = 14,
    /// Registry read failure
    #[display("STATUS_ERROR_DB")]
    Db = 15,
    /// Token or profile disabled
    #[display("STATUS_ERROR_TOKEN_DISABLED")]
    TokenDisabled = 16,
    /// Secure channel failure
    #[display("STATUS_ERROR_SECURE_CHANNEL")]
    SecureChannel = 17,
    /// Missing or invalid configuration
    #[display("STATUS_ERROR_MISCONFIGURATION")]
    Misconfiguration = 18,
    /// Applet upgrade failure
    #[display("STATUS_ERROR_UPGRADE_APPLET")]
    UpgradeApplet = 19,
    /// Symmetric key change over failure
    #[display("STATUS_ERROR_KEY_CHANGE_OVER")]
    KeyChangeOver = 20,
    /// EXTERNAL AUTHENTICATE rejected
    #[display("STATUS_ERROR_EXTERNAL_AUTH")]
    ExternalAuth = 21,
    /// No token type could be resolved
    #[display("STATUS_ERROR_DEFAULT_TOKENTYPE_NOT_FOUND")]
    DefaultTokenTypeNotFound = 22,
    /// The token's status forbids the operation
    #[display("STATUS_ERROR_DISABLED_TOKEN")]
    DisabledToken = 25,
    /// The operation needs administrator attention
    #[display("STATUS_ERROR_CONTACT_ADMIN")]
    ContactAdmin = 34,
    /// No such operation
    #[display("STATUS_ERROR_NO_OPERATION")]
    NoOperation = 37,
    /// Certificate revocation failed
    #[display("STATUS_ERROR_REVOKE_CERTIFICATES_FAILED")]
    RevokeCertificatesFailed = 38,
    /// The token record could not be persisted
    #[display("STATUS_ERROR_UPDATE_TOKENDB_FAILED")]
    UpdateTokenDbFailed = 39,
}

impl TpsStatus {
    /// Numeric code
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// Failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    /// Malformed card or key service data, missing shared secret, failed mutual authentication
    #[display("secure channel")]
    SecureChannel,
    /// Holder authentication failure or malformed credential mapping
    #[display("login")]
    Login,
    /// Missing or invalid configuration
    #[display("misconfiguration")]
    Misconfiguration,
    /// Applet selection, load or install failure
    #[display("upgrade")]
    Upgrade,
    /// Illegal status transition or disabled profile
    #[display("token disabled")]
    TokenDisabled,
    /// Malformed serial or certificate authority failure
    #[display("revocation")]
    Revocation,
    /// Persistence failure
    #[display("registry")]
    Registry,
}

impl ErrorKind {
    /// Status reported when none is chosen explicitly
    pub const fn default_status(self) -> TpsStatus {
        match self {
            Self::SecureChannel => TpsStatus::SecureChannel,
            Self::Login => TpsStatus::Login,
            Self::Misconfiguration => TpsStatus::Misconfiguration,
            Self::Upgrade => TpsStatus::UpgradeApplet,
            Self::TokenDisabled => TpsStatus::TokenDisabled,
            Self::Revocation => TpsStatus::RevokeCertificatesFailed,
            Self::Registry => TpsStatus::UpdateTokenDbFailed,
        }
    }
}

/// A failed token operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct Error {
    kind: ErrorKind,
    status: TpsStatus,
    message: String,
}

impl Error {
    /// Create an error with the kind's default status
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.default_status(),
            message: message.into(),
        }
    }

    /// Secure channel error
    pub fn secure_channel(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SecureChannel, message)
    }

    /// Login error
    pub fn login(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Login, message)
    }

    /// Misconfiguration error
    pub fn misconfiguration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Misconfiguration, message)
    }

    /// Applet upgrade error
    pub fn upgrade(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upgrade, message)
    }

    /// Token disabled error
    pub fn token_disabled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenDisabled, message)
    }

    /// Revocation error
    pub fn revocation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Revocation, message)
    }

    /// Registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Registry, message)
    }

    /// Override the reported status
    #[must_use]
    pub const fn with_status(mut self, status: TpsStatus) -> Self {
        self.status = status;
        self
    }

    /// Wrap a card exchange failure; lost sessions report a connection error
    pub fn card(kind: ErrorKind, context: impl fmt::Display, source: tps_globalplatform::Error) -> Self {
        let connection_lost = matches!(source, tps_globalplatform::Error::Transport(_));
        let error = Self::new(kind, format!("{context}: {source}"));
        if connection_lost {
            error.with_status(TpsStatus::Connection)
        } else {
            error
        }
    }

    /// Failure class
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Status reported to the client
    pub const fn status(&self) -> TpsStatus {
        self.status
    }

    /// Human readable cause
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl ServiceError {
    /// Create a service error from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Wrap lower-layer errors into the taxonomy
pub trait ResultExt<T> {
    /// Wrap the error as `kind`, prefixing its text with `context`
    fn or_kind(self, kind: ErrorKind, context: impl fmt::Display) -> Result<T>;

    /// Wrap the error as `kind` with an explicit status
    fn or_status(self, kind: ErrorKind, status: TpsStatus, context: impl fmt::Display) -> Result<T>;
}

impl<T, E: fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn or_kind(self, kind: ErrorKind, context: impl fmt::Display) -> Result<T> {
        self.map_err(|e| Error::new(kind, format!("{context}: {e}")))
    }

    fn or_status(self, kind: ErrorKind, status: TpsStatus, context: impl fmt::Display) -> Result<T> {
        self.or_kind(kind, context).map_err(|e| e.with_status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_per_kind() {
        assert_eq!(Error::secure_channel("x").status(), TpsStatus::SecureChannel);
        assert_eq!(Error::login("x").status().code(), 14);
        assert_eq!(Error::registry("x").status().code(), 39);
        assert_eq!(
            Error::token_disabled("x").with_status(TpsStatus::DisabledToken).status().code(),
            25
        );
    }

    #[test]
    fn test_card_errors() {
        use tps_apdu_core::transport::TransportError;

        let lost = Error::card(
            ErrorKind::Upgrade,
            "load",
            tps_globalplatform::Error::Transport(TransportError::Disconnected),
        );
        assert_eq!(lost.status(), TpsStatus::Connection);
        assert_eq!(lost.kind(), ErrorKind::Upgrade);

        let status = Error::card(
            ErrorKind::Upgrade,
            "install",
            tps_globalplatform::Error::CardStatus(tps_apdu_core::StatusWord::new(0x6A, 0x80)),
        );
        assert_eq!(status.status(), TpsStatus::UpgradeApplet);
    }

    #[test]
    fn test_wrapping_keeps_source_text() {
        let res: std::result::Result<(), ServiceError> = Err(ServiceError::new("connection refused"));
        let err = res
            .or_status(ErrorKind::SecureChannel, TpsStatus::Connection, "key service")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecureChannel);
        assert_eq!(err.status(), TpsStatus::Connection);
        assert_eq!(err.message(), "key service: connection refused");
        assert_eq!(err.to_string(), "secure channel error: key service: connection refused");
    }
}
