//! Certificate authority client

use std::fmt;

use derive_more::Display;
use tps_apdu_core::Buffer;

use crate::error::ServiceError;

/// CRL reason codes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum RevocationReason {
    /// No reason given
    #[default]
    #[display("unspecified")]
    Unspecified,
    /// Private key compromised
    #[display("keyCompromise")]
    KeyCompromise,
    /// Issuing CA compromised
    #[display("cACompromise")]
    CaCompromise,
    /// Subject's affiliation changed
    #[display("affiliationChanged")]
    AffiliationChanged,
    /// Replaced by a new certificate
    #[display("superseded")]
    Superseded,
    /// No longer needed
    #[display("cessationOfOperation")]
    CessationOfOperation,
    /// Temporarily on hold
    #[display("certificateHold")]
    CertificateHold,
    /// Released from hold
    #[display("removeFromCRL")]
    RemoveFromCrl,
    /// Privileges withdrawn
    #[display("privilegeWithdrawn")]
    PrivilegeWithdrawn,
    /// Attribute authority compromised
    #[display("aACompromise")]
    AaCompromise,
}

impl RevocationReason {
    /// Reason for a numeric code; 7 is unassigned
    pub const fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Unspecified,
            1 => Self::KeyCompromise,
            2 => Self::CaCompromise,
            3 => Self::AffiliationChanged,
            4 => Self::Superseded,
            5 => Self::CessationOfOperation,
            6 => Self::CertificateHold,
            8 => Self::RemoveFromCrl,
            9 => Self::PrivilegeWithdrawn,
            10 => Self::AaCompromise,
            _ => return None,
        })
    }

    /// Numeric code
    pub const fn code(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::KeyCompromise => 1,
            Self::CaCompromise => 2,
            Self::AffiliationChanged => 3,
            Self::Superseded => 4,
            Self::CessationOfOperation => 5,
            Self::CertificateHold => 6,
            Self::RemoveFromCrl => 8,
            Self::PrivilegeWithdrawn => 9,
            Self::AaCompromise => 10,
        }
    }
}

/// Certificate authority's answer to a revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevocationResponse {
    /// Zero is success
    pub status: i32,
}

/// Remote certificate authority
pub trait CertificateAuthority: Send + Sync + fmt::Debug {
    /// Revoke the certificate with decimal serial `serial`
    fn revoke_certificate(
        &self,
        connection_id: &str,
        check_presence: bool,
        serial: &str,
        certificate: &Buffer,
        reason: RevocationReason,
    ) -> Result<RevocationResponse, ServiceError>;
}
