//! Card identity query

use tps_apdu_core::{Buffer, CardTransport, CardTransportExt};
use tps_globalplatform::{GetDataCommand, GetStatusCommand, GetVersionCommand, TokenStatus};
use tracing::{debug, warn};

use crate::channel::select;
use crate::config::OperationConfig;
use crate::error::{Error, ErrorKind, Result, TpsStatus};

/// What the token reports about itself, read once per operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    /// Card unique identifier
    pub cuid: Buffer,
    /// Manufacturing serial number
    pub msn: Buffer,
    /// Versions and memory from GET STATUS
    pub status: TokenStatus,
}

impl TokenIdentity {
    /// Select the card manager, read CPLC data, then select the token
    /// applet and read its status
    ///
    /// The applet may not exist yet, so a failed applet SELECT is logged
    /// and the status comes back as zeros.
    pub fn query(transport: &mut dyn CardTransport, op: &OperationConfig) -> Result<Self> {
        select(transport, &op.card_manager_aid).map_err(|e| {
            Error::card(ErrorKind::SecureChannel, "select card manager", e)
                .with_status(TpsStatus::CreateCardmgr)
        })?;

        let cplc = transport
            .transmit(&GetDataCommand::cplc())
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "get data", e))?;
        let cuid = cplc
            .cuid()
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "cuid", e))?;
        let msn = cplc
            .msn()
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "msn", e))?;

        if let Err(e) = select(transport, &op.applet_aid) {
            warn!(error = %e, "Token applet not selectable");
        }

        let status = transport
            .transmit(&GetStatusCommand::new())
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "get status", e))?;
        debug!(cuid = %cuid, msn = %msn, ?status, "Token identified");

        Ok(Self { cuid, msn, status })
    }

    /// CUID as upper-case hex, the token's registry id
    pub fn cuid_hex(&self) -> String {
        self.cuid.to_hex_plain()
    }

    /// MSN as upper-case hex
    pub fn msn_hex(&self) -> String {
        self.msn.to_hex_plain()
    }

    /// Applet version string `<major>.<minor>.<build>` in lower-case hex
    pub fn applet_version(&self, build_id: &Buffer) -> String {
        format!(
            "{:x}.{:x}.{}",
            self.status.app_major_version,
            self.status.app_minor_version,
            build_id.to_hex_plain().to_ascii_lowercase()
        )
    }
}

/// GET VERSION; `None` when the token has no applet
pub fn applet_build_id(transport: &mut dyn CardTransport) -> Result<Option<Buffer>> {
    transport
        .transmit(&GetVersionCommand::new())
        .map_err(|e| Error::card(ErrorKind::SecureChannel, "get version", e))
}
