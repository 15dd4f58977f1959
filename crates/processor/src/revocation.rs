//! Certificate revocation when a token is formatted

use num_bigint_dig::BigUint;
use tracing::{debug, info, instrument, warn};

use crate::authority::CertificateAuthority;
use crate::config::ProfileConfig;
use crate::context::OperationContext;
use crate::error::{Error, ErrorKind, Result, ResultExt, TpsStatus};
use crate::registry::{ActivityEntry, ActivityOutcome, CertRecord, TokenRecord, TokenRegistry};

/// Decimal form of a `0x`-prefixed hex serial
///
/// Serials may be wider than any fixed integer type.
pub fn hex_serial_to_decimal(serial: &str) -> Option<String> {
    let digits = serial.strip_prefix("0x").filter(|d| !d.is_empty())?;
    BigUint::parse_bytes(digits.as_bytes(), 16).map(|n| n.to_str_radix(10))
}

/// Revokes the certificates of one token
#[derive(Debug, Clone, Copy)]
pub struct RevocationSweep<'a> {
    registry: &'a dyn TokenRegistry,
    authority: &'a dyn CertificateAuthority,
    profile: &'a ProfileConfig,
    ctx: &'a OperationContext,
}

impl<'a> RevocationSweep<'a> {
    /// Sweep using the profile's CA connection and reason
    pub const fn new(
        registry: &'a dyn TokenRegistry,
        authority: &'a dyn CertificateAuthority,
        profile: &'a ProfileConfig,
        ctx: &'a OperationContext,
    ) -> Self {
        Self {
            registry,
            authority,
            profile,
            ctx,
        }
    }

    /// Revoke or drop every certificate record of `record`'s token
    ///
    /// Stale records (already revoked, on hold, or issued to another token)
    /// are only removed locally. The first malformed serial or CA failure
    /// stops the sweep.
    #[instrument(skip_all, fields(cuid = %record.id))]
    pub fn run(&self, record: &TokenRecord) -> Result<()> {
        if !self.profile.revoke_cert {
            debug!("Certificate revocation not configured");
            return Ok(());
        }

        let cuid = record.id.as_str();
        if !self.registry.is_token_present(cuid) {
            return Err(Error::revocation(format!("token not found: {cuid}")));
        }

        let certs = self
            .registry
            .get_certificates_by_cuid(cuid)
            .or_kind(ErrorKind::Revocation, "unable to read certificate records")?;
        debug!(count = certs.len(), "Certificates found");

        for cert in &certs {
            let stale = if cert.is_revoked() {
                Some("already revoked")
            } else if cert.origin.as_deref().is_some_and(|origin| origin != cuid) {
                Some("issued to another token")
            } else if cert.is_on_hold() {
                Some("on hold")
            } else {
                None
            };

            match stale {
                Some(why) => {
                    self.remove(cert, ErrorKind::Revocation)?;
                    self.log(
                        record,
                        format!("Certificate {} {why}; removed without revocation", cert.serial),
                        ActivityOutcome::Success,
                    );
                }
                None => {
                    self.revoke(record, cert)?;
                    self.remove(cert, ErrorKind::Registry)?;
                }
            }
        }

        debug!("Revocation sweep complete");
        Ok(())
    }

    fn revoke(&self, record: &TokenRecord, cert: &CertRecord) -> Result<()> {
        let Some(serial) = hex_serial_to_decimal(&cert.serial) else {
            let message = format!("malformed hex serial number: {}", cert.serial);
            self.log(record, message.clone(), ActivityOutcome::Failure);
            return Err(Error::revocation(message));
        };

        let reason = self.profile.revoke_reason;
        let failure = match self.authority.revoke_certificate(
            &self.profile.ca_conn,
            true,
            &serial,
            &cert.certificate,
            reason,
        ) {
            Ok(response) if response.status == 0 => None,
            Ok(response) => Some(format!("CA returned status {}", response.status)),
            Err(e) => Some(e.to_string()),
        };

        if let Some(cause) = failure {
            let message = format!("revocation of certificate {} failed: {cause}", cert.serial);
            warn!(serial = %cert.serial, %reason, %cause, "Revocation failed");
            self.log(record, message.clone(), ActivityOutcome::Failure);
            return Err(Error::revocation(message));
        }

        info!(serial = %cert.serial, decimal = %serial, %reason, "Certificate revoked");
        self.log(record, format!("Certificate {} revoked", cert.serial), ActivityOutcome::Success);
        Ok(())
    }

    fn remove(&self, cert: &CertRecord, kind: ErrorKind) -> Result<()> {
        self.registry.remove_cert_record(&cert.id).map_err(|e| {
            let error = Error::new(kind, format!("unable to remove certificate record {}: {e}", cert.id));
            if kind == ErrorKind::Registry {
                error.with_status(TpsStatus::UpdateTokenDbFailed)
            } else {
                error
            }
        })
    }

    fn log(&self, record: &TokenRecord, message: String, outcome: ActivityOutcome) {
        self.registry
            .log_activity(ActivityEntry::new(self.ctx, message, outcome).with_record(record));
    }
}
