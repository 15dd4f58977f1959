//! Token processor
//!
//! One [`TokenProcessor`] serves one terminal session for one operation.
//! Every step runs in order against the physical token; nothing is retried
//! except the key version probe in [`ChannelFactory::upgrade_symmetric_keys`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tps_apdu_core::{Buffer, CardTransportExt};
use tps_globalplatform::{ListObjectsCommand, SecureChannel};
use tracing::{debug, info, instrument, warn};

use crate::applet::{AppletInstaller, AppletTarget};
use crate::auth::{AuthenticatorRegistry, request_credentials};
use crate::authority::CertificateAuthority;
use crate::channel::{ChannelFactory, external_authenticate};
use crate::config::{AuthSettings, ConfigStore, OperationConfig, ProfileConfig};
use crate::context::{BeginOperation, Operation, OperationContext};
use crate::error::{Error, ErrorKind, Result, ResultExt, TpsStatus};
use crate::identity::{TokenIdentity, applet_build_id};
use crate::keystore::SymmetricKeyStore;
use crate::registry::{ActivityEntry, ActivityOutcome, TokenRecord, TokenRegistry, TokenStatus};
use crate::resolver::{ResolverParams, ResolverRegistry};
use crate::revocation::RevocationSweep;
use crate::session::{Message, SessionTransport, TokenSession};
use crate::tks::{self, KeyDerivationClient};

/// Token type used for externally registered tokens
pub const EXTERNAL_REG_TOKEN_TYPE: &str = "externalRegAddToToken";

/// Collaborators shared by every operation
#[derive(Debug, Clone)]
pub struct Services {
    /// Configuration
    pub config: Arc<dyn ConfigStore>,
    /// Key derivation service
    pub tks: Arc<dyn KeyDerivationClient>,
    /// Local shared secrets
    pub keys: Arc<dyn SymmetricKeyStore>,
    /// Certificate authority
    pub authority: Arc<dyn CertificateAuthority>,
    /// Token registry
    pub registry: Arc<dyn TokenRegistry>,
    /// Profile resolvers by name
    pub resolvers: ResolverRegistry,
    /// Authenticators by id
    pub authenticators: AuthenticatorRegistry,
}

/// Best available token details for the failure audit
#[derive(Debug, Default)]
struct FormatAudit {
    cuid: Option<String>,
    record: Option<TokenRecord>,
}

/// Runs token operations over one terminal session
#[derive(Debug)]
pub struct TokenProcessor {
    transport: SessionTransport,
    services: Services,
}

impl TokenProcessor {
    /// Processor for the token behind `session`
    pub fn new(session: Box<dyn TokenSession>, services: Services) -> Self {
        Self {
            transport: SessionTransport::new(session),
            services,
        }
    }

    /// Run the operation named by the begin message
    pub fn process(&mut self, begin: &BeginOperation) -> Result<()> {
        let operation: Operation = begin.operation.parse()?;
        let ctx = OperationContext::new(
            operation,
            begin.extensions.clone(),
            self.transport.client_address(),
        );
        info!(%operation, client = %ctx.client_address, "Operation requested");

        match operation {
            Operation::Format => self.format(&ctx, false),
            other => Err(Error::misconfiguration(format!("operation {other} is not supported"))
                .with_status(TpsStatus::NoOperation)),
        }
    }

    /// Reset the token to the uninitialized state
    ///
    /// Any failure is written to the activity log before it is returned.
    #[instrument(skip_all, fields(client = %ctx.client_address))]
    pub fn format(&mut self, ctx: &OperationContext, skip_auth: bool) -> Result<()> {
        let mut audit = FormatAudit::default();
        let result = self.format_steps(ctx, skip_auth, &mut audit);

        if let Err(e) = &result {
            warn!(error = %e, status = %e.status(), "Format failed");
            let mut entry = ActivityEntry::new(ctx, e.message(), ActivityOutcome::Failure);
            entry = match (&audit.record, audit.cuid) {
                (Some(record), _) => entry.with_record(record),
                (None, Some(cuid)) => entry.with_token_id(cuid),
                (None, None) => entry,
            };
            self.services.registry.log_activity(entry);
        }
        result
    }

    fn format_steps(
        &mut self,
        ctx: &OperationContext,
        skip_auth: bool,
        audit: &mut FormatAudit,
    ) -> Result<()> {
        let services = self.services.clone();
        let op = OperationConfig::load(services.config.as_ref(), ctx.operation)?;

        // Identity
        let identity = TokenIdentity::query(&mut self.transport, &op)?;
        let cuid = identity.cuid_hex();
        audit.cuid = Some(cuid.clone());
        info!(%cuid, msn = %identity.msn_hex(), "Formatting token");

        // Registry entry
        let existing = services
            .registry
            .get_token_entry(&cuid)
            .or_status(ErrorKind::Registry, TpsStatus::Db, "unable to read token entry")?;
        let is_present = existing.is_some();
        let record = audit
            .record
            .insert(existing.unwrap_or_else(|| TokenRecord::new(cuid.clone())));
        debug!(is_present, status = %record.status, "Token entry loaded");

        let build_id = applet_build_id(&mut self.transport)?;
        fill_token_record(record, &identity, build_id.as_ref());

        // Token type
        let token_type = if op.external_reg {
            EXTERNAL_REG_TOKEN_TYPE.to_owned()
        } else {
            let params = ResolverParams {
                major_version: identity.status.major_version,
                minor_version: identity.status.minor_version,
                cuid: cuid.clone(),
                msn: identity.msn_hex(),
                ext_token_type: ctx.extension("tokenType").map(str::to_owned),
                ext_token_atr: ctx.extension("tokenATR").map(str::to_owned),
            };
            services.resolvers.resolve(op.resolver.as_deref(), &params)?
        };
        record.token_type = Some(token_type.clone());
        let ctx = ctx.with_token_type(&token_type);
        let profile = ProfileConfig::load(services.config.as_ref(), ctx.operation, &token_type)?;

        // Holder
        if !op.external_reg && !skip_auth {
            if let Some(auth) = profile.auth_settings(services.config.as_ref())? {
                self.authenticate_holder(&ctx, &auth, record)?;
            }
        }

        // Policy
        if !profile.enabled {
            return Err(Error::token_disabled(format!("profile {token_type} is disabled")));
        }
        if is_present {
            if !services.registry.is_transition_allowed(record, TokenStatus::Uninitialized) {
                return Err(Error::token_disabled(format!(
                    "Operation for CUID {cuid} Disabled, illegal transition attempted {} to {}",
                    record.status,
                    TokenStatus::Uninitialized
                ))
                .with_status(TpsStatus::DisabledToken));
            }
        } else if !op.allow_unknown_token {
            return Err(Error::token_disabled(format!("unknown token {cuid} not allowed")));
        }

        // Applet
        let current_version = match &build_id {
            Some(build_id) => Some(identity.applet_version(build_id)),
            None if profile.allow_empty_token => None,
            None => {
                return Err(Error::upgrade("token has no applet and empty tokens are not allowed")
                    .with_status(TpsStatus::ContactAdmin));
            }
        };
        let target = AppletTarget {
            version: profile.applet_required_version()?,
            directory: profile.applet_directory()?,
        };
        debug!(current = ?current_version, required = target.version, "Applet versions");

        let channels = ChannelFactory::new(
            services.tks.as_ref(),
            services.keys.as_ref(),
            &op,
            &profile,
        );
        let mut channel = AppletInstaller::new(channels, &op).upgrade(
            &mut self.transport,
            &ctx,
            current_version.as_deref(),
            target,
            record,
            10..90,
        )?;

        // Issuer info
        if let Some(info) = profile.issuer_info()? {
            if channel.is_none() {
                channel = Some(channels.open_default(&mut self.transport)?);
            }
            if let Some(channel) = channel.as_mut() {
                channel
                    .set_issuer_info(&mut self.transport, info.as_bytes())
                    .map_err(|e| Error::card(ErrorKind::Upgrade, "set issuer info", e))?;
                debug!(info, "Issuer info written");
            }
        }

        self.status_update(&ctx, 100, "PROGRESS_DONE")?;

        // Keys
        if let Some(mut channel) = channel.take() {
            channel.supersede();
        }
        let mut channel: SecureChannel = channels.upgrade_symmetric_keys(&mut self.transport, record)?;
        external_authenticate(&mut channel, &mut self.transport)?;
        record.key_info = Some(channel.key_info().to_hex_plain());

        // Certificates
        if is_present {
            let sweep = RevocationSweep::new(
                services.registry.as_ref(),
                services.authority.as_ref(),
                &profile,
                &ctx,
            );
            if let Err(e) = sweep.run(record) {
                warn!(error = %e, "Certificate revocation failed; format continues");
            }
        }

        // Persist
        record.status = TokenStatus::Uninitialized;
        services
            .registry
            .update_token_entry(record)
            .or_kind(ErrorKind::Registry, "update token failure")?;
        services.registry.log_activity(
            ActivityEntry::new(&ctx, "update token success", ActivityOutcome::Success)
                .with_record(record),
        );
        services.registry.log_activity(
            ActivityEntry::new(&ctx, "format operation succeeded", ActivityOutcome::Success)
                .with_record(record),
        );
        info!(%cuid, %token_type, "Format complete");
        Ok(())
    }

    fn authenticate_holder(
        &mut self,
        ctx: &OperationContext,
        settings: &AuthSettings,
        record: &mut TokenRecord,
    ) -> Result<()> {
        self.try_authenticate(ctx, settings, record).map_err(|e| {
            warn!(authenticator = %settings.id, cause = %e, "Authentication failed");
            Error::login("authentication failed, status = STATUS_ERROR_LOGIN")
        })
    }

    fn try_authenticate(
        &mut self,
        ctx: &OperationContext,
        settings: &AuthSettings,
        record: &mut TokenRecord,
    ) -> Result<()> {
        let auth = self.services.authenticators.get(&settings.id)?;
        let credentials = request_credentials(self.transport.session(), auth.as_ref(), ctx)?;

        // Recorded before authenticating so a failure is attributed
        if let Some(user) = credentials.get(&settings.cred_name) {
            record.user_id = Some(user.clone());
        }

        let token = auth
            .authenticate(&credentials)
            .or_kind(ErrorKind::Login, "authenticator rejected credentials")?;
        if let Some(user) = token.user_id() {
            record.user_id = Some(user.to_owned());
        }
        debug!(user = record.user_id.as_deref().unwrap_or("-"), "Holder authenticated");
        Ok(())
    }

    /// Send a progress report if the client asked for them
    pub fn status_update(&mut self, ctx: &OperationContext, percent: u8, info: &str) -> Result<()> {
        if !ctx.status_updates() {
            return Ok(());
        }
        self.transport
            .status_update(percent, info)
            .or_status(ErrorKind::SecureChannel, TpsStatus::Connection, "status update")
    }

    /// Object listing at `seq`; `None` when the token has no more objects
    pub fn list_objects(&mut self, seq: u8) -> Result<Option<Buffer>> {
        self.transport
            .transmit(&ListObjectsCommand::new(seq))
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "list objects", e))
    }

    /// Ask the holder for a new PIN of `min_len..=max_len` characters
    pub fn request_new_pin(&mut self, min_len: usize, max_len: usize) -> Result<String> {
        let reply = self
            .transport
            .session()
            .exchange(Message::NewPinRequest { min_len, max_len })
            .or_kind(ErrorKind::Login, "new pin request failed")?;
        let Message::NewPinResponse { pin } = reply else {
            return Err(Error::login(format!("unexpected reply to new pin request: {}", reply.name())));
        };
        if !(min_len..=max_len).contains(&pin.chars().count()) {
            return Err(Error::login(format!(
                "new pin length outside of length constraints: min {min_len} max {max_len}"
            )));
        }
        Ok(pin)
    }

    /// Applet version as `<major>.<minor>.<build>` with decimal versions
    pub fn format_current_applet_version(&mut self, identity: &TokenIdentity) -> Result<String> {
        let build_id = applet_build_id(&mut self.transport)?.ok_or_else(|| {
            Error::upgrade("token has no applet").with_status(TpsStatus::ContactAdmin)
        })?;
        Ok(format!(
            "{}.{}.{}",
            identity.status.app_major_version,
            identity.status.app_minor_version,
            build_id.to_hex_plain().to_ascii_lowercase()
        ))
    }

    /// Encrypt `plaintext` under the token's keys through the key service
    pub fn encrypt_data(
        &self,
        cuid: &Buffer,
        key_info: &Buffer,
        plaintext: &Buffer,
        connection_id: &str,
    ) -> Result<Buffer> {
        tks::check(
            self.services
                .tks
                .encrypt_data(cuid, key_info, plaintext, connection_id),
            "data encryption",
        )
    }
}

/// Set the record's applet id from the identity when an applet answered
pub fn fill_token_record(record: &mut TokenRecord, identity: &TokenIdentity, build_id: Option<&Buffer>) {
    if let Some(build_id) = build_id {
        record.applet_id = Some(identity.applet_version(build_id));
    }
}

/// Replace the single `$name$` placeholder in `pattern` with `values[name]`
///
/// Patterns without a placeholder are returned unchanged.
pub fn map_pattern(values: &BTreeMap<String, String>, pattern: &str) -> Result<String> {
    let Some((head, rest)) = pattern.split_once('$') else {
        return Ok(pattern.to_owned());
    };
    let Some((name, tail)) = rest.split_once('$').filter(|(name, _)| !name.is_empty()) else {
        return Ok(pattern.to_owned());
    };
    let value = values
        .get(name)
        .ok_or_else(|| Error::misconfiguration(format!("no value for pattern ${name}$")))?;
    Ok(format!("{head}{value}{tail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_pattern() {
        let values = BTreeMap::from([("userid".to_owned(), "alice".to_owned())]);
        assert_eq!(
            map_pattern(&values, "encryption key for $userid$").unwrap(),
            "encryption key for alice"
        );
        assert_eq!(map_pattern(&values, "$userid$-key").unwrap(), "alice-key");
        assert_eq!(map_pattern(&values, "no placeholder").unwrap(), "no placeholder");
        assert_eq!(map_pattern(&values, "cost $$ 5").unwrap(), "cost $$ 5");
        assert_eq!(
            map_pattern(&values, "$cn$").unwrap_err().kind(),
            ErrorKind::Misconfiguration
        );
    }

    #[test]
    fn test_fill_token_record() {
        let identity = TokenIdentity {
            cuid: Buffer::from([0x40u8]),
            msn: Buffer::from([0x01u8]),
            status: tps_globalplatform::TokenStatus {
                app_major_version: 1,
                app_minor_version: 4,
                ..Default::default()
            },
        };
        let mut record = TokenRecord::new("40");
        fill_token_record(&mut record, &identity, None);
        assert_eq!(record.applet_id, None);
        fill_token_record(&mut record, &identity, Some(&Buffer::from([0x4Au8, 0x5F, 0x01, 0x02])));
        assert_eq!(record.applet_id.as_deref(), Some("1.4.4a5f0102"));
    }
}
