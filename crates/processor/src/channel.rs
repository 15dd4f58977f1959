//! Secure channel setup and symmetric key rotation
//!
//! Opening a channel runs the host side of the SCP02 handshake: a host
//! challenge from the key service, INITIALIZE UPDATE, session keys from the
//! key service, and a local unwrap under the shared secret. The returned
//! channel is not yet authenticated; callers run EXTERNAL AUTHENTICATE once
//! they have looked at the key information.
//!
//! Key rotation probes the card with the required key version. The token has
//! no other way to report which key set it holds, so a failed probe means
//! the factory keys are still installed and must be replaced.

use tps_apdu_core::{Buffer, CardTransport, CardTransportExt};
use tps_globalplatform::{
    HandshakeData, InitializeUpdateCommand, SecureChannel, SecurityLevel, SelectCommand,
    SessionKeys, crypto::key_from_slice,
};
use tracing::{debug, info, instrument, warn};

use crate::config::{OperationConfig, ProfileConfig};
use crate::error::{Error, ErrorKind, Result, TpsStatus};
use crate::keystore::SymmetricKeyStore;
use crate::registry::TokenRecord;
use crate::tks::{self, KeyDerivationClient, SessionKeyRequest};

const HOST_CHALLENGE_LEN: usize = 8;

/// Result of a handshake attempt with a specific key version
#[derive(Debug)]
pub enum ChannelOutcome {
    /// The card holds the requested keys
    Established(SecureChannel),
    /// The card rejected the requested keys
    RotationRequired {
        /// Why the handshake failed
        reason: Error,
    },
}

/// Opens secure channels for one token type
#[derive(Debug, Clone, Copy)]
pub struct ChannelFactory<'a> {
    tks: &'a dyn KeyDerivationClient,
    keys: &'a dyn SymmetricKeyStore,
    op: &'a OperationConfig,
    profile: &'a ProfileConfig,
}

impl<'a> ChannelFactory<'a> {
    /// Factory using the profile's key service connection and shared secret
    pub const fn new(
        tks: &'a dyn KeyDerivationClient,
        keys: &'a dyn SymmetricKeyStore,
        op: &'a OperationConfig,
        profile: &'a ProfileConfig,
    ) -> Self {
        Self { tks, keys, op, profile }
    }

    /// Run the handshake for `key_version`/`key_index`
    #[instrument(skip(self, transport), fields(token_type = %self.profile.token_type))]
    pub fn open(
        &self,
        transport: &mut dyn CardTransport,
        key_version: u8,
        key_index: u8,
        level: SecurityLevel,
    ) -> Result<SecureChannel> {
        let conn = self.profile.tks_conn.as_str();

        let host_challenge = tks::check(
            self.tks.compute_random_data(HOST_CHALLENGE_LEN, conn),
            "random data",
        )?;
        if host_challenge.len() != HOST_CHALLENGE_LEN {
            return Err(Error::secure_channel(format!(
                "host challenge must be {HOST_CHALLENGE_LEN} bytes, got {}",
                host_challenge.len()
            )));
        }

        let command = InitializeUpdateCommand::new(key_version, key_index, &host_challenge)
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "initialize update", e))?;
        let card = transport
            .transmit(&command)
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "initialize update", e))?;
        debug!(
            key_info = %card.key_info,
            diversification_data = %card.diversification_data,
            "Initialize update"
        );

        let response = self
            .tks
            .compute_session_key(&SessionKeyRequest {
                diversification_data: &card.diversification_data,
                key_info: &card.key_info,
                card_challenge: &card.card_challenge,
                host_challenge: &host_challenge,
                card_cryptogram: &card.card_cryptogram,
                connection_id: conn,
                token_type: &self.profile.token_type,
            })
            .map_err(|e| Error::secure_channel(format!("session key computation failed: {e}")))?;
        if response.status != 0 {
            return Err(Error::secure_channel(format!(
                "session key computation failed with status {}",
                response.status
            )));
        }
        if response.host_cryptogram.is_empty() {
            return Err(Error::secure_channel("no host cryptogram returned"));
        }

        let keys = self.unwrap_session_keys(&response.session_key, &response.enc_session_key)?;

        if self.profile.server_keygen {
            debug!(
                transport_key = response.drm_trans_key.is_some(),
                kek_wrapped_key = response.kek_wrapped_key.is_some(),
                key_check = response.key_check.is_some(),
                "Server side key generation material"
            );
        }

        let handshake = HandshakeData::new(card, host_challenge, response.host_cryptogram);
        Ok(SecureChannel::new(keys, handshake, level))
    }

    /// Open and authenticate a channel with the factory key set
    pub fn open_default(&self, transport: &mut dyn CardTransport) -> Result<SecureChannel> {
        let mut channel = self.open(
            transport,
            self.op.default_key_version,
            self.op.default_key_index,
            SecurityLevel::default(),
        )?;
        external_authenticate(&mut channel, transport)?;
        Ok(channel)
    }

    /// Try the required key version without falling back
    pub fn probe(&self, transport: &mut dyn CardTransport, key_version: u8) -> Result<ChannelOutcome> {
        match self.open(transport, key_version, self.op.default_key_index, SecurityLevel::default()) {
            Ok(channel) => Ok(ChannelOutcome::Established(channel)),
            Err(e) if e.status() == TpsStatus::Connection => Err(e),
            Err(reason) => Ok(ChannelOutcome::RotationRequired { reason }),
        }
    }

    /// Make sure the card holds the required key set and return a channel
    /// opened with it
    ///
    /// With rotation disabled the channel uses the factory key set. The
    /// returned channel still needs EXTERNAL AUTHENTICATE.
    #[instrument(skip_all, fields(cuid = %record.id))]
    pub fn upgrade_symmetric_keys(
        &self,
        transport: &mut dyn CardTransport,
        record: &mut TokenRecord,
    ) -> Result<SecureChannel> {
        if !self.profile.symmetric_keys_enabled {
            debug!("Key change over disabled");
            return self.open(
                transport,
                self.op.default_key_version,
                self.op.default_key_index,
                SecurityLevel::default(),
            );
        }

        let required = self.profile.symmetric_keys_required_version;
        let reason = match self.probe(transport, required)? {
            ChannelOutcome::Established(channel) => {
                debug!(version = required, "Token already holds the required keys");
                return Ok(channel);
            }
            ChannelOutcome::RotationRequired { reason } => reason,
        };
        info!(version = required, %reason, "Required keys absent, rotating");

        select(transport, &self.op.card_manager_aid)
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "select card manager", e))?;
        let mut channel = self.open_default(transport)?;

        let new_key_info = Buffer::from([required, 0x01]);
        let current_key_info = channel.key_info().clone();
        let key_set = tks::check(
            self.tks.create_key_set_data(
                &new_key_info,
                &current_key_info,
                channel.diversification_data(),
                &self.profile.tks_conn,
            ),
            "key set creation",
        )?;

        channel
            .put_keys(transport, &current_key_info, &key_set)
            .map_err(|e| {
                Error::card(ErrorKind::SecureChannel, "put key", e)
                    .with_status(TpsStatus::KeyChangeOver)
            })?;
        channel.supersede();
        record.key_info = Some(new_key_info.to_hex_plain());
        info!(from = %current_key_info, to = %new_key_info, "Symmetric keys replaced");

        select(transport, &self.op.applet_aid)
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "select applet", e))?;
        self.open(transport, required, self.op.default_key_index, SecurityLevel::default())
    }

    fn unwrap_session_keys(&self, wrapped_mac: &Buffer, wrapped_enc: &Buffer) -> Result<SessionKeys> {
        let name = self.profile.shared_secret_name.as_str();
        if !self.keys.key_names().iter().any(|n| n == name) {
            return Err(Error::secure_channel(format!("shared secret {name} not found")));
        }
        let secret = self
            .keys
            .key(name)
            .ok_or_else(|| Error::secure_channel(format!("shared secret {name} not found")))?;
        let secret = key_from_slice(&secret)
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "shared secret", e))?;
        SessionKeys::unwrap(&secret, wrapped_mac, wrapped_enc)
            .map_err(|e| Error::card(ErrorKind::SecureChannel, "session key unwrap", e))
    }
}

/// EXTERNAL AUTHENTICATE; rejection is reported as an external auth failure
pub fn external_authenticate(
    channel: &mut SecureChannel,
    transport: &mut dyn CardTransport,
) -> Result<()> {
    channel.external_authenticate(transport).map_err(|e| {
        let error = Error::card(ErrorKind::SecureChannel, "external authenticate", e);
        if error.status() == TpsStatus::Connection {
            error
        } else {
            warn!(%error, "External authenticate rejected");
            error.with_status(TpsStatus::ExternalAuth)
        }
    })
}

/// SELECT by AID
pub(crate) fn select(transport: &mut dyn CardTransport, aid: &Buffer) -> tps_globalplatform::Result<()> {
    transport.transmit(&SelectCommand::with_aid(aid.clone()))
}
