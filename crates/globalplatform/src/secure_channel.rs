//! SCP02 secure channel
//!
//! A [`SecureChannel`] is built from unwrapped session keys and the values
//! exchanged by INITIALIZE UPDATE. It starts in [`ChannelState::KeysComputed`]
//! and only accepts protected commands once EXTERNAL AUTHENTICATE succeeds.

use std::fmt;
use std::ops::Range;

use bytes::{BufMut, BytesMut};
use cipher::{Iv, Key};
use derive_more::Display;
use tps_apdu_core::{ApduCommand, Buffer, CardTransport, Command};
use tracing::{debug, instrument, trace};

use crate::commands::{
    DeleteCommand, DeleteOutcome, ExternalAuthenticateCommand, InstallCommand, LoadCommand,
    PutKeyCommand, SetIssuerInfoCommand,
};
use crate::constants::{cla, param, sizes};
use crate::crypto::{BLOCK, Scp02, encrypt_data_field, encrypt_icv, retail_mac};
use crate::load::LoadFile;
use crate::session::{HandshakeData, SessionKeys};
use crate::{Error, Result};

/// Lifecycle of a secure channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChannelState {
    /// Session keys are known; EXTERNAL AUTHENTICATE has not succeeded yet
    #[display("keys computed")]
    KeysComputed,
    /// Mutual authentication completed
    #[display("authenticated")]
    Authenticated,
    /// Replaced by a newer channel
    #[display("superseded")]
    Superseded,
}

/// Protection applied to commands after authentication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecurityLevel {
    /// C-MAC only
    Mac,
    /// C-MAC and command data encryption
    #[default]
    MacEnc,
}

impl SecurityLevel {
    /// EXTERNAL AUTHENTICATE P1 for this level
    pub const fn p1(self) -> u8 {
        match self {
            Self::Mac => param::LEVEL_CMAC,
            Self::MacEnc => param::LEVEL_CMAC_ENC,
        }
    }

    /// Whether command data is encrypted
    pub const fn encrypts(self) -> bool {
        matches!(self, Self::MacEnc)
    }
}

/// Applies the SCP02 C-MAC to outgoing commands and tracks the ICV chain
#[derive(Clone)]
pub struct CommandWrapper {
    mac_key: Key<Scp02>,
    icv: Iv<Scp02>,
}

impl fmt::Debug for CommandWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandWrapper")
            .field("icv", &hex::encode(self.icv))
            .finish_non_exhaustive()
    }
}

impl CommandWrapper {
    /// Start a chain with a zero ICV
    pub fn new(mac_key: Key<Scp02>) -> Self {
        Self { mac_key, icv: Iv::<Scp02>::default() }
    }

    /// Set the secure messaging bit and append the C-MAC
    ///
    /// The MAC covers the modified header, Lc counting the MAC, and the plain
    /// data. With `enc_key` the data field is then encrypted.
    pub fn wrap(&mut self, command: &Command, enc_key: Option<&Key<Scp02>>) -> Result<Command> {
        let plain = command.data.as_deref().unwrap_or_default();
        let header = [
            command.cla | cla::SECURE_MESSAGING,
            command.ins,
            command.p1,
            command.p2,
            (plain.len() + sizes::MAC) as u8,
        ];
        let mut mac_input = BytesMut::with_capacity(header.len() + plain.len());
        mac_input.put_slice(&header);
        mac_input.put_slice(plain);

        // zero ICV on the first command of a session
        let chain = if self.icv == Iv::<Scp02>::default() {
            self.icv
        } else {
            encrypt_icv(&self.mac_key, &self.icv)
        };
        let mac = retail_mac(&self.mac_key, &chain, &mac_input);
        self.icv = mac.into();

        let mut data = BytesMut::with_capacity(plain.len() + BLOCK + sizes::MAC);
        match enc_key {
            Some(key) if !plain.is_empty() => data.put_slice(&encrypt_data_field(key, plain)),
            _ => data.put_slice(plain),
        }
        data.put_slice(&mac);

        let wrapped = Command { cla: header[0], data: Some(data.freeze()), ..command.clone() };
        wrapped.validate()?;
        Ok(wrapped)
    }

    /// ICV for the next command, the last C-MAC
    pub const fn icv(&self) -> &Iv<Scp02> {
        &self.icv
    }
}

/// An SCP02 channel to the currently selected security domain
pub struct SecureChannel {
    keys: SessionKeys,
    handshake: HandshakeData,
    wrapper: CommandWrapper,
    level: SecurityLevel,
    state: ChannelState,
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("key_info", &self.handshake.key_info)
            .field("level", &self.level)
            .field("state", &self.state)
            .finish()
    }
}

impl SecureChannel {
    /// Create a channel in the [`ChannelState::KeysComputed`] state
    pub fn new(keys: SessionKeys, handshake: HandshakeData, level: SecurityLevel) -> Self {
        let wrapper = CommandWrapper::new(*keys.mac());
        Self {
            keys,
            handshake,
            wrapper,
            level,
            state: ChannelState::KeysComputed,
        }
    }

    /// Current lifecycle state
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether protected commands may be sent
    pub fn is_authenticated(&self) -> bool {
        self.state == ChannelState::Authenticated
    }

    /// Key version and index reported by the card
    pub const fn key_info(&self) -> &Buffer {
        &self.handshake.key_info
    }

    /// Key diversification data reported by the card
    pub const fn diversification_data(&self) -> &Buffer {
        &self.handshake.diversification_data
    }

    /// All handshake values
    pub const fn handshake(&self) -> &HandshakeData {
        &self.handshake
    }

    /// Security level negotiated by EXTERNAL AUTHENTICATE
    pub const fn security_level(&self) -> SecurityLevel {
        self.level
    }

    /// Complete mutual authentication by presenting the host cryptogram
    #[instrument(skip_all, fields(key_info = %self.handshake.key_info))]
    pub fn external_authenticate(&mut self, transport: &mut dyn CardTransport) -> Result<()> {
        if self.state == ChannelState::Superseded {
            return Err(Error::NotAuthenticated(self.state));
        }

        let command =
            ExternalAuthenticateCommand::new(self.level.p1(), &self.handshake.host_cryptogram);
        let wrapped = self.wrapper.wrap(command.command(), None)?;
        let response = transport.transmit_raw(&wrapped.to_bytes())?;
        ExternalAuthenticateCommand::parse_response_raw(&response)?;

        self.state = ChannelState::Authenticated;
        debug!(level = ?self.level, "Secure channel authenticated");
        Ok(())
    }

    /// Mark the channel as replaced; it accepts no further commands
    pub fn supersede(&mut self) {
        debug!("Secure channel superseded");
        self.state = ChannelState::Superseded;
    }

    /// Wrap and send a command, then parse its response
    pub fn send<C>(&mut self, transport: &mut dyn CardTransport, command: &C) -> Result<C::Success>
    where
        C: ApduCommand<Error = Error>,
    {
        if !self.is_authenticated() {
            return Err(Error::NotAuthenticated(self.state));
        }

        let enc_key = self.level.encrypts().then(|| self.keys.enc());
        let wrapped = self.wrapper.wrap(command.command(), enc_key)?;
        trace!(command = ?wrapped, "Command wrapped with MAC");

        let response = transport.transmit_raw(&wrapped.to_bytes())?;
        C::parse_response_raw(&response)
    }

    /// Largest plain data field a protected command can carry
    pub const fn max_data_len(&self, apdu_data_len: usize) -> usize {
        let overhead = if self.level.encrypts() {
            sizes::MAC + BLOCK
        } else {
            sizes::MAC
        };
        apdu_data_len.saturating_sub(overhead)
    }

    /// Delete an applet instance or package; absence is not an error
    pub fn delete_file(&mut self, transport: &mut dyn CardTransport, aid: &[u8]) -> Result<DeleteOutcome> {
        let outcome = self.send(transport, &DeleteCommand::with_aid(aid))?;
        debug!(aid = %hex::encode_upper(aid), ?outcome, "Delete");
        Ok(outcome)
    }

    /// INSTALL [for load] for a package of `length` bytes
    pub fn install_load(
        &mut self,
        transport: &mut dyn CardTransport,
        package_aid: &[u8],
        security_domain_aid: &[u8],
        length: usize,
    ) -> Result<()> {
        let length = u16::try_from(length).map_err(|_| Error::InvalidFormat("package too large"))?;
        self.send(
            transport,
            &InstallCommand::for_load(package_aid, security_domain_aid, length),
        )
    }

    /// Stream a package in LOAD blocks
    ///
    /// `block_size` bounds the whole APDU data field, so each block carries
    /// that much less the MAC and padding overhead. `on_progress` receives a
    /// percentage within `progress` after each block, whenever it changes,
    /// together with the transport so it can talk to the same client.
    pub fn load_file<T, E>(
        &mut self,
        transport: &mut T,
        package: &[u8],
        block_size: usize,
        progress: Range<u8>,
        mut on_progress: impl FnMut(&mut T, u8) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E>
    where
        T: CardTransport,
        E: From<Error>,
    {
        let file = LoadFile::new(package, self.max_data_len(block_size))?;
        let total = file.block_count();
        let span = usize::from(progress.end.saturating_sub(progress.start));
        let mut reported = None;

        for block in file.blocks() {
            self.send(&mut *transport, &LoadCommand::block(block.last, block.number, &block.data))?;

            let done = usize::from(block.number) + 1;
            let percent = progress.start + (span * done / total) as u8;
            if reported != Some(percent) {
                on_progress(transport, percent)?;
                reported = Some(percent);
            }
        }

        debug!(blocks = total, bytes = package.len(), "Load complete");
        Ok(())
    }

    /// INSTALL [for install and make selectable]
    pub fn install_applet(
        &mut self,
        transport: &mut dyn CardTransport,
        package_aid: &[u8],
        applet_aid: &[u8],
        privileges: u8,
        instance_size: u16,
        memory_size: u16,
    ) -> Result<()> {
        self.send(
            transport,
            &InstallCommand::for_install_and_make_selectable(
                package_aid,
                applet_aid,
                privileges,
                instance_size,
                memory_size,
            ),
        )
    }

    /// Replace the card's key set identified by `current_key_info`
    pub fn put_keys(
        &mut self,
        transport: &mut dyn CardTransport,
        current_key_info: &[u8],
        key_set: &[u8],
    ) -> Result<()> {
        let [version, index, ..] = *current_key_info else {
            return Err(Error::InvalidLength {
                expected: 2,
                actual: current_key_info.len(),
            });
        };
        self.send(transport, &PutKeyCommand::replace(version, index, key_set))
    }

    /// Write issuer information to the token applet
    pub fn set_issuer_info(&mut self, transport: &mut dyn CardTransport, info: &[u8]) -> Result<()> {
        self.send(transport, &SetIssuerInfoCommand::new(info)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hex_literal::hex;
    use tps_apdu_core::TransportError;

    use crate::commands::InitializeUpdateData;

    #[derive(Debug)]
    struct RecordingTransport {
        commands: Vec<Vec<u8>>,
        responses: Vec<Bytes>,
    }

    impl RecordingTransport {
        fn with_response(response: &[u8]) -> Self {
            Self {
                commands: Vec::new(),
                responses: vec![Bytes::copy_from_slice(response)],
            }
        }
    }

    impl CardTransport for RecordingTransport {
        fn transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError> {
            self.commands.push(command.to_vec());

            match self.responses.len() {
                0 => Err(TransportError::session("no scripted response")),
                1 => Ok(self.responses[0].clone()),
                _ => Ok(self.responses.remove(0)),
            }
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn create_test_channel(level: SecurityLevel) -> SecureChannel {
        let card = InitializeUpdateData::parse(&hex!(
            "000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce4"
        ))
        .unwrap();
        let handshake = HandshakeData::new(
            card,
            Buffer::from(hex!("f0467f908e5ca23f")),
            Buffer::from(hex!("1d4de92eaf7a2c9f")),
        );
        let keys = SessionKeys::new(
            hex!("2983ba77d709c2daa1e6000abccac951"),
            hex!("404142434445464748494a4b4c4d4e4f"),
        );
        SecureChannel::new(keys, handshake, level)
    }

    #[test]
    fn wrap_chains_icv_from_previous_mac() {
        let mac_key = Key::<Scp02>::clone_from_slice(&hex!("2983ba77d709c2daa1e6000abccac951"));
        let mut wrapper = CommandWrapper::new(mac_key);

        assert_eq!(wrapper.icv(), &Iv::<Scp02>::default());

        let cmd = Command::new_with_data(0x80, 0x82, 0x01, 0x00, hex!("1d4de92eaf7a2c9f").to_vec());
        let wrapped = wrapper.wrap(&cmd, None).unwrap();
        assert_eq!(
            wrapped.to_bytes().as_ref(),
            hex!("84820100101d4de92eaf7a2c9f8f9b0df681c1d3ec")
        );
        assert_eq!(wrapper.icv().as_slice(), hex!("8f9b0df681c1d3ec"));

        let cmd = Command::new_with_data(0x80, 0xF2, 0x80, 0x02, hex!("4f00").to_vec()).with_le(0);
        let wrapped = wrapper.wrap(&cmd, None).unwrap();
        assert_eq!(wrapped.to_bytes().as_ref(), hex!("84f280020a4f0030f149209e17b39700"));
    }

    #[test]
    fn wrap_encrypts_data_but_macs_plaintext() {
        let key = Key::<Scp02>::clone_from_slice(&hex!("2983ba77d709c2daa1e6000abccac951"));
        let enc = Key::<Scp02>::clone_from_slice(&hex!("404142434445464748494a4b4c4d4e4f"));

        let cmd = Command::new_with_data(0x80, 0xE4, 0x00, 0x00, hex!("4f06627601ff0000").to_vec());
        let plain = CommandWrapper::new(key).wrap(&cmd, None).unwrap();
        let secret = CommandWrapper::new(key).wrap(&cmd, Some(&enc)).unwrap();

        // 8 data bytes pad to 16, plus the MAC
        assert_eq!(secret.data.as_ref().map(|d| d.len()), Some(24));
        // Same MAC either way
        assert_eq!(
            &plain.data.as_ref().unwrap()[8..],
            &secret.data.as_ref().unwrap()[16..]
        );
    }

    #[test]
    fn test_protected_command_requires_authentication() {
        let mut transport = RecordingTransport::with_response(&hex!("9000"));
        let mut channel = create_test_channel(SecurityLevel::Mac);

        let result = channel.delete_file(&mut transport, &hex!("627601FF0000"));
        assert!(matches!(
            result,
            Err(Error::NotAuthenticated(ChannelState::KeysComputed))
        ));
        assert!(transport.commands.is_empty());
    }

    #[test]
    fn test_authenticate() {
        let mut transport = RecordingTransport::with_response(&hex!("9000"));
        let mut channel = create_test_channel(SecurityLevel::Mac);

        channel.external_authenticate(&mut transport).unwrap();
        assert!(channel.is_authenticated());
        assert_eq!(
            transport.commands[0],
            hex!("84820100101d4de92eaf7a2c9f8f9b0df681c1d3ec")
        );

        let outcome = channel.delete_file(&mut transport, &hex!("627601FF0000")).unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(transport.commands[1][0], 0x84);
        assert_eq!(transport.commands[1][1], 0xE4);
    }

    #[test]
    fn test_authenticate_rejected() {
        let mut transport = RecordingTransport::with_response(&hex!("6300"));
        let mut channel = create_test_channel(SecurityLevel::MacEnc);

        assert!(matches!(
            channel.external_authenticate(&mut transport),
            Err(Error::AuthenticationFailed(_))
        ));
        assert_eq!(channel.state(), ChannelState::KeysComputed);
        assert_eq!(transport.commands[0][2], 0x03);
    }

    #[test]
    fn test_superseded_channel_rejects_commands() {
        let mut transport = RecordingTransport::with_response(&hex!("9000"));
        let mut channel = create_test_channel(SecurityLevel::Mac);
        channel.external_authenticate(&mut transport).unwrap();
        channel.supersede();

        assert!(channel.set_issuer_info(&mut transport, b"issuer").is_err());
        assert!(channel.external_authenticate(&mut transport).is_err());
        assert_eq!(transport.commands.len(), 1);
    }

    #[test]
    fn test_load_file_reports_progress() {
        let mut transport = RecordingTransport::with_response(&hex!("9000"));
        let mut channel = create_test_channel(SecurityLevel::MacEnc);
        channel.external_authenticate(&mut transport).unwrap();

        let package = vec![0x5Au8; 1000];
        let mut seen = Vec::new();
        channel
            .load_file::<_, Error>(&mut transport, &package, 248, 10..90, |_, p| {
                seen.push(p);
                Ok(())
            })
            .unwrap();

        // 1004 bytes in 232-byte blocks
        assert_eq!(transport.commands.len(), 1 + 5);
        assert_eq!(seen.last(), Some(&90));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        let last = &transport.commands[5];
        assert_eq!(&last[..4], &[0x84, 0xE8, 0x80, 0x04]);
        assert!(transport.commands[1..].iter().all(|c| c.len() <= 5 + 248));
    }

    #[test]
    fn test_put_keys_needs_key_info() {
        let mut transport = RecordingTransport::with_response(&hex!("9000"));
        let mut channel = create_test_channel(SecurityLevel::Mac);
        channel.external_authenticate(&mut transport).unwrap();

        assert!(channel.put_keys(&mut transport, &hex!("01"), &hex!("AABB")).is_err());
        channel.put_keys(&mut transport, &hex!("FF01"), &hex!("AABB")).unwrap();
        assert_eq!(&transport.commands[1][..4], &[0x84, 0xD8, 0x00, 0x81]);
    }
}
