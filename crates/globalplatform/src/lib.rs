//! GlobalPlatform commands and the SCP02 secure channel for token processing
//!
//! This crate provides the typed command APDUs used to identify a token and
//! manage its applets, parsing of the card data they return, and the
//! [`SecureChannel`] that protects card management commands once the
//! handshake completes.
//!
//! Key material is never derived here: session keys arrive from an external
//! key service wrapped under a shared secret and are unwrapped with
//! [`SessionKeys::unwrap`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod card;
pub mod commands;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod load;
pub mod secure_channel;
pub mod session;

pub use card::{CplcData, TokenStatus};
pub use commands::{
    DeleteCommand, DeleteOutcome, ExternalAuthenticateCommand, GetDataCommand, GetStatusCommand,
    GetVersionCommand, InitializeUpdateCommand, InitializeUpdateData, InstallCommand,
    ListObjectsCommand, LoadCommand, PutKeyCommand, SelectCommand, SetIssuerInfoCommand,
};
pub use error::{Error, Result};
pub use load::{LoadBlock, LoadFile};
pub use secure_channel::{ChannelState, CommandWrapper, SecureChannel, SecurityLevel};
pub use session::{HandshakeData, SessionKeys};
