//! Token processing system
//!
//! Drives a security token through lifecycle operations from the server
//! side. The token is reached through a terminal session that relays APDUs
//! and holder prompts; keys come from an external key service and
//! certificates are revoked through a certificate authority.
//!
//! The entry point is [`TokenProcessor`]. A format operation:
//!
//! 1. reads the token identity and registry entry
//! 2. resolves the token type and profile, and authenticates the holder
//! 3. checks the token is allowed to return to the uninitialized state
//! 4. upgrades the applet and writes issuer info
//! 5. rotates the symmetric keys when the card does not hold the required set
//! 6. revokes the token's certificates and persists the record
//!
//! All collaborators sit behind traits ([`KeyDerivationClient`],
//! [`CertificateAuthority`], [`TokenRegistry`], [`ProfileResolver`],
//! [`Authenticator`], [`ConfigStore`], [`SymmetricKeyStore`]) so that
//! deployments and tests supply their own.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod applet;
pub mod auth;
pub mod authority;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod processor;
pub mod registry;
pub mod resolver;
pub mod revocation;
pub mod session;
pub mod tks;

pub use applet::{AppletInstaller, AppletTarget};
pub use auth::{AuthToken, Authenticator, AuthenticatorRegistry, Credentials};
pub use authority::{CertificateAuthority, RevocationReason, RevocationResponse};
pub use channel::{ChannelFactory, ChannelOutcome};
pub use config::{ConfigStore, OperationConfig, ProfileConfig, TpsConfig};
pub use context::{BeginOperation, Operation, OperationContext};
pub use error::{Error, ErrorKind, Result, ServiceError, TpsStatus};
pub use identity::TokenIdentity;
pub use keystore::{MemoryKeyStore, SymmetricKeyStore};
pub use processor::{Services, TokenProcessor};
pub use registry::{
    ActivityEntry, ActivityOutcome, CertRecord, MemoryRegistry, TokenRecord, TokenRegistry,
    TokenStatus, TransitionPolicy,
};
pub use resolver::{MappingResolver, ProfileResolver, ResolverParams, ResolverRegistry};
pub use revocation::RevocationSweep;
pub use session::{Message, SessionError, SessionTransport, TokenSession};
pub use tks::{KeyDerivationClient, SessionKeyRequest, SessionKeyResponse, Status};
