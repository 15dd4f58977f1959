//! Token registry: token and certificate records plus the activity log
//!
//! The registry is the system of record across operations. A processor
//! reads a [`TokenRecord`] at the start of an operation, owns it until the
//! end, and writes it back once.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use derive_more::Display;
use parking_lot::{Mutex, RwLock};
use tps_apdu_core::Buffer;
use tracing::debug;

use crate::config::ConfigStore;
use crate::context::{Operation, OperationContext};
use crate::error::{Error, Result, ServiceError};

/// Token lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum TokenStatus {
    /// Formatted and ready for enrollment
    #[default]
    #[display("uninitialized")]
    Uninitialized,
    /// Formatted by an administrator
    #[display("formatted")]
    Formatted,
    /// Enrolled and in use
    #[display("active")]
    Active,
    /// Temporarily suspended
    #[display("suspended")]
    Suspended,
    /// Reported lost
    #[display("lost")]
    Lost,
    /// Reported damaged
    #[display("damaged")]
    Damaged,
    /// Permanently disabled
    #[display("disabled")]
    Disabled,
}

impl TokenStatus {
    /// All statuses
    pub const ALL: [Self; 7] = [
        Self::Uninitialized,
        Self::Formatted,
        Self::Active,
        Self::Suspended,
        Self::Lost,
        Self::Damaged,
        Self::Disabled,
    ];
}

impl FromStr for TokenStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::misconfiguration(format!("unknown token status {s}")))
    }
}

/// Persistent token entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRecord {
    /// CUID as upper-case hex
    pub id: String,
    /// Resolved token type
    pub token_type: Option<String>,
    /// Lifecycle status
    pub status: TokenStatus,
    /// Current key version and index as hex
    pub key_info: Option<String>,
    /// Applet version string
    pub applet_id: Option<String>,
    /// Last authenticated holder
    pub user_id: Option<String>,
    /// Reason for the last status change
    pub reason: Option<String>,
}

impl TokenRecord {
    /// Fresh record for a token never seen before
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Certificate stored for a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRecord {
    /// Record id
    pub id: String,
    /// Serial number as `0x`-prefixed hex
    pub serial: String,
    /// `active`, `revoked` or `revoked_on_hold`
    pub status: String,
    /// CUID of the token the certificate was issued to
    pub origin: Option<String>,
    /// CUID of the token holding the certificate
    pub token_id: String,
    /// DER certificate
    pub certificate: Buffer,
}

impl CertRecord {
    /// Whether the certificate is already revoked
    pub fn is_revoked(&self) -> bool {
        self.status == "revoked"
    }

    /// Whether the certificate is on hold
    pub fn is_on_hold(&self) -> bool {
        self.status == "revoked_on_hold"
    }
}

/// Outcome recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ActivityOutcome {
    /// The step succeeded
    #[display("success")]
    Success,
    /// The step failed
    #[display("failure")]
    Failure,
}

/// One activity log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    /// Operation that produced the entry
    pub operation: Operation,
    /// Token id, when known
    pub token_id: Option<String>,
    /// Holder, when known
    pub user_id: Option<String>,
    /// Terminal client address
    pub client_address: String,
    /// Human readable message
    pub message: String,
    /// Outcome
    pub outcome: ActivityOutcome,
}

impl ActivityEntry {
    /// Entry for the current operation without token details
    pub fn new(ctx: &OperationContext, message: impl Into<String>, outcome: ActivityOutcome) -> Self {
        Self {
            operation: ctx.operation,
            token_id: None,
            user_id: None,
            client_address: ctx.client_address.clone(),
            message: message.into(),
            outcome,
        }
    }

    /// Attach the token id and holder of `record`
    #[must_use]
    pub fn with_record(mut self, record: &TokenRecord) -> Self {
        self.token_id = Some(record.id.clone());
        self.user_id.clone_from(&record.user_id);
        self
    }

    /// Attach a token id when no record is available
    #[must_use]
    pub fn with_token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }
}

/// Which status changes the registry accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPolicy {
    allowed: BTreeSet<(TokenStatus, TokenStatus)>,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        use TokenStatus::*;

        let mut allowed: BTreeSet<_> = TokenStatus::ALL
            .into_iter()
            .filter(|from| *from != Disabled)
            .map(|from| (from, Uninitialized))
            .collect();
        allowed.extend([
            (Uninitialized, Active),
            (Uninitialized, Formatted),
            (Active, Suspended),
            (Active, Lost),
            (Active, Damaged),
            (Active, Disabled),
            (Suspended, Active),
            (Suspended, Disabled),
        ]);
        Self { allowed }
    }
}

impl TransitionPolicy {
    /// Parse comma separated `from:to` status pairs
    pub fn parse(text: &str) -> Result<Self> {
        let mut allowed = BTreeSet::new();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (from, to) = pair.split_once(':').ok_or_else(|| {
                Error::misconfiguration(format!("invalid transition {pair}"))
            })?;
            allowed.insert((from.parse()?, to.parse()?));
        }
        Ok(Self { allowed })
    }

    /// Policy from `tokendb.allowedTransitions`, or the default when unset
    pub fn from_config(config: &dyn ConfigStore) -> Result<Self> {
        config
            .get_string("tokendb.allowedTransitions")
            .map_or_else(|| Ok(Self::default()), |text| Self::parse(&text))
    }

    /// Whether `from` may change to `to`
    pub fn allows(&self, from: TokenStatus, to: TokenStatus) -> bool {
        self.allowed.contains(&(from, to))
    }
}

/// Record store for tokens, certificates and activity
pub trait TokenRegistry: Send + Sync + fmt::Debug {
    /// Token by CUID
    fn get_token_entry(&self, cuid: &str) -> std::result::Result<Option<TokenRecord>, ServiceError>;

    /// Create or replace a token entry
    fn update_token_entry(&self, record: &TokenRecord) -> std::result::Result<(), ServiceError>;

    /// Whether `record` may move to `new_status`
    fn is_transition_allowed(&self, record: &TokenRecord, new_status: TokenStatus) -> bool;

    /// Whether a token with this CUID is registered
    fn is_token_present(&self, cuid: &str) -> bool;

    /// Certificates held by the token
    fn get_certificates_by_cuid(&self, cuid: &str) -> std::result::Result<Vec<CertRecord>, ServiceError>;

    /// Delete a certificate record
    fn remove_cert_record(&self, id: &str) -> std::result::Result<(), ServiceError>;

    /// Append to the activity log
    fn log_activity(&self, entry: ActivityEntry);
}

/// In-memory registry
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    tokens: RwLock<BTreeMap<String, TokenRecord>>,
    certs: RwLock<BTreeMap<String, CertRecord>>,
    activity: Mutex<Vec<ActivityEntry>>,
    policy: TransitionPolicy,
}

impl MemoryRegistry {
    /// Empty registry with the default transition policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry with a custom transition policy
    pub fn with_policy(policy: TransitionPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Seed a token entry
    pub fn insert_token(&self, record: TokenRecord) {
        self.tokens.write().insert(record.id.clone(), record);
    }

    /// Seed a certificate record
    pub fn insert_cert(&self, record: CertRecord) {
        self.certs.write().insert(record.id.clone(), record);
    }

    /// Snapshot of the activity log
    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.activity.lock().clone()
    }

    /// Number of stored certificate records
    pub fn cert_count(&self) -> usize {
        self.certs.read().len()
    }
}

impl TokenRegistry for MemoryRegistry {
    fn get_token_entry(&self, cuid: &str) -> std::result::Result<Option<TokenRecord>, ServiceError> {
        Ok(self.tokens.read().get(cuid).cloned())
    }

    fn update_token_entry(&self, record: &TokenRecord) -> std::result::Result<(), ServiceError> {
        self.tokens.write().insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn is_transition_allowed(&self, record: &TokenRecord, new_status: TokenStatus) -> bool {
        self.policy.allows(record.status, new_status)
    }

    fn is_token_present(&self, cuid: &str) -> bool {
        self.tokens.read().contains_key(cuid)
    }

    fn get_certificates_by_cuid(&self, cuid: &str) -> std::result::Result<Vec<CertRecord>, ServiceError> {
        Ok(self
            .certs
            .read()
            .values()
            .filter(|cert| cert.token_id == cuid)
            .cloned()
            .collect())
    }

    fn remove_cert_record(&self, id: &str) -> std::result::Result<(), ServiceError> {
        self.certs
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::new(format!("no certificate record {id}")))
    }

    fn log_activity(&self, entry: ActivityEntry) {
        debug!(
            operation = %entry.operation,
            token = entry.token_id.as_deref().unwrap_or("-"),
            outcome = %entry.outcome,
            message = %entry.message,
            "Activity"
        );
        self.activity.lock().push(entry);
    }
}
