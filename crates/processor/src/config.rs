//! Configuration lookup
//!
//! Values live in a flat store keyed by dotted names. [`OperationConfig`] and
//! [`ProfileConfig`] read everything an operation needs once, up front, and
//! are passed by reference from then on.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use figment::value::{Dict, Value};
use tps_apdu_core::Buffer;

use crate::authority::RevocationReason;
use crate::context::Operation;
use crate::error::{Error, ErrorKind, Result, ResultExt};

/// Read access to dotted configuration keys
pub trait ConfigStore: Send + Sync + fmt::Debug {
    /// Raw value for `key`
    fn get_string(&self, key: &str) -> Option<String>;

    /// Value for `key`, or `default` when absent
    fn string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_owned())
    }

    /// Value for `key`; absence is a misconfiguration
    fn required_string(&self, key: &str) -> Result<String> {
        self.get_string(key)
            .ok_or_else(|| Error::misconfiguration(format!("missing configuration value {key}")))
    }

    /// Boolean value for `key`, or `default` when absent
    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get_string(key) {
            None => Ok(default),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(Error::misconfiguration(format!(
                    "invalid boolean for {key}: {value}"
                ))),
            },
        }
    }

    /// Integer value for `key`, or `default` when absent
    fn int_or(&self, key: &str, default: i64) -> Result<i64> {
        self.get_string(key).map_or(Ok(default), |value| {
            value
                .trim()
                .parse()
                .or_kind(ErrorKind::Misconfiguration, format!("invalid integer for {key}"))
        })
    }
}

/// Flat configuration store with case-insensitive keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpsConfig {
    values: BTreeMap<String, String>,
}

impl TpsConfig {
    /// Load a TOML file overlaid with `TPS_` environment variables
    ///
    /// Environment keys use `__` as the nesting separator, so
    /// `TPS_CHANNEL__BLOCKSIZE` sets `channel.blockSize`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("TPS_").split("__")),
        )
    }

    /// Flatten any figment into dotted keys
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let dict: Dict = figment
            .extract()
            .or_kind(ErrorKind::Misconfiguration, "unable to read configuration")?;
        let mut values = BTreeMap::new();
        flatten("", &dict, &mut values);
        Ok(Self { values })
    }

    /// Build a store from key/value pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key, value);
        }
        config
    }

    /// Set one value, replacing any previous one
    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.values.insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigStore for TpsConfig {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(&key.to_ascii_lowercase()).cloned()
    }
}

fn flatten(prefix: &str, dict: &Dict, out: &mut BTreeMap<String, String>) {
    for (key, value) in dict {
        let name = if prefix.is_empty() {
            key.to_ascii_lowercase()
        } else {
            format!("{prefix}.{}", key.to_ascii_lowercase())
        };
        match value {
            Value::Dict(_, nested) => flatten(&name, nested, out),
            other => {
                if let Some(text) = scalar(other) {
                    out.insert(name, text);
                }
            }
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(_, s) => Some(s.clone()),
        Value::Char(_, c) => Some(c.to_string()),
        Value::Bool(_, b) => Some(b.to_string()),
        Value::Num(..) => value
            .deserialize::<i64>()
            .map(|n| n.to_string())
            .or_else(|_| value.deserialize::<f64>().map(|n| n.to_string()))
            .ok(),
        Value::Array(_, items) => Some(items.iter().filter_map(scalar).collect::<Vec<_>>().join(",")),
        Value::Dict(..) | Value::Empty(..) => None,
    }
}

fn hex_value(config: &dyn ConfigStore, key: &str, default: &str) -> Result<Buffer> {
    let text = config.string_or(key, default);
    Buffer::from_hex(&text).or_kind(ErrorKind::Misconfiguration, format!("invalid hex for {key}"))
}

fn bounded<T: TryFrom<i64>>(config: &dyn ConfigStore, key: &str, default: i64) -> Result<T> {
    let value = config.int_or(key, default)?;
    T::try_from(value).map_err(|_| Error::misconfiguration(format!("{key} out of range: {value}")))
}

/// Settings shared by every token type of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationConfig {
    /// Operation these settings were read for
    pub operation: Operation,
    /// Profile resolver instance; `None` when resolution is disabled
    pub resolver: Option<String>,
    /// Whether tokens absent from the registry may be processed
    pub allow_unknown_token: bool,
    /// Whether tokens are registered externally
    pub external_reg: bool,
    /// Card manager instance AID
    pub card_manager_aid: Buffer,
    /// Token applet instance AID
    pub applet_aid: Buffer,
    /// Token applet package AID
    pub package_aid: Buffer,
    /// Applet file extension
    pub applet_ext: String,
    /// Largest APDU data field for LOAD
    pub block_size: usize,
    /// Applet instance size
    pub instance_size: u16,
    /// Applet memory size
    pub applet_memory_size: u16,
    /// Factory key version
    pub default_key_version: u8,
    /// Factory key index
    pub default_key_index: u8,
}

impl OperationConfig {
    /// Read the operation-scoped settings
    pub fn load(config: &dyn ConfigStore, operation: Operation) -> Result<Self> {
        let prefix = operation.prefix();
        let resolver = config.string_or(
            &format!("{prefix}.tokenProfileResolver"),
            operation.default_resolver(),
        );
        let resolver = (!resolver.eq_ignore_ascii_case("none")).then_some(resolver);

        Ok(Self {
            operation,
            resolver,
            allow_unknown_token: config.bool_or(&format!("{prefix}.allowUnknownToken"), true)?,
            external_reg: config.bool_or("externalReg.enable", false)?,
            card_manager_aid: hex_value(config, "applet.aid.cardmgr_instance", "A0000000030000")?,
            applet_aid: hex_value(config, "applet.aid.netkey_instance", "627601FF000000")?,
            package_aid: hex_value(config, "applet.aid.netkey_file", "627601FF0000")?,
            applet_ext: config.string_or("general.applet_ext", "ijc"),
            block_size: bounded(config, "channel.blockSize", 248)?,
            instance_size: bounded(config, "channel.instanceSize", 18000)?,
            applet_memory_size: bounded(config, "channel.appletMemorySize", 5000)?,
            default_key_version: bounded(config, "channel.defKeyVersion", 0)?,
            default_key_index: bounded(config, "channel.defKeyIndex", 0)?,
        })
    }
}

/// Holder authentication settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    /// Authenticator instance
    pub id: String,
    /// Credential attribute that becomes the record's user id
    pub cred_name: String,
}

/// Settings for one operation and token type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    /// Resolved token type
    pub token_type: String,
    /// Whether the profile is administratively enabled
    pub enabled: bool,
    /// Whether holder authentication is configured for this profile
    pub auth_enabled: bool,
    scope: String,
    /// Whether tokens without an applet may be processed
    pub allow_empty_token: bool,
    applet_required_version: Option<String>,
    applet_directory: Option<String>,
    issuer_info_enabled: bool,
    issuer_info_value: Option<String>,
    /// Whether symmetric keys are rotated
    pub symmetric_keys_enabled: bool,
    /// Key version the token must hold
    pub symmetric_keys_required_version: u8,
    /// Key service connection
    pub tks_conn: String,
    /// Certificate authority connection
    pub ca_conn: String,
    /// Whether format revokes the token's certificates
    pub revoke_cert: bool,
    /// Reason given to the certificate authority
    pub revoke_reason: RevocationReason,
    /// Name of the shared secret that wraps session keys
    pub shared_secret_name: String,
    /// Whether the key service generates keys server side
    pub server_keygen: bool,
}

impl ProfileConfig {
    /// Read the settings for `token_type` under `operation`
    pub fn load(config: &dyn ConfigStore, operation: Operation, token_type: &str) -> Result<Self> {
        let scope = format!("{}.{token_type}", operation.prefix());
        let key = |name: &str| format!("{scope}.{name}");

        let state = config.string_or(&format!("config.Profiles.{token_type}.state"), "Enabled");

        let tks_conn = config.string_or(&key("tks.conn"), "tks1");
        let revoke_cert = config.bool_or(&key("revokeCert"), false)?;
        let revoke_reason = if revoke_cert {
            let code = config.int_or(&key("revokeCert.revokeReason"), 0)?;
            RevocationReason::from_code(code).ok_or_else(|| {
                Error::misconfiguration(format!("unknown revocation reason {code}"))
            })?
        } else {
            RevocationReason::Unspecified
        };

        Ok(Self {
            token_type: token_type.to_owned(),
            enabled: state.eq_ignore_ascii_case("Enabled"),
            auth_enabled: config.bool_or(&key("auth.enable"), true)?,
            allow_empty_token: config.bool_or(&key("update.applet.emptyToken.enable"), true)?,
            applet_required_version: config.get_string(&key("update.applet.requiredVersion")),
            applet_directory: config.get_string(&key("update.applet.directory")),
            issuer_info_enabled: config.bool_or(&key("issuerinfo.enable"), false)?,
            issuer_info_value: config.get_string(&key("issuerinfo.value")),
            symmetric_keys_enabled: config.bool_or(&key("update.symmetricKeys.enable"), true)?,
            symmetric_keys_required_version: bounded(
                config,
                &key("update.symmetricKeys.requiredVersion"),
                0,
            )?,
            ca_conn: config.string_or(&key("ca.conn"), "ca1"),
            revoke_cert,
            revoke_reason,
            shared_secret_name: config
                .string_or(&format!("conn.{tks_conn}.tksSharedSymKeyName"), "sharedSecret"),
            server_keygen: config.bool_or(&format!("conn.{tks_conn}.serverKeygen"), false)?,
            tks_conn,
            scope,
        })
    }

    /// Authenticator instance and credential name, read only when authentication runs
    ///
    /// `None` when authentication is disabled for the profile.
    pub fn auth_settings(&self, config: &dyn ConfigStore) -> Result<Option<AuthSettings>> {
        if !self.auth_enabled {
            return Ok(None);
        }
        let id = config.required_string(&format!("{}.auth.id", self.scope))?;
        let cred_name = config.required_string(&format!("auths.instance.{id}.authCredName"))?;
        Ok(Some(AuthSettings { id, cred_name }))
    }

    /// Applet version the token must run
    pub fn applet_required_version(&self) -> Result<&str> {
        self.applet_required_version.as_deref().ok_or_else(|| {
            Error::upgrade(format!("no required applet version for {}", self.token_type))
        })
    }

    /// Directory holding applet files
    pub fn applet_directory(&self) -> Result<&str> {
        self.applet_directory.as_deref().ok_or_else(|| {
            Error::upgrade(format!("no applet directory for {}", self.token_type))
        })
    }

    /// Issuer information to write, if enabled
    pub fn issuer_info(&self) -> Result<Option<&str>> {
        if !self.issuer_info_enabled {
            return Ok(None);
        }
        self.issuer_info_value.as_deref().map(Some).ok_or_else(|| {
            Error::misconfiguration(format!("issuer info enabled without a value for {}", self.token_type))
        })
    }
}
