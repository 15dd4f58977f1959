//! Token profile resolution
//!
//! A resolver maps what is known about a token (identity, versions and
//! client hints) to the token type whose profile governs the operation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::ConfigStore;
use crate::error::{Error, Result, TpsStatus};

/// What a resolver may inspect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverParams {
    /// Card OS major version
    pub major_version: u8,
    /// Card OS minor version
    pub minor_version: u8,
    /// CUID as upper-case hex
    pub cuid: String,
    /// MSN as upper-case hex
    pub msn: String,
    /// Token type requested by the client
    pub ext_token_type: Option<String>,
    /// ATR reported by the client
    pub ext_token_atr: Option<String>,
}

/// Maps token identity to a token type
pub trait ProfileResolver: Send + Sync + fmt::Debug {
    /// Token type for `params`
    fn token_type(&self, params: &ResolverParams) -> Result<String>;
}

/// Named resolver instances
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    instances: BTreeMap<String, Arc<dyn ProfileResolver>>,
}

impl ResolverRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` under `name`
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, resolver: Arc<dyn ProfileResolver>) -> Self {
        self.instances.insert(name.into(), resolver);
        self
    }

    /// Resolver by name
    pub fn get(&self, name: &str) -> Result<&Arc<dyn ProfileResolver>> {
        self.instances.get(name).ok_or_else(|| {
            Error::misconfiguration(format!("no profile resolver named {name}"))
                .with_status(TpsStatus::DefaultTokenTypeNotFound)
        })
    }

    /// Resolve with the named instance, or take the client's type when
    /// resolution is disabled
    pub fn resolve(&self, instance: Option<&str>, params: &ResolverParams) -> Result<String> {
        let token_type = match instance {
            Some(name) => self.get(name)?.token_type(params),
            None => params.ext_token_type.clone().ok_or_else(|| {
                Error::misconfiguration("no resolver configured and no token type requested")
                    .with_status(TpsStatus::DefaultTokenTypeNotFound)
            }),
        }?;
        debug!(token_type, resolver = instance.unwrap_or("none"), "Token type resolved");
        Ok(token_type)
    }
}

/// One rule of a [`MappingResolver`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRule {
    /// Required client token type
    pub token_type: Option<String>,
    /// Required client ATR
    pub token_atr: Option<String>,
    /// Lowest matching CUID, inclusive
    pub cuid_start: Option<String>,
    /// Highest matching CUID, inclusive
    pub cuid_end: Option<String>,
    /// Required card OS major version
    pub major_version: Option<u8>,
    /// Required card OS minor version
    pub minor_version: Option<u8>,
    /// Token type produced when the rule matches
    pub target: String,
}

impl MappingRule {
    fn matches(&self, params: &ResolverParams) -> bool {
        let same = |filter: &Option<String>, value: &Option<String>| match (filter, value) {
            (None, _) => true,
            (Some(f), Some(v)) => f.eq_ignore_ascii_case(v),
            (Some(_), None) => false,
        };
        let cuid = params.cuid.to_ascii_uppercase();
        let bound = |b: &Option<String>, ok: fn(&str, &str) -> bool| {
            b.as_ref().is_none_or(|b| {
                let b = b.to_ascii_uppercase();
                b.len() == cuid.len() && ok(&cuid, &b)
            })
        };

        same(&self.token_type, &params.ext_token_type)
            && same(&self.token_atr, &params.ext_token_atr)
            && bound(&self.cuid_start, |c, b| c >= b)
            && bound(&self.cuid_end, |c, b| c <= b)
            && self.major_version.is_none_or(|v| v == params.major_version)
            && self.minor_version.is_none_or(|v| v == params.minor_version)
    }
}

/// Resolver driven by ordered mapping rules; the first match wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingResolver {
    rules: Vec<MappingRule>,
}

impl MappingResolver {
    /// Resolver over `rules` in order
    pub const fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    /// Read the rules of instance `name` from configuration
    ///
    /// `tokenProfileResolver.<name>.mapping.order` lists rule ids; each rule
    /// reads `filter.*` and `target.tokenType` under
    /// `tokenProfileResolver.<name>.mapping.<id>`.
    pub fn from_config(config: &dyn ConfigStore, name: &str) -> Result<Self> {
        let base = format!("tokenProfileResolver.{name}.mapping");
        let order = config.required_string(&format!("{base}.order"))?;

        let version = |key: &str| -> Result<Option<u8>> {
            config
                .get_string(key)
                .map(|v| {
                    v.trim().parse().map_err(|_| {
                        Error::misconfiguration(format!("invalid version for {key}: {v}"))
                    })
                })
                .transpose()
        };

        let rules = order
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                let key = |suffix: &str| format!("{base}.{id}.{suffix}");
                Ok(MappingRule {
                    token_type: config.get_string(&key("filter.tokenType")),
                    token_atr: config.get_string(&key("filter.tokenATR")),
                    cuid_start: config.get_string(&key("filter.tokenCUID.start")),
                    cuid_end: config.get_string(&key("filter.tokenCUID.end")),
                    major_version: version(&key("filter.appletMajorVersion"))?,
                    minor_version: version(&key("filter.appletMinorVersion"))?,
                    target: config.required_string(&key("target.tokenType"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(rules))
    }
}

impl ProfileResolver for MappingResolver {
    fn token_type(&self, params: &ResolverParams) -> Result<String> {
        self.rules
            .iter()
            .find(|rule| rule.matches(params))
            .map(|rule| rule.target.clone())
            .ok_or_else(|| {
                Error::misconfiguration(format!("no mapping matches token {}", params.cuid))
                    .with_status(TpsStatus::DefaultTokenTypeNotFound)
            })
    }
}
