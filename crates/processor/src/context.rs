//! Request-scoped operation context

use std::collections::BTreeMap;
use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{Error, TpsStatus};

/// Token lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Reset the token to an uninitialized state
    #[display("format")]
    Format,
    /// Issue certificates to the token
    #[display("enroll")]
    Enroll,
    /// Reset the token PIN
    #[display("pinReset")]
    PinReset,
}

impl Operation {
    /// Configuration prefix for this operation
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Format => "op.format",
            Self::Enroll => "op.enroll",
            Self::PinReset => "op.pinReset",
        }
    }

    /// Resolver used when none is configured
    pub const fn default_resolver(self) -> &'static str {
        match self {
            Self::Format => "formatMappingResolver",
            Self::Enroll => "enrollMappingResolver",
            Self::PinReset => "pinResetMappingResolver",
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "format" => Ok(Self::Format),
            "enroll" => Ok(Self::Enroll),
            "pinreset" | "pin_reset" => Ok(Self::PinReset),
            _ => Err(Error::misconfiguration(format!("unknown operation {s}"))
                .with_status(TpsStatus::NoOperation)),
        }
    }
}

/// Client hints sent with the begin message
pub type Extensions = BTreeMap<String, String>;

/// Opening message of a token operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginOperation {
    /// Requested operation name
    pub operation: String,
    /// Client hints
    #[serde(default)]
    pub extensions: Extensions,
}

impl BeginOperation {
    /// Begin message for `operation` without hints
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            extensions: Extensions::new(),
        }
    }

    /// Add a client hint
    #[must_use]
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }
}

/// Immutable per-request state threaded through every step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// Current operation
    pub operation: Operation,
    /// Client hints from the begin message
    pub extensions: Extensions,
    /// Address of the terminal client
    pub client_address: String,
    /// Token type, once resolved
    pub token_type: Option<String>,
}

impl OperationContext {
    /// Context for a freshly begun operation
    pub const fn new(operation: Operation, extensions: Extensions, client_address: String) -> Self {
        Self {
            operation,
            extensions,
            client_address,
            token_type: None,
        }
    }

    /// Copy of this context with the token type fixed
    #[must_use]
    pub fn with_token_type(&self, token_type: impl Into<String>) -> Self {
        Self {
            token_type: Some(token_type.into()),
            ..self.clone()
        }
    }

    /// Client hint by name
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }

    /// Whether the client asked for progress updates
    pub fn status_updates(&self) -> bool {
        self.extension("statusUpdate") == Some("true")
    }
}
