//! Configuration for the key agreement engine

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Info string used when none is configured
pub const DEFAULT_INFO: &str = "x3dh";

/// Protocol-level settings shared by both roles
///
/// Both parties must use the same `info`, otherwise their secrets differ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Application-specific protocol name fed to the KDF as HKDF info
    pub info: String,

    /// Reject bundles that carry no one-time pre-key
    pub require_one_time_pre_key: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            info: DEFAULT_INFO.to_string(),
            require_one_time_pre_key: false,
        }
    }
}

impl ProtocolConfig {
    /// Create a configuration with the given protocol name
    pub fn new(info: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            ..Self::default()
        }
    }

    /// Refuse bundles without a one-time pre-key
    pub fn with_required_one_time_pre_key(mut self) -> Self {
        self.require_one_time_pre_key = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.info.is_empty() {
            return Err(Error::InvalidConfig("info must not be empty".into()));
        }
        Ok(())
    }
}

/// Builder for [`ProtocolConfig`]
#[derive(Default)]
pub struct ProtocolConfigBuilder {
    info: Option<String>,
    require_one_time_pre_key: bool,
}

impl ProtocolConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the protocol name
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn require_one_time_pre_key(mut self, require: bool) -> Self {
        self.require_one_time_pre_key = require;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ProtocolConfig> {
        let config = ProtocolConfig {
            info: self.info.unwrap_or_else(|| DEFAULT_INFO.to_string()),
            require_one_time_pre_key: self.require_one_time_pre_key,
        };
        config.validate()?;
        Ok(config)
    }
}
