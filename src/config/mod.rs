//! Sandbox configuration
//!
//! ```toml
//! [sandbox]
//! profile = "narrow"
//! payload = "text"
//! extra_allowed = ["JSON"]
//! max_call_depth = 256
//! ```

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::PayloadProfile;
use crate::engine::ExecutionLimits;
use crate::security::{is_global_self_reference, AllowList, Profile};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    #[serde(default)]
    pub sandbox: SandboxSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxSettings {
    /// Which built-in globals scripts may see
    pub profile: Profile,
    /// Encoding used on the host-call bridge
    pub payload: PayloadProfile,
    /// Names appended to the profile's allow-list
    pub extra_allowed: Vec<String>,
    pub max_call_depth: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            payload: PayloadProfile::default(),
            extra_allowed: Vec::new(),
            max_call_depth: ExecutionLimits::default().max_call_depth,
        }
    }
}

impl SandboxConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: SandboxConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sandbox = &self.sandbox;
        if sandbox.max_call_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_call_depth must be greater than zero".to_string(),
            ));
        }
        for name in &sandbox.extra_allowed {
            if !IDENTIFIER.is_match(name) {
                return Err(ConfigError::Invalid(format!(
                    "extra_allowed: '{}' is not an identifier",
                    name
                )));
            }
            if is_global_self_reference(name) {
                return Err(ConfigError::Invalid(format!(
                    "extra_allowed: '{}' refers to the global object and cannot be allowed",
                    name
                )));
            }
        }
        Ok(())
    }

    /// The shared profile list, or a copy extended with `extra_allowed`
    pub fn allow_list(&self) -> Arc<AllowList> {
        let sandbox = &self.sandbox;
        if sandbox.extra_allowed.is_empty() {
            AllowList::for_profile(sandbox.profile)
        } else {
            Arc::new(AllowList::extend(sandbox.profile, &sandbox.extra_allowed))
        }
    }

    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_call_depth: self.sandbox.max_call_depth,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.sandbox.profile = profile;
        self
    }

    pub fn with_payload(mut self, payload: PayloadProfile) -> Self {
        self.sandbox.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.sandbox.profile, Profile::Narrow);
        assert_eq!(config.sandbox.payload, PayloadProfile::Text);
        assert_eq!(config.sandbox.max_call_depth, 256);
        assert!(Arc::ptr_eq(&config.allow_list(), &AllowList::narrow()));
    }

    #[test]
    fn test_parse_full() {
        let config = SandboxConfig::from_toml(
            r#"
            [sandbox]
            profile = "broad"
            payload = "binary"
            extra_allowed = ["print"]
            max_call_depth = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.sandbox.profile, Profile::Broad);
        assert_eq!(config.sandbox.payload, PayloadProfile::Binary);
        assert_eq!(config.limits().max_call_depth, 64);
        let list = config.allow_list();
        assert!(list.is_allowed("print"));
        assert!(list.is_allowed("JSON"));
        assert_eq!(list.profile(), Profile::Broad);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(SandboxConfig::from_toml("").unwrap(), SandboxConfig::default());
    }

    #[test]
    fn test_rejects_zero_depth() {
        let err = SandboxConfig::from_toml("[sandbox]\nmax_call_depth = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_extra_names() {
        let err = SandboxConfig::from_toml("[sandbox]\nextra_allowed = [\"not a name\"]").unwrap_err();
        assert!(err.to_string().contains("not an identifier"));
        let err = SandboxConfig::from_toml("[sandbox]\nextra_allowed = [\"globalThis\"]").unwrap_err();
        assert!(err.to_string().contains("global object"));
    }

    #[test]
    fn test_rejects_unknown_profile_and_keys() {
        assert!(matches!(
            SandboxConfig::from_toml("[sandbox]\nprofile = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(SandboxConfig::from_toml("[sandbox]\ntimeout = 5").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scriptit.toml");
        std::fs::write(&path, "[sandbox]\npayload = \"binary\"\n").unwrap();
        let config = SandboxConfig::from_file(&path).unwrap();
        assert_eq!(config.sandbox.payload, PayloadProfile::Binary);

        let missing = SandboxConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
