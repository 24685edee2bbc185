#![deny(unsafe_code)]

//! Configuration loading, validation, and the security policy engine for hermsh.
//!
//! The configuration file is `KEY=VALUE` lines (one per line, `#` comments,
//! unknown keys ignored but preserved on rewrite). This format is part of the
//! shell's external interface: control commands rewrite individual keys in
//! place without disturbing the rest of the file.
//!
//! Provides the [`Config`] type as the central configuration structure and
//! the [`policy`] module for command/response validation.

pub mod policy;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("validation error: {0}")]
    Validation(String),
}

/// AI provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
}

impl Provider {
    /// The identifier used on the wire and in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
        }
    }

    /// The environment variable that must carry this provider's credential.
    pub fn credential_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "AI_PROVIDER".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level shell configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Diagnostic verbosity: 0 = silent, 1 = info, 2 = debug traces.
    pub verbose: u8,

    /// Selected AI provider. Takes effect on the next AI session.
    pub provider: Provider,

    /// Model identifier override; `None` means the provider default.
    pub model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: 0,
            provider: Provider::default(),
            model: None,
        }
    }
}

impl Config {
    /// Load configuration from a `KEY=VALUE` file at the given path.
    ///
    /// A missing file yields the defaults; a present but malformed file is an
    /// error so that typos are surfaced rather than silently ignored.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from `KEY=VALUE` content.
    ///
    /// Unknown keys are ignored. Lines without `=` and comment lines are
    /// skipped.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "VERBOSE" => {
                    config.verbose =
                        value.parse::<u8>().map_err(|_| ConfigError::InvalidValue {
                            key: key.to_string(),
                            value: value.to_string(),
                        })?;
                }
                "AI_PROVIDER" => {
                    config.provider = value.parse()?;
                }
                "MODEL" => {
                    if !value.is_empty() {
                        config.model = Some(value.to_string());
                    }
                }
                _ => {} // unknown keys ignored
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verbose > 2 {
            return Err(ConfigError::Validation(format!(
                "VERBOSE must be 0, 1, or 2, got {}",
                self.verbose
            )));
        }
        Ok(())
    }

    /// Rewrite a single key in the config file, preserving every other line.
    ///
    /// The key is updated in place if present, appended otherwise. The file
    /// is created if missing. This is what control commands use to persist
    /// setting changes.
    pub fn set_in_file(path: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        let mut lines: Vec<String> = Vec::new();
        let mut found = false;
        for line in content.lines() {
            let trimmed = line.trim_start();
            if !trimmed.starts_with('#') {
                if let Some((k, _)) = trimmed.split_once('=') {
                    if k.trim() == key {
                        lines.push(format!("{key}={value}"));
                        found = true;
                        continue;
                    }
                }
            }
            lines.push(line.to_string());
        }
        if !found {
            lines.push(format!("{key}={value}"));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        std::fs::write(path, out)?;
        Ok(())
    }

    /// Build the security [`policy::PolicyEngine`] used by the middleware.
    pub fn build_policy(&self) -> policy::PolicyEngine {
        policy::PolicyEngine::new()
    }

    /// Map the verbosity level to a tracing filter directive.
    pub fn tracing_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.verbose, 0);
        assert_eq!(config.provider, Provider::Anthropic);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_parse_empty() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.verbose, 0);
    }

    #[test]
    fn test_parse_full() {
        let content = "\
# hermsh configuration
VERBOSE=2
AI_PROVIDER=openai
MODEL=gpt-4o
";
        let config = Config::parse(content).unwrap();
        assert_eq!(config.verbose, 2);
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_parse_ignores_unknown_keys() {
        let config = Config::parse("SOMETHING_ELSE=yes\nVERBOSE=1\n").unwrap();
        assert_eq!(config.verbose, 1);
    }

    #[test]
    fn test_parse_rejects_bad_verbose() {
        assert!(Config::parse("VERBOSE=nine\n").is_err());
        assert!(Config::parse("VERBOSE=7\n").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_provider() {
        assert!(Config::parse("AI_PROVIDER=clippy\n").is_err());
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope")).unwrap();
        assert_eq!(config.verbose, 0);
    }

    #[test]
    fn test_set_in_file_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hermshrc");
        std::fs::write(&path, "# keep me\nVERBOSE=0\nCUSTOM=abc\n").unwrap();

        Config::set_in_file(&path, "VERBOSE", "2").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# keep me"));
        assert!(content.contains("VERBOSE=2"));
        assert!(content.contains("CUSTOM=abc"));
        assert!(!content.contains("VERBOSE=0"));
    }

    #[test]
    fn test_set_in_file_appends_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hermshrc");

        Config::set_in_file(&path, "AI_PROVIDER", "openai").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.provider, Provider::OpenAi);
    }

    #[test]
    fn test_provider_roundtrip() {
        assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(Provider::OpenAi.as_str(), "openai");
    }

    #[test]
    fn test_tracing_filter_mapping() {
        let mut config = Config::default();
        assert_eq!(config.tracing_filter(), "warn");
        config.verbose = 1;
        assert_eq!(config.tracing_filter(), "debug");
        config.verbose = 2;
        assert_eq!(config.tracing_filter(), "trace");
    }
}
