//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`Config`] values without
//! repeating boilerplate across crate boundaries.

use hermsh_config::{Config, Provider};

/// Fluent builder for [`Config`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .verbose(2)
///     .provider(Provider::OpenAi)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: Config,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn verbose(mut self, level: u8) -> Self {
        self.config.verbose = level;
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.config.model = Some(model.to_string());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
