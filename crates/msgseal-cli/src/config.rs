//! Optional YAML configuration passed with `--config`.
//!
//! ```yaml
//! envelope:
//!   digest_algorithm: http://www.w3.org/2001/04/xmlenc#sha256
//! limits:
//!   max_parts: 16
//! container:
//!   naming_attempts: 3
//! ```

use anyhow::Context;
use msgseal_container::ContainerConfig;
use msgseal_core::{DecodeLimitsOverrides, EnvelopeConfig};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    envelope: EnvelopeConfig,
    /// Applied on top of `envelope.limits`.
    limits: DecodeLimitsOverrides,
    container: ContainerConfig,
}

#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub envelope: EnvelopeConfig,
    pub container: ContainerConfig,
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config: {}", path.display()))
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(text)?;
        let mut envelope = file.envelope;
        envelope.limits = envelope.limits.apply(file.limits);
        tracing::debug!(?envelope, container = ?file.container, "configuration loaded");
        Ok(Self {
            envelope,
            container: file.container,
        })
    }
}
