use crate::digest::SHA512_URI;
use serde::{Deserialize, Serialize};

/// Resource limits applied while decoding untrusted wire input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    /// Upper bound for one part's header block.
    pub max_header_bytes: usize,
    /// Upper bound for top-level parts in one message.
    pub max_parts: usize,
    /// Upper bound for members of the nested attachment multipart.
    pub max_attachments: usize,
    /// Upper bound for parts that are read fully into memory
    /// (payload, hash chains, signature).
    pub max_text_part_bytes: u64,
    /// Upper bound for one OCSP response.
    pub max_ocsp_bytes: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_parts: 64,
            max_attachments: 1024,
            max_text_part_bytes: 64_u64 * 1024 * 1024,
            max_ocsp_bytes: 1024 * 1024,
        }
    }
}

/// Partial overrides for `DecodeLimits`. Used for config file parsing.
/// Unknown keys cause deserialization to fail (deny_unknown_fields).
/// Merge with `DecodeLimits::default().apply(overrides)`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecodeLimitsOverrides {
    pub max_header_bytes: Option<usize>,
    pub max_parts: Option<usize>,
    pub max_attachments: Option<usize>,
    pub max_text_part_bytes: Option<u64>,
    pub max_ocsp_bytes: Option<u64>,
}

impl DecodeLimits {
    /// Apply overrides onto these limits. Only `Some` values override.
    pub fn apply(self, overrides: DecodeLimitsOverrides) -> Self {
        Self {
            max_header_bytes: overrides.max_header_bytes.unwrap_or(self.max_header_bytes),
            max_parts: overrides.max_parts.unwrap_or(self.max_parts),
            max_attachments: overrides.max_attachments.unwrap_or(self.max_attachments),
            max_text_part_bytes: overrides
                .max_text_part_bytes
                .unwrap_or(self.max_text_part_bytes),
            max_ocsp_bytes: overrides.max_ocsp_bytes.unwrap_or(self.max_ocsp_bytes),
        }
    }
}

/// Decoder/encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Digest algorithm identifier used for every part (resolved via the registry).
    pub digest_algorithm: String,
    /// Attachments larger than this spill from memory to an anonymous temp file.
    pub spool_threshold: usize,
    pub limits: DecodeLimits,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            digest_algorithm: SHA512_URI.to_string(),
            spool_threshold: 1024 * 1024,
            limits: DecodeLimits::default(),
        }
    }
}
