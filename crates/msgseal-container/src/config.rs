use msgseal_core::digest::SHA512_URI;
use serde::{Deserialize, Serialize};

/// Container construction, archive and naming settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Digest for the ASiC manifest reference and the read-side attachment digest.
    pub manifest_digest_algorithm: String,
    /// Attempts at finding an unused file name before giving up.
    pub naming_attempts: usize,
    /// Escaped query ids are cut to this many characters in file names.
    pub max_query_id_len: usize,
    /// Attachment bytes kept in memory before spilling to a temp file.
    pub spool_threshold: usize,
    /// Upper bound for any text or timestamp entry read from an archive.
    pub max_entry_bytes: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            manifest_digest_algorithm: SHA512_URI.to_string(),
            naming_attempts: 10,
            max_query_id_len: 225,
            spool_threshold: 1024 * 1024,
            max_entry_bytes: 64 * 1024 * 1024,
        }
    }
}
